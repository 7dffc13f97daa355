//! # minidoc
//!
//! Coordinator layer of a sharded document database:
//! - One persistent connection per data partition (Unix sockets)
//! - Schema bootstrap on a fresh cluster, schema loading on an existing one
//! - Forced reload: freeze the cluster, drop caches, reapply the schema
//! - Best-effort shutdown that tolerates partitions hanging up mid-reply
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Coordinator                 │
//! │  (schema cache + connections, 1 lock)   │
//! └───────────┬─────────────────────────────┘
//!             │ framed bincode over Unix sockets
//!   ┌─────────┴──────────┬──────────────┐
//!   │                    │              │
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌──▼───────────┐
//! │ Partition 0│   │ Partition 1│   │ Partition 2  │
//! │ <work>/0   │   │ <work>/1   │   │ <work>/2     │
//! └────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start partitions
//! ```bash
//! minidoc-partition serve --rank 0 --work-dir ./run --data-dir ./part-0
//! minidoc-partition serve --rank 1 --work-dir ./run --data-dir ./part-1
//! ```
//!
//! ### Drive the cluster
//! ```bash
//! minidoc-coord --ranks 2 --work-dir ./run --data-dir ./coord-data status
//! minidoc-coord --ranks 2 --work-dir ./run create-collection users
//! minidoc-coord --ranks 2 --work-dir ./run create-index users address.city
//! minidoc-coord --ranks 2 --work-dir ./run sync
//! minidoc-coord --ranks 2 --work-dir ./run shutdown
//! ```

pub mod common;
pub mod coordinator;
pub mod partition;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use partition::PartitionServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
