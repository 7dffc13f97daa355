//! Reference partition server
//!
//! Speaks the coordinator protocol over a Unix socket and keeps:
//! - The partition's schema and schema version (optionally on disk)
//! - A write-freeze flag
//! - A schema cache that can be dropped and reloaded
//!
//! Document storage and queries are not part of this crate.

pub mod server;
pub mod state;

pub use server::PartitionServer;
pub use state::{PartitionMeta, PartitionState};
