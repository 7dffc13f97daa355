//! Partition coordinator
//!
//! The coordinator is responsible for:
//! - Holding one connection per data partition rank
//! - Bootstrapping or loading the cluster schema at startup
//! - Forced reloads (freeze, drop caches, reapply schema)
//! - Best-effort cluster shutdown

pub mod partition_client;
pub mod schema_sync;
pub mod service;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod testing;

pub use partition_client::{Connector, PartitionHandle, PartitionTransport, UnixConnector};
pub use schema_sync::Reconciled;
pub use service::Coordinator;
pub use shutdown::{ShutdownOutcome, ShutdownReport};
