//! Messages exchanged between the coordinator and partitions

use crate::common::schema::SchemaMap;
use serde::{Deserialize, Serialize};

/// Coordinator → partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Ask for the partition's schema version (0 = never initialized)
    SchemaVersion,
    /// Ask for the partition's schema and version
    Schema,
    /// Create the collections and indexes of `schema` the partition lacks
    /// and adopt `version`
    ApplySchema { schema: SchemaMap, version: i64 },
    /// Suspend writes until `Unfreeze`
    Freeze,
    Unfreeze,
    /// Discard in-memory schema and collection caches
    DropCachedState,
    /// Terminate the partition
    Shutdown,
}

impl Request {
    /// Short operation name for logs and timeout errors
    pub fn op(&self) -> &'static str {
        match self {
            Request::SchemaVersion => "SchemaVersion",
            Request::Schema => "Schema",
            Request::ApplySchema { .. } => "ApplySchema",
            Request::Freeze => "Freeze",
            Request::Unfreeze => "Unfreeze",
            Request::DropCachedState => "DropCachedState",
            Request::Shutdown => "Shutdown",
        }
    }
}

/// Partition → coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Version(i64),
    Schema { version: i64, schema: SchemaMap },
    /// Number of collections and indexes created
    Applied { created: usize },
    Ok,
    /// Sent right before the partition closes its listener
    ShuttingDown,
    /// Structured refusal; the request had no effect
    Error(String),
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Version(_) => "Version",
            Reply::Schema { .. } => "Schema",
            Reply::Applied { .. } => "Applied",
            Reply::Ok => "Ok",
            Reply::ShuttingDown => "ShuttingDown",
            Reply::Error(_) => "Error",
        }
    }
}
