//! Common utilities and types shared across minidoc

pub mod codec;
pub mod config;
pub mod error;
pub mod rpc;
pub mod schema;
pub mod utils;

pub use config::{Config, CoordinatorConfig};
pub use error::{Error, Result};
pub use rpc::{Reply, Request};
pub use schema::{index_name, IndexMap, SchemaCatalog, SchemaMap};
pub use utils::{
    format_ranks, partition_endpoint, retry_with_backoff, timestamp_now_nanos,
};
