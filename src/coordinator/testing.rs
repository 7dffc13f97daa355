//! Scripted partitions for coordinator unit tests

use crate::common::schema::merge_schema;
use crate::common::{Error, Reply, Request, Result, SchemaMap};
use crate::coordinator::partition_client::{Connector, PartitionTransport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Every request seen, as (rank, op), in arrival order
pub type Journal = Arc<Mutex<Vec<(usize, &'static str)>>>;

#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer with `Reply::Error`
    Refuse(&'static str),
    /// Close the channel before replying
    Sever,
    /// Garbage on the wire
    Protocol,
}

type Faults = Arc<Mutex<HashMap<(usize, &'static str), Fault>>>;

#[derive(Default)]
pub struct ScriptedConnector {
    remote_version: i64,
    remote_schema: SchemaMap,
    /// (version, schema) overrides for single ranks
    partitions: HashMap<usize, (i64, SchemaMap)>,
    unreachable: Option<usize>,
    faults: Faults,
    delays: HashMap<&'static str, Duration>,
    journal: Journal,
}

impl ScriptedConnector {
    /// Partitions that report `remote_version` (0 = never initialized)
    pub fn new(remote_version: i64) -> Self {
        Self {
            remote_version,
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: SchemaMap) -> Self {
        self.remote_schema = schema;
        self
    }

    /// Rank `rank` reports `version` and `schema` instead of the defaults
    pub fn with_partition(mut self, rank: usize, version: i64, schema: SchemaMap) -> Self {
        self.partitions.insert(rank, (version, schema));
        self
    }

    pub fn unreachable(mut self, rank: usize) -> Self {
        self.unreachable = Some(rank);
        self
    }

    pub fn fault(self, rank: usize, op: &'static str, fault: Fault) -> Self {
        self.inject(rank, op, fault);
        self
    }

    /// Add a fault to partitions that are already connected
    pub fn inject(&self, rank: usize, op: &'static str, fault: Fault) {
        self.faults.lock().unwrap().insert((rank, op), fault);
    }

    /// Every `op` takes `delay` before answering
    pub fn delay(mut self, op: &'static str, delay: Duration) -> Self {
        self.delays.insert(op, delay);
        self
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    pub fn journal(&self) -> Vec<(usize, &'static str)> {
        self.journal.lock().unwrap().clone()
    }

    /// Ranks that received `op`, in arrival order
    pub fn ranks_for(&self, op: &str) -> Vec<usize> {
        self.journal()
            .into_iter()
            .filter(|(_, o)| *o == op)
            .map(|(rank, _)| rank)
            .collect()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, rank: usize) -> Result<Box<dyn PartitionTransport>> {
        if self.unreachable == Some(rank) {
            return Err(Error::Connection {
                rank,
                reason: "connection refused".into(),
            });
        }
        let (version, schema) = self
            .partitions
            .get(&rank)
            .cloned()
            .unwrap_or_else(|| (self.remote_version, self.remote_schema.clone()));
        Ok(Box::new(ScriptedPartition {
            rank,
            version,
            schema,
            faults: self.faults.clone(),
            delays: self.delays.clone(),
            journal: self.journal.clone(),
        }))
    }
}

struct ScriptedPartition {
    rank: usize,
    version: i64,
    schema: SchemaMap,
    faults: Faults,
    delays: HashMap<&'static str, Duration>,
    journal: Journal,
}

#[async_trait]
impl PartitionTransport for ScriptedPartition {
    async fn call(&mut self, request: Request) -> Result<Reply> {
        let op = request.op();
        self.journal.lock().unwrap().push((self.rank, op));
        if let Some(delay) = self.delays.get(op) {
            tokio::time::sleep(*delay).await;
        }

        let fault = self.faults.lock().unwrap().get(&(self.rank, op)).cloned();
        match fault {
            Some(Fault::Refuse(detail)) => return Ok(Reply::Error(detail.to_string())),
            Some(Fault::Sever) => return Err(Error::ConnectionClosed { rank: self.rank }),
            Some(Fault::Protocol) => return Err(Error::Protocol("invalid frame magic".into())),
            None => {}
        }

        Ok(match request {
            Request::SchemaVersion => Reply::Version(self.version),
            Request::Schema => Reply::Schema {
                version: self.version,
                schema: self.schema.clone(),
            },
            Request::ApplySchema { schema, version } => {
                let created = merge_schema(&mut self.schema, &schema);
                self.version = version;
                Reply::Applied { created }
            }
            Request::Shutdown => Reply::ShuttingDown,
            Request::Freeze | Request::Unfreeze | Request::DropCachedState => Reply::Ok,
        })
    }
}
