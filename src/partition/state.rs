//! Schema state of one partition
//!
//! The durable part (version + schema) lives in `partition.json` when the
//! partition has a data directory, and only in memory otherwise. The cache
//! is what requests are served from; `DropCachedState` empties it and the
//! next request reloads it from the durable copy.

use crate::common::schema::{merge_schema, validate_schema};
use crate::common::{Reply, Request, Result, SchemaMap};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const META_FILE: &str = "partition.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMeta {
    /// 0 until the first schema is applied
    pub version: i64,
    pub schema: SchemaMap,
}

pub struct PartitionState {
    rank: usize,
    meta_path: Option<PathBuf>,
    durable: PartitionMeta,
    cache: Option<SchemaMap>,
    frozen: bool,
}

impl PartitionState {
    /// In-memory partition
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            meta_path: None,
            durable: PartitionMeta::default(),
            cache: None,
            frozen: false,
        }
    }

    /// Partition persisted under `data_dir`
    pub fn open(rank: usize, data_dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(data_dir.as_ref())?;
        let meta_path = data_dir.as_ref().join(META_FILE);
        let durable = match fs::read(&meta_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PartitionMeta::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            rank,
            meta_path: Some(meta_path),
            durable,
            cache: None,
            frozen: false,
        })
    }

    pub fn version(&self) -> i64 {
        self.durable.version
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Apply one request. `Shutdown` is answered here but acted on by the
    /// server.
    pub fn handle(&mut self, request: Request) -> Reply {
        let op = request.op();
        match self.dispatch(request) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Partition {}: {} failed: {}", self.rank, op, e);
                Reply::Error(e.to_string())
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Result<Reply> {
        match request {
            Request::SchemaVersion => Ok(Reply::Version(self.durable.version)),
            Request::Schema => Ok(Reply::Schema {
                version: self.durable.version,
                schema: self.cached_schema().clone(),
            }),
            Request::ApplySchema { schema, version } => self.apply(schema, version),
            Request::Freeze => {
                if self.frozen {
                    return Ok(Reply::Error("already frozen".into()));
                }
                self.frozen = true;
                Ok(Reply::Ok)
            }
            Request::Unfreeze => {
                self.frozen = false;
                Ok(Reply::Ok)
            }
            Request::DropCachedState => {
                self.cache = None;
                Ok(Reply::Ok)
            }
            Request::Shutdown => Ok(Reply::ShuttingDown),
        }
    }

    fn cached_schema(&mut self) -> &SchemaMap {
        self.cache.get_or_insert_with(|| self.durable.schema.clone())
    }

    fn apply(&mut self, schema: SchemaMap, version: i64) -> Result<Reply> {
        validate_schema(&schema)?;
        if version <= 0 {
            return Ok(Reply::Error(format!("invalid schema version {}", version)));
        }

        let mut next = self.durable.clone();
        let created = merge_schema(&mut next.schema, &schema);
        next.version = version;
        self.persist(&next)?;
        self.durable = next;
        self.cache = Some(self.durable.schema.clone());

        if created > 0 {
            tracing::info!(
                "Partition {}: created {} definitions, schema version {}",
                self.rank,
                created,
                version
            );
        }
        Ok(Reply::Applied { created })
    }

    fn persist(&self, meta: &PartitionMeta) -> Result<()> {
        let Some(path) = &self.meta_path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer(&mut file, meta)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
