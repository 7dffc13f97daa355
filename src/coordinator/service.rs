//! The partition coordinator
//!
//! Owns one connection per partition rank and the cached cluster schema,
//! both behind a single lock. Construction dials every rank and brings the
//! schema up to date; afterwards `sync`, `shutdown` and schema changes are
//! serialized on that lock.

use crate::common::schema::{index_name, parse_index_path, validate_name};
use crate::common::{
    timestamp_now_nanos, CoordinatorConfig, Error, Result, SchemaCatalog, SchemaMap,
};
use crate::coordinator::partition_client::{Connector, PartitionHandle, UnixConnector};
use crate::coordinator::schema_sync::{
    apply_schema, drop_cached_state, freeze_all, unfreeze_all, Reconciled,
};
use crate::coordinator::shutdown::{ShutdownOutcome, ShutdownReport};
use tokio::sync::Mutex;

/// State guarded by the coordinator lock
struct CoordinatorState {
    /// Indexed by rank, `total_rank` entries for the coordinator's lifetime
    partitions: Vec<PartitionHandle>,
    schema: SchemaMap,
    /// Ranks found lacking part of the schema at the last load
    diverged: Vec<usize>,
    shut_down: bool,
}

impl CoordinatorState {
    fn ensure_running(&self) -> Result<()> {
        if self.shut_down {
            return Err(Error::ShutDown);
        }
        Ok(())
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    catalog: SchemaCatalog,
    /// Stamped at construction. Reserved: nothing compares it yet.
    local_schema_version: i64,
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    /// Dial `<work_dir>/<rank>` for every rank and initialize the schema.
    pub async fn connect(config: CoordinatorConfig) -> Result<Self> {
        let connector = UnixConnector::new(config.work_dir.clone(), config.call_timeout());
        Self::with_connector(config, &connector).await
    }

    /// Same as [`Coordinator::connect`] with a caller-supplied connector.
    ///
    /// Fails with [`Error::Connection`] naming the first rank that could
    /// not be dialed, or [`Error::FatalInit`] if the schema could not be
    /// probed or reconciled. Connections opened before a failure are
    /// dropped with the partially built coordinator.
    pub async fn with_connector(
        config: CoordinatorConfig,
        connector: &dyn Connector,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!("Starting coordinator for {} partitions", config.total_rank);
        tracing::info!("  Work dir: {}", config.work_dir.display());
        tracing::info!("  Data dir: {}", config.data_dir.display());

        let local_schema_version = timestamp_now_nanos();
        let call_timeout = config.call_timeout();

        let mut partitions = Vec::with_capacity(config.total_rank);
        for rank in 0..config.total_rank {
            let transport = connector.connect(rank).await?;
            partitions.push(PartitionHandle::new(rank, transport, call_timeout));
        }

        let mut state = CoordinatorState {
            partitions,
            schema: config.initial_schema.clone(),
            diverged: Vec::new(),
            shut_down: false,
        };
        let catalog = SchemaCatalog::new(&config.data_dir);
        let reconciled = Self::initialize(&mut state, &catalog)
            .await
            .map_err(Error::fatal_init)?;
        state.diverged = reconciled.diverged;

        tracing::info!(
            "✓ Coordinator ready ({} partitions, {} collections)",
            config.total_rank,
            state.schema.len()
        );
        Ok(Self {
            config,
            catalog,
            local_schema_version,
            state: Mutex::new(state),
        })
    }

    /// Probe partition 0; bootstrap a fresh cluster or load an existing one.
    async fn initialize(
        state: &mut CoordinatorState,
        catalog: &SchemaCatalog,
    ) -> Result<Reconciled> {
        let remote_version = state.partitions[0].schema_version().await?;
        if remote_version == 0 {
            tracing::info!("Initializing database partitions");
            apply_schema(&mut state.partitions, &mut state.schema, catalog, true).await
        } else {
            tracing::debug!("Partitions report schema version {}", remote_version);
            apply_schema(&mut state.partitions, &mut state.schema, catalog, false).await
        }
    }

    pub fn total_rank(&self) -> usize {
        self.config.total_rank
    }

    pub fn local_schema_version(&self) -> i64 {
        self.local_schema_version
    }

    /// Snapshot of the cached schema
    pub async fn schema(&self) -> SchemaMap {
        self.state.lock().await.schema.clone()
    }

    /// (rank, usable) for every partition, in rank order
    pub async fn partition_status(&self) -> Vec<(usize, bool)> {
        let state = self.state.lock().await;
        state
            .partitions
            .iter()
            .map(|p| (p.rank(), p.is_usable()))
            .collect()
    }

    /// Ranks that were missing part of the schema when it was loaded at
    /// construction. Cleared by the next successful `sync` or schema change.
    pub async fn diverged_ranks(&self) -> Vec<usize> {
        self.state.lock().await.diverged.clone()
    }

    pub async fn is_shut_down(&self) -> bool {
        self.state.lock().await.shut_down
    }

    /// Freeze the cluster, drop every cache and reload the schema.
    ///
    /// The freeze is released on every path once it was acquired. Errors
    /// are wrapped in [`Error::Sync`]; the cached schema is restored, the
    /// coordinator stays usable and the call may be retried.
    pub async fn sync(&self) -> Result<Reconciled> {
        let mut guard = self.state.lock().await;
        guard.ensure_running()?;
        let state = &mut *guard;
        tracing::info!("Sync: freezing {} partitions", state.partitions.len());

        freeze_all(&mut state.partitions).await.map_err(Error::sync)?;

        let previous = state.schema.clone();
        let reloaded = match drop_cached_state(&mut state.partitions, &mut state.schema).await {
            Ok(()) => {
                apply_schema(
                    &mut state.partitions,
                    &mut state.schema,
                    &self.catalog,
                    true,
                )
                .await
            }
            Err(e) => Err(e),
        };
        let unfrozen = unfreeze_all(&mut state.partitions).await;

        match (reloaded, unfrozen) {
            (Ok(reconciled), Ok(())) => {
                tracing::info!("✓ Sync complete (schema version {})", reconciled.version);
                state.diverged.clear();
                Ok(reconciled)
            }
            (Err(e), _) => {
                tracing::error!("Sync failed: {}", e);
                state.schema = previous;
                Err(Error::sync(e))
            }
            (Ok(_), Err(e)) => {
                tracing::error!("Sync failed: {}", e);
                state.diverged.clear();
                Err(Error::sync(e))
            }
        }
    }

    /// Ask every partition to terminate, in ascending rank order.
    ///
    /// A failing rank never stops the remaining ones. Ranks that did not
    /// acknowledge are named in [`Error::ShutdownPartial`]. Afterwards the
    /// coordinator refuses further operations.
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_running()?;
        state.shut_down = true;

        let mut report = ShutdownReport::new();
        for partition in state.partitions.iter_mut() {
            let outcome = partition.shutdown().await;
            match &outcome {
                ShutdownOutcome::Acknowledged => {
                    tracing::info!("Partition {} shut down", partition.rank())
                }
                other => {
                    tracing::warn!("Partition {} did not shut down: {}", partition.rank(), other)
                }
            }
            report.record(partition.rank(), outcome);
        }

        report.into_result().inspect_err(|e| {
            tracing::error!("Shutdown did not fully complete, but best effort has been made: {}", e)
        })
    }

    /// Create a collection on every partition. Returns false if it already
    /// existed.
    pub async fn create_collection(&self, name: &str) -> Result<bool> {
        validate_name("collection name", name)?;
        let mut state = self.state.lock().await;
        state.ensure_running()?;
        if state.schema.contains_key(name) {
            return Ok(false);
        }

        let previous = state.schema.clone();
        state.schema.insert(name.to_string(), Default::default());
        self.push_schema(&mut state, previous).await?;
        tracing::info!("Created collection {}", name);
        Ok(true)
    }

    /// Create an index on a dotted `path` ("address.city") of an existing
    /// collection. Returns false if the index already existed.
    pub async fn create_index(&self, collection: &str, path: &str) -> Result<bool> {
        let segments = parse_index_path(path)?;
        let name = index_name(&segments);
        let mut state = self.state.lock().await;
        state.ensure_running()?;
        let Some(indexes) = state.schema.get(collection) else {
            return Err(Error::InvalidSchema(format!("no such collection: {}", collection)));
        };
        if indexes.contains_key(&name) {
            return Ok(false);
        }

        let previous = state.schema.clone();
        if let Some(indexes) = state.schema.get_mut(collection) {
            indexes.insert(name.clone(), segments);
        }
        self.push_schema(&mut state, previous).await?;
        tracing::info!("Created index {} on collection {}", name, collection);
        Ok(true)
    }

    /// Apply the in-memory schema in create mode; restore `previous` if
    /// that fails.
    async fn push_schema(&self, state: &mut CoordinatorState, previous: SchemaMap) -> Result<()> {
        let pushed = apply_schema(
            &mut state.partitions,
            &mut state.schema,
            &self.catalog,
            true,
        )
        .await;
        if let Err(e) = pushed {
            state.schema = previous;
            return Err(e);
        }
        state.diverged.clear();
        Ok(())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("total_rank", &self.config.total_rank)
            .field("work_dir", &self.config.work_dir)
            .field("data_dir", &self.config.data_dir)
            .field("local_schema_version", &self.local_schema_version)
            .finish()
    }
}
