//! Cluster-wide schema reconciliation, freeze and cache release
//!
//! Every function here covers all partitions before returning. Fan-out
//! steps run concurrently and act as a barrier; freezing is sequential so
//! that a partial acquisition can be rolled back in reverse order.

use crate::common::schema::{describe_difference, merge_schema, validate_schema};
use crate::common::{timestamp_now_nanos, Result, SchemaCatalog, SchemaMap};
use crate::coordinator::partition_client::PartitionHandle;
use futures_util::future::join_all;

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Version stamp now held by every partition (highest reported one
    /// after a load)
    pub version: i64,
    /// Collections and indexes created across all partitions
    pub created: usize,
    /// Ranks missing part of the loaded schema. Always empty after a
    /// create pass.
    pub diverged: Vec<usize>,
}

/// Reconcile `schema` with every partition.
///
/// With `create_if_missing`, the target is the union of `schema`, the
/// on-disk catalog and every partition's current schema; partitions
/// create what they lack and adopt a fresh version stamp.
///
/// Without it, nothing is created: the union of every partition's schema
/// replaces `schema`. Partitions lacking part of it are reported in
/// [`Reconciled::diverged`]; the next create pass fills them in.
///
/// On success the catalog holds a copy of `schema`.
pub async fn apply_schema(
    partitions: &mut [PartitionHandle],
    schema: &mut SchemaMap,
    catalog: &SchemaCatalog,
    create_if_missing: bool,
) -> Result<Reconciled> {
    let remote = fetch_schemas(partitions).await?;

    let reconciled = if create_if_missing {
        merge_schema(schema, &catalog.load()?);
        for (_, partition_schema) in &remote {
            merge_schema(schema, partition_schema);
        }
        validate_schema(schema)?;

        let version = timestamp_now_nanos();
        let target = schema.clone();
        let created: usize = join_all(
            partitions
                .iter_mut()
                .map(|p| p.apply_schema(target.clone(), version)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<usize>>>()?
        .into_iter()
        .sum();

        tracing::info!(
            "Schema applied to {} partitions: {} collections, {} definitions created, version {}",
            partitions.len(),
            schema.len(),
            created,
            version
        );
        Reconciled {
            version,
            created,
            diverged: Vec::new(),
        }
    } else {
        let mut loaded = SchemaMap::new();
        let mut version = 0;
        for (partition_version, partition_schema) in &remote {
            merge_schema(&mut loaded, partition_schema);
            version = version.max(*partition_version);
        }
        validate_schema(&loaded)?;

        let mut diverged = Vec::new();
        for (partition, (partition_version, partition_schema)) in partitions.iter().zip(&remote) {
            if let Some(detail) = describe_difference(&loaded, partition_schema) {
                tracing::warn!(
                    "Partition {} diverges from the cluster schema ({}), sync to repair",
                    partition.rank(),
                    detail
                );
                diverged.push(partition.rank());
            } else if *partition_version != version {
                tracing::debug!(
                    "Partition {} reports schema version {}, newest is {}",
                    partition.rank(),
                    partition_version,
                    version
                );
            }
        }
        *schema = loaded;

        tracing::info!(
            "Schema loaded from {} partitions: {} collections, version {}",
            partitions.len(),
            schema.len(),
            version
        );
        Reconciled {
            version,
            created: 0,
            diverged,
        }
    };

    catalog.save(schema)?;
    Ok(reconciled)
}

/// Ask every partition for its schema, in rank order.
async fn fetch_schemas(partitions: &mut [PartitionHandle]) -> Result<Vec<(i64, SchemaMap)>> {
    join_all(partitions.iter_mut().map(|p| p.schema()))
        .await
        .into_iter()
        .collect()
}

/// Freeze ranks in ascending order. If rank k fails, ranks k-1..0 are
/// unfrozen again before the error is returned.
pub async fn freeze_all(partitions: &mut [PartitionHandle]) -> Result<()> {
    for k in 0..partitions.len() {
        if let Err(e) = partitions[k].freeze().await {
            tracing::warn!(
                "Freeze failed on partition {}: {}; rolling back",
                partitions[k].rank(),
                e
            );
            for p in partitions[..k].iter_mut().rev() {
                if let Err(rollback) = p.unfreeze().await {
                    tracing::error!(
                        "Could not unfreeze partition {} during rollback: {}",
                        p.rank(),
                        rollback
                    );
                }
            }
            return Err(e);
        }
    }
    tracing::debug!("Froze {} partitions", partitions.len());
    Ok(())
}

/// Unfreeze every rank in descending order without stopping at failures.
/// Returns the first error encountered.
pub async fn unfreeze_all(partitions: &mut [PartitionHandle]) -> Result<()> {
    let mut first_err = None;
    for p in partitions.iter_mut().rev() {
        if let Err(e) = p.unfreeze().await {
            tracing::error!("Could not unfreeze partition {}: {}", p.rank(), e);
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Forget the cached schema locally and on every partition.
pub async fn drop_cached_state(
    partitions: &mut [PartitionHandle],
    schema: &mut SchemaMap,
) -> Result<()> {
    schema.clear();
    join_all(partitions.iter_mut().map(|p| p.drop_cached_state()))
        .await
        .into_iter()
        .collect::<Result<Vec<()>>>()?;
    Ok(())
}
