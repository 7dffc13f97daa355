//! Utility functions for minidoc

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Socket path of a partition rank: `<work_dir>/<rank>`
pub fn partition_endpoint(work_dir: &Path, rank: usize) -> PathBuf {
    work_dir.join(rank.to_string())
}

/// Get current Unix timestamp (nanoseconds), used as a schema version stamp.
/// Never returns 0, which partitions reserve for "never initialized".
pub fn timestamp_now_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
        .max(1)
}

/// Retry with exponential backoff while the error is retryable
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_attempts: usize,
    initial_delay: Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    "Attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Format a rank list as "0, 2, 5"
pub fn format_ranks(ranks: &[usize]) -> String {
    ranks
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
