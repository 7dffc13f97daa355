//! Classification of per-rank shutdown results
//!
//! A partition that terminates may close its socket before the reply
//! frame is complete. That surfaces as [`Error::ConnectionClosed`] and
//! counts as an acknowledgment, same as an explicit `ShuttingDown` reply.

use crate::common::{format_ranks, Error, Reply, Request, Result};
use crate::coordinator::partition_client::PartitionHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The partition acknowledged, or severed the channel while terminating
    Acknowledged,
    /// Transport failure unrelated to the partition terminating
    Unreachable(String),
    /// The partition answered with an error
    Refused(String),
}

impl ShutdownOutcome {
    pub fn classify(result: Result<Reply>) -> Self {
        match result {
            Ok(Reply::ShuttingDown) | Ok(Reply::Ok) => ShutdownOutcome::Acknowledged,
            Err(Error::ConnectionClosed { .. }) => ShutdownOutcome::Acknowledged,
            Ok(Reply::Error(detail)) => ShutdownOutcome::Refused(detail),
            Ok(other) => ShutdownOutcome::Refused(format!("unexpected {} reply", other.kind())),
            Err(e) => ShutdownOutcome::Unreachable(e.to_string()),
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, ShutdownOutcome::Acknowledged)
    }
}

impl std::fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownOutcome::Acknowledged => write!(f, "acknowledged"),
            ShutdownOutcome::Unreachable(detail) => write!(f, "unreachable: {}", detail),
            ShutdownOutcome::Refused(detail) => write!(f, "refused: {}", detail),
        }
    }
}

impl PartitionHandle {
    /// Ask the partition to terminate. Never fails; the outcome says how
    /// the partition reacted.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        ShutdownOutcome::classify(self.call_raw(Request::Shutdown).await)
    }
}

/// Outcome of a cluster-wide shutdown, one entry per rank in visit order
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    outcomes: Vec<(usize, ShutdownOutcome)>,
}

impl ShutdownReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rank: usize, outcome: ShutdownOutcome) {
        self.outcomes.push((rank, outcome));
    }

    pub fn failed_ranks(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_acknowledged())
            .map(|(rank, _)| *rank)
            .collect()
    }

    /// Fold into one result; every failed rank is named in the error.
    pub fn into_result(self) -> Result<()> {
        let failures: Vec<String> = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_acknowledged())
            .map(|(rank, outcome)| {
                format!("could not shut down partition rank {} ({})", rank, outcome)
            })
            .collect();
        if failures.is_empty() {
            return Ok(());
        }
        let ranks = self.failed_ranks();
        tracing::debug!("Shutdown failed on ranks {}", format_ranks(&ranks));
        Err(Error::ShutdownPartial {
            ranks,
            detail: failures.join("; "),
        })
    }
}
