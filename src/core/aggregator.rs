//! Concurrent collection of per-device outcomes.
//!
//! Workers record their outcome the moment their session ends, so the
//! success and failure lists are in completion order, not dispatch order.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use super::models::{BackupFailure, BackupSuccess, DeviceOutcome, JobResult};

#[derive(Default)]
struct Partition {
    seen: HashSet<String>,
    successes: Vec<BackupSuccess>,
    failures: Vec<BackupFailure>,
}

/// Thread-safe outcome accumulator shared by every worker of one job.
#[derive(Clone, Default)]
pub struct ResultAggregator {
    inner: Arc<Mutex<Partition>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. Returns false, dropping the outcome, if the device
    /// already reported one.
    pub async fn record(&self, outcome: DeviceOutcome) -> bool {
        let mut partition = self.inner.lock().await;

        if !partition.seen.insert(outcome.device_id().to_string()) {
            warn!(device_id = %outcome.device_id(), "Duplicate outcome ignored");
            return false;
        }

        match outcome {
            DeviceOutcome::Success(success) => partition.successes.push(success),
            DeviceOutcome::Failure(failure) => partition.failures.push(failure),
        }
        true
    }

    pub async fn contains(&self, device_id: &str) -> bool {
        self.inner.lock().await.seen.contains(device_id)
    }

    /// `(successes, failures)` recorded so far.
    pub async fn counts(&self) -> (usize, usize) {
        let partition = self.inner.lock().await;
        (partition.successes.len(), partition.failures.len())
    }

    /// Drain everything recorded into a `JobResult`.
    pub async fn into_result(self, job_id: String) -> JobResult {
        let partition = std::mem::take(&mut *self.inner.lock().await);
        let success_count = partition.successes.len();
        let failure_count = partition.failures.len();

        JobResult {
            job_id,
            total_dispatched: success_count + failure_count,
            success_count,
            failure_count,
            successes: partition.successes,
            failures: partition.failures,
        }
    }
}
