//! Batch backup jobs: validate, resolve, fan out, collect, persist.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::aggregator::ResultAggregator;
use super::error::JobError;
use super::models::{
    CredentialProfile, Device, FailureKind, JobRequest, JobResult, TaskDescriptor,
};
use super::notifications::{JobEvent, NotificationChannel};
use super::persistence::PersistenceWriter;
use super::session::TaskExecutor;
use crate::config::MAX_CONCURRENCY;

/// Source of device identities for a job.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Look up devices by id. Unknown ids are dropped, not reported.
    async fn resolve(&self, ids: &[String]) -> anyhow::Result<Vec<Device>>;
}

struct ValidatedRequest {
    device_ids: Vec<String>,
    commands: Vec<String>,
    profile: CredentialProfile,
}

fn validate(request: JobRequest) -> Result<ValidatedRequest, JobError> {
    let mut seen = HashSet::new();
    let device_ids: Vec<String> = request
        .device_ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();
    if device_ids.is_empty() {
        return Err(JobError::Validation("No devices selected".to_string()));
    }

    let commands: Vec<String> = request
        .commands
        .iter()
        .map(|command| command.trim())
        .filter(|command| !command.is_empty())
        .map(str::to_string)
        .collect();
    if commands.is_empty() {
        return Err(JobError::Validation("No commands provided".to_string()));
    }

    Ok(ValidatedRequest {
        device_ids,
        commands,
        profile: request.profile,
    })
}

pub struct JobCoordinator {
    registry: Arc<dyn DeviceRegistry>,
    executor: Arc<dyn TaskExecutor>,
    writer: PersistenceWriter,
    notifier: Option<Arc<dyn NotificationChannel>>,
    max_concurrency: usize,
}

impl JobCoordinator {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        executor: Arc<dyn TaskExecutor>,
        writer: PersistenceWriter,
    ) -> Self {
        Self {
            registry,
            executor,
            writer,
            notifier: None,
            max_concurrency: MAX_CONCURRENCY,
        }
    }

    /// Pool size cap, clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_notifier(mut self, notifier: Option<Arc<dyn NotificationChannel>>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run one batch backup and wait for every device to finish.
    ///
    /// Per-device failures are part of the returned `JobResult`; only
    /// invalid requests, an empty resolution, registry errors and a failed
    /// batch commit are returned as `Err`.
    pub async fn run(&self, request: JobRequest) -> Result<JobResult, JobError> {
        let job_id = Uuid::now_v7().to_string();
        let span = info_span!("job", job_id = %job_id);
        self.run_job(job_id, request).instrument(span).await
    }

    async fn run_job(&self, job_id: String, request: JobRequest) -> Result<JobResult, JobError> {
        let request = validate(request)?;
        let started = Instant::now();

        let devices = self
            .registry
            .resolve(&request.device_ids)
            .await
            .map_err(JobError::Registry)?;
        if devices.is_empty() {
            return Err(JobError::NotFound("Device not found".to_string()));
        }
        let unresolved = request.device_ids.len().saturating_sub(devices.len());
        if unresolved > 0 {
            warn!(unresolved, "Skipping unregistered device ids");
        }

        let profile = Arc::new(request.profile);
        let commands: Arc<[String]> = request.commands.into();
        let tasks: Vec<TaskDescriptor> = devices
            .iter()
            .map(|device| TaskDescriptor::new(device, profile.clone(), commands.clone()))
            .collect();

        let result = self
            .dispatch(tasks)
            .await
            .into_result(job_id.clone())
            .await;

        if let Err(e) = self
            .writer
            .commit(&result.successes, &commands, &profile.name)
            .await
        {
            error!(error = format!("{:#}", e), "Backup job could not be recorded");
            self.notify(JobEvent::Failed {
                job_id,
                error: format!("{:#}", e),
            });
            return Err(JobError::Persistence(e));
        }

        info!(
            total = result.total_dispatched,
            succeeded = result.success_count,
            failed = result.failure_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "Backup job complete"
        );

        self.notify(JobEvent::Completed {
            job_id,
            total: result.total_dispatched,
            succeeded: result.success_count,
            failures: result
                .failures
                .iter()
                .map(|f| (f.device_name.clone(), f.message.clone()))
                .collect(),
            duration_secs: started.elapsed().as_secs(),
        });

        Ok(result)
    }

    /// Run every task on a pool of `min(tasks, max_concurrency)` slots.
    async fn dispatch(&self, tasks: Vec<TaskDescriptor>) -> ResultAggregator {
        let aggregator = ResultAggregator::new();
        let pool_size = tasks.len().min(self.max_concurrency);
        let slots = Arc::new(Semaphore::new(pool_size));
        let mut workers = JoinSet::new();

        info!(devices = tasks.len(), pool_size, "Dispatching backup tasks");

        for task in tasks.iter().cloned() {
            let executor = self.executor.clone();
            let slots = slots.clone();
            let aggregator = aggregator.clone();

            workers.spawn(async move {
                // The semaphore is never closed, so this only waits for a slot
                let _slot = slots.acquire_owned().await;
                let outcome = executor.execute(&task).await;
                aggregator.record(outcome).await;
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Backup worker crashed");
            }
        }

        // A worker that panicked never reported; give its device a failure
        for task in &tasks {
            if !aggregator.contains(&task.device_id).await {
                let message = format!(
                    "Backup worker for {} crashed before reporting",
                    task.endpoint()
                );
                aggregator
                    .record(task.failure(FailureKind::Execution, message))
                    .await;
            }
        }

        let (succeeded, failed) = aggregator.counts().await;
        debug!(succeeded, failed, "All backup workers finished");

        aggregator
    }

    fn notify(&self, event: JobEvent) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(event).await {
                warn!(error = %e, "Failed to send job notification");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ids: &[&str], commands: &[&str]) -> JobRequest {
        JobRequest {
            device_ids: ids.iter().map(|s| s.to_string()).collect(),
            commands: commands.iter().map(|s| s.to_string()).collect(),
            profile: CredentialProfile {
                name: "lab".to_string(),
                username: "admin".to_string(),
                secret: "pw".to_string(),
                port: 22,
            },
        }
    }

    #[test]
    fn validation_rejects_empty_devices() {
        let err = validate(request(&[], &["show version"])).err().unwrap();
        assert!(matches!(err, JobError::Validation(ref m) if m == "No devices selected"));

        let err = validate(request(&["  "], &["show version"])).err().unwrap();
        assert!(matches!(err, JobError::Validation(_)));
    }

    #[test]
    fn validation_rejects_blank_commands() {
        let err = validate(request(&["a"], &["", "   "])).err().unwrap();
        assert!(matches!(err, JobError::Validation(ref m) if m == "No commands provided"));
    }

    #[test]
    fn validation_dedupes_ids_and_keeps_order() {
        let validated = validate(request(&["b", "a", "b", " a "], &[" show run "])).unwrap();

        assert_eq!(validated.device_ids, ["b", "a"]);
        assert_eq!(validated.commands, ["show run"]);
    }
}
