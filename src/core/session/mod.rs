//! Remote session execution.
//!
//! One task = one SSH session to one device: connect, run every command in
//! order on its own interactive channel, assemble the artifact, write it,
//! disconnect. The transport and the end-of-output heuristic sit behind
//! traits so both can be swapped (and faked in tests) without touching the
//! coordinator.

mod capture;
mod ssh;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::{CaptureMode, SessionConfig};
use crate::core::artifact::{self, ArtifactBuilder, ArtifactStore};
use crate::core::error::SessionError;
use crate::core::models::{BackupSuccess, CredentialProfile, DeviceOutcome, TaskDescriptor};

pub use capture::{CaptureStrategy, PollUntilQuiet, UntilIdle};
pub use ssh::SshConnector;

/// Result of a read attempt on a shell channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRead {
    Data(Vec<u8>),
    /// Nothing arrived within the wait window.
    Pending,
    /// The remote side closed the channel.
    Closed,
}

/// An interactive shell channel on an established session.
#[async_trait]
pub trait ShellChannel: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError>;

    /// Wait up to `wait` for the next chunk of output.
    async fn read_within(&mut self, wait: Duration) -> Result<ChannelRead, SessionError>;

    /// Non-blocking check for output that is already buffered.
    async fn read_ready(&mut self) -> Result<ChannelRead, SessionError> {
        self.read_within(Duration::ZERO).await
    }

    async fn close(&mut self) -> Result<(), SessionError>;
}

/// An authenticated session to one device.
#[async_trait]
pub trait RemoteShell: Send {
    async fn open_channel(&mut self) -> Result<Box<dyn ShellChannel>, SessionError>;

    /// Tear down the transport. Must be safe to call after any failure.
    async fn close(&mut self);
}

/// Opens authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        profile: &CredentialProfile,
    ) -> Result<Box<dyn RemoteShell>, SessionError>;
}

/// Runs one task to exactly one outcome. Never fails: errors become
/// `DeviceOutcome::Failure`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskDescriptor) -> DeviceOutcome;
}

pub struct RemoteSessionExecutor {
    connector: Arc<dyn Connector>,
    capture: Arc<dyn CaptureStrategy>,
    artifacts: ArtifactStore,
    session_deadline: Duration,
}

impl RemoteSessionExecutor {
    pub fn new(
        connector: Arc<dyn Connector>,
        capture: Arc<dyn CaptureStrategy>,
        artifacts: ArtifactStore,
        session_deadline: Duration,
    ) -> Self {
        Self {
            connector,
            capture,
            artifacts,
            session_deadline,
        }
    }

    /// SSH-backed executor using the configured capture mode.
    pub fn from_config(config: &SessionConfig, artifacts: ArtifactStore) -> Self {
        let capture: Arc<dyn CaptureStrategy> = match config.capture {
            CaptureMode::Poll => Arc::new(PollUntilQuiet::from_config(config)),
            CaptureMode::Event => Arc::new(UntilIdle::from_config(config)),
        };

        Self::new(
            Arc::new(SshConnector::new(config.clone())),
            capture,
            artifacts,
            config.session_deadline(),
        )
    }

    async fn run_session(&self, task: &TaskDescriptor) -> Result<String, SessionError> {
        let mut shell = self
            .connector
            .connect(&task.device_address, &task.profile)
            .await?;
        debug!("Session established");

        let result =
            tokio::time::timeout(self.session_deadline, self.run_commands(shell.as_mut(), task))
                .await;

        shell.close().await;

        result.map_err(|_| {
            SessionError::timeout(&task.device_address, task.profile.port, "session deadline")
        })
    }

    async fn run_commands(&self, shell: &mut dyn RemoteShell, task: &TaskDescriptor) -> String {
        let mut artifact = ArtifactBuilder::new();

        for command in task.commands.iter() {
            match self.run_command(shell, command).await {
                Ok(output) => {
                    debug!(command = %command, bytes = output.len(), "Command captured");
                    artifact.push_output(command, &output);
                }
                Err(e) => {
                    warn!(command = %command, error = %e, "Command failed, continuing");
                    artifact.push_error(command, &e.to_string());
                }
            }
        }

        artifact.finish()
    }

    async fn run_command(
        &self,
        shell: &mut dyn RemoteShell,
        command: &str,
    ) -> Result<String, SessionError> {
        let mut channel = shell.open_channel().await?;

        let result = async {
            channel.write(format!("{}\n", command).as_bytes()).await?;
            self.capture.capture(channel.as_mut()).await
        }
        .await;

        if let Err(e) = channel.close().await {
            debug!(command = %command, error = %e, "Failed to close channel");
        }

        result
    }
}

#[async_trait]
impl TaskExecutor for RemoteSessionExecutor {
    async fn execute(&self, task: &TaskDescriptor) -> DeviceOutcome {
        let span = info_span!(
            "session",
            device_id = %task.device_id,
            device = %task.device_name,
            host = %task.device_address,
            port = task.profile.port
        );

        async {
            info!(commands = task.commands.len(), "Starting backup session");

            let content = match self.run_session(task).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(kind = %e.kind(), error = %e, "Backup session failed");
                    return task.failure(e.kind(), e.to_string());
                }
            };

            let filename = artifact::artifact_filename(&task.device_name, &task.device_address);
            if let Err(e) = self.artifacts.write(&filename, &content).await {
                let err = SessionError::execution(
                    &task.device_address,
                    task.profile.port,
                    format!("{:#}", e),
                );
                warn!(error = %err, "Failed to write artifact");
                return task.failure(err.kind(), err.to_string());
            }

            info!(filename = %filename, bytes = content.len(), "Backup session complete");

            DeviceOutcome::Success(BackupSuccess {
                device_id: task.device_id.clone(),
                device_name: task.device_name.clone(),
                device_address: task.device_address.clone(),
                checksum: artifact::checksum(&content),
                filename,
                content,
                completed_at: Utc::now(),
            })
        }
        .instrument(span)
        .await
    }
}
