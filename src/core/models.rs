use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A managed network device, as stored in the device registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(alias = "ip")]
    pub address: String,
    pub vendor: String,
    pub location: String,
    pub last_backup: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn default_ssh_port() -> u16 {
    22
}

/// Credentials used to log into every device of one job.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialProfile {
    #[serde(default)]
    pub name: String,
    pub username: String,
    #[serde(alias = "password")]
    pub secret: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl fmt::Debug for CredentialProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProfile")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

/// A batch backup request as received from a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    pub device_ids: Vec<String>,
    pub commands: Vec<String>,
    #[serde(alias = "template")]
    pub profile: CredentialProfile,
}

/// One device bound to the job's shared command list and profile.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub device_id: String,
    pub device_name: String,
    pub device_address: String,
    pub profile: Arc<CredentialProfile>,
    pub commands: Arc<[String]>,
}

impl TaskDescriptor {
    pub fn new(device: &Device, profile: Arc<CredentialProfile>, commands: Arc<[String]>) -> Self {
        Self {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            device_address: device.address.clone(),
            profile,
            commands,
        }
    }

    /// `host:port` used in log fields and failure messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.device_address, self.profile.port)
    }

    /// Build the failure outcome for this task.
    pub fn failure(&self, kind: FailureKind, message: impl Into<String>) -> DeviceOutcome {
        DeviceOutcome::Failure(BackupFailure {
            device_id: self.device_id.clone(),
            device_name: self.device_name.clone(),
            device_address: self.device_address.clone(),
            kind,
            message: message.into(),
        })
    }
}

/// Category of a per-device failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authentication,
    Protocol,
    ConnectionTimeout,
    Network,
    Execution,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Protocol => "protocol",
            Self::ConnectionTimeout => "connection_timeout",
            Self::Network => "network",
            Self::Execution => "execution",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupSuccess {
    pub device_id: String,
    pub device_name: String,
    pub device_address: String,
    pub filename: String,
    pub content: String,
    pub checksum: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupFailure {
    pub device_id: String,
    pub device_name: String,
    pub device_address: String,
    #[serde(rename = "failure_kind")]
    pub kind: FailureKind,
    pub message: String,
}

/// Result of running one task. Every dispatched task yields exactly one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceOutcome {
    Success(BackupSuccess),
    Failure(BackupFailure),
}

impl DeviceOutcome {
    pub fn device_id(&self) -> &str {
        match self {
            Self::Success(s) => &s.device_id,
            Self::Failure(f) => &f.device_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub total_dispatched: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub successes: Vec<BackupSuccess>,
    pub failures: Vec<BackupFailure>,
}

/// A stored backup of one device, written once per successful outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub filename: String,
    pub checksum: String,
    pub commands: Vec<String>,
    pub profile_name: String,
}
