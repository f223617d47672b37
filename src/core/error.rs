use thiserror::Error;

use super::models::FailureKind;

/// Job-level errors. Any of these ends the job before or after dispatch;
/// per-device problems are reported as outcomes instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Device registry lookup failed: {0}")]
    Registry(#[source] anyhow::Error),

    #[error("Failed to persist backup records: {0}")]
    Persistence(#[source] anyhow::Error),
}

/// Errors raised while talking to one device.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Authentication failed for {username}@{host}:{port}")]
    Authentication {
        host: String,
        port: u16,
        username: String,
    },

    #[error("SSH protocol error with {host}:{port}: {detail}")]
    Protocol {
        host: String,
        port: u16,
        detail: String,
    },

    #[error("Timed out during {stage} with {host}:{port}")]
    Timeout {
        host: String,
        port: u16,
        stage: &'static str,
    },

    #[error("Network error reaching {host}:{port}: {source}")]
    Network {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution failed on {host}:{port}: {detail}")]
    Execution {
        host: String,
        port: u16,
        detail: String,
    },
}

impl SessionError {
    pub fn authentication(host: &str, port: u16, username: &str) -> Self {
        Self::Authentication {
            host: host.to_string(),
            port,
            username: username.to_string(),
        }
    }

    pub fn protocol(host: &str, port: u16, detail: impl Into<String>) -> Self {
        Self::Protocol {
            host: host.to_string(),
            port,
            detail: detail.into(),
        }
    }

    pub fn timeout(host: &str, port: u16, stage: &'static str) -> Self {
        Self::Timeout {
            host: host.to_string(),
            port,
            stage,
        }
    }

    pub fn network(host: &str, port: u16, source: std::io::Error) -> Self {
        Self::Network {
            host: host.to_string(),
            port,
            source,
        }
    }

    pub fn execution(host: &str, port: u16, detail: impl Into<String>) -> Self {
        Self::Execution {
            host: host.to_string(),
            port,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Authentication { .. } => FailureKind::Authentication,
            Self::Protocol { .. } => FailureKind::Protocol,
            Self::Timeout { .. } => FailureKind::ConnectionTimeout,
            Self::Network { .. } => FailureKind::Network,
            Self::Execution { .. } => FailureKind::Execution,
        }
    }
}
