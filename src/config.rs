use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on concurrently running device sessions for one job.
pub const MAX_CONCURRENCY: usize = 10;

const DEFAULT_CONFIG_FILE: &str = "netguard.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub backup_directory: PathBuf,
    pub database_path: PathBuf,
    pub http_bind: SocketAddr,
    pub max_concurrency: usize,
    pub verbose: bool,
    pub json_logs: bool,
    pub session: SessionConfig,
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup_directory: PathBuf::from("backups"),
            database_path: PathBuf::from("netguard.db"),
            http_bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_concurrency: MAX_CONCURRENCY,
            verbose: false,
            json_logs: false,
            session: SessionConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Layer defaults, the TOML file, `NETGUARD_*` env vars and CLI overrides.
    pub fn new<T: Serialize>(config_file: Option<&Path>, overrides: Option<&T>) -> Result<Self> {
        let file = config_file.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("NETGUARD_").split("__"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment.extract().context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        if self.max_concurrency > MAX_CONCURRENCY {
            anyhow::bail!(
                "max_concurrency must not exceed {} (got {})",
                MAX_CONCURRENCY,
                self.max_concurrency
            );
        }
        if self.session.poll_interval_ms == 0 {
            anyhow::bail!("session.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

/// How a command's output is judged complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Fixed settle delay, then poll until two consecutive checks find nothing.
    Poll,
    /// Wait for output events and stop after an idle gap.
    Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_secs: u64,
    pub auth_timeout_secs: u64,
    pub banner_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// Cap on capture time for a single command.
    pub command_timeout_secs: u64,
    /// Cap on the whole command loop of one device.
    pub session_deadline_secs: u64,
    pub capture: CaptureMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            auth_timeout_secs: 30,
            banner_timeout_secs: 30,
            keepalive_interval_secs: 30,
            settle_delay_ms: 2000,
            poll_interval_ms: 500,
            command_timeout_secs: 300,
            session_deadline_secs: 900,
            capture: CaptureMode::Poll,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_secs(self.banner_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn session_deadline(&self) -> Duration {
        Duration::from_secs(self.session_deadline_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannelType {
    #[default]
    None,
    Slack,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel: NotificationChannelType,
    pub slack_webhook: Option<String>,
}
