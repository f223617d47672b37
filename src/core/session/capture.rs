//! End-of-output detection for interactive shells.
//!
//! Network CLIs never signal that a command has finished printing, so the
//! capture has to guess from silence.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{ChannelRead, ShellChannel};
use crate::config::SessionConfig;
use crate::core::error::SessionError;
use crate::logging::LogThrottle;

#[async_trait]
pub trait CaptureStrategy: Send + Sync {
    /// Collect one command's output. Invalid UTF-8 is replaced, never fatal.
    async fn capture(&self, channel: &mut dyn ShellChannel) -> Result<String, SessionError>;
}

/// Settle, then poll until two back-to-back checks find nothing.
///
/// A slow device can be cut off early and a fast one still pays the settle
/// delay plus one poll interval.
#[derive(Debug, Clone)]
pub struct PollUntilQuiet {
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    /// Stop capturing after this long even if output keeps coming.
    pub max_duration: Duration,
}

impl PollUntilQuiet {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            poll_interval: config.poll_interval(),
            max_duration: config.command_timeout(),
        }
    }
}

#[async_trait]
impl CaptureStrategy for PollUntilQuiet {
    async fn capture(&self, channel: &mut dyn ShellChannel) -> Result<String, SessionError> {
        sleep(self.settle_delay).await;

        let started = Instant::now();
        let throttle = LogThrottle::new(Duration::from_secs(5));
        let mut buffer = Vec::new();

        loop {
            if started.elapsed() >= self.max_duration {
                warn!(bytes = buffer.len(), "Command output cap reached, truncating");
                break;
            }

            match channel.read_ready().await? {
                ChannelRead::Data(chunk) => {
                    buffer.extend_from_slice(&chunk);
                    if throttle.should_log() {
                        debug!(bytes = buffer.len(), "Still receiving output");
                    }
                    continue;
                }
                ChannelRead::Closed => break,
                ChannelRead::Pending => {}
            }

            sleep(self.poll_interval).await;

            match channel.read_ready().await? {
                ChannelRead::Data(chunk) => buffer.extend_from_slice(&chunk),
                ChannelRead::Pending | ChannelRead::Closed => break,
            }
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Event-driven capture: block on the channel and stop after `idle_timeout`
/// without output.
#[derive(Debug, Clone)]
pub struct UntilIdle {
    pub idle_timeout: Duration,
    pub max_duration: Duration,
}

impl UntilIdle {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            // The first chunk gets the same grace as the poll strategy's settle delay
            idle_timeout: config.settle_delay().max(config.poll_interval()),
            max_duration: config.command_timeout(),
        }
    }
}

#[async_trait]
impl CaptureStrategy for UntilIdle {
    async fn capture(&self, channel: &mut dyn ShellChannel) -> Result<String, SessionError> {
        let started = Instant::now();
        let mut buffer = Vec::new();

        loop {
            let remaining = self.max_duration.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(bytes = buffer.len(), "Command output cap reached, truncating");
                break;
            }

            match channel.read_within(self.idle_timeout.min(remaining)).await? {
                ChannelRead::Data(chunk) => buffer.extend_from_slice(&chunk),
                ChannelRead::Pending | ChannelRead::Closed => break,
            }
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
