mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{NotificationChannelType, NotificationConfig};

/// Job-level events worth telling an operator about.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Completed {
        job_id: String,
        total: usize,
        succeeded: usize,
        /// `(device name, reason)` for every failed device
        failures: Vec<(String, String)>,
        duration_secs: u64,
    },
    Failed {
        job_id: String,
        error: String,
    },
}

/// Notification channel implementations (Slack, ...)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, event: JobEvent) -> Result<()>;
}

pub fn create_notifier(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(slack::SlackNotifier::new(webhook.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_notifier_without_webhook() {
        let config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: Some(String::new()),
        };
        assert!(create_notifier(&config).is_none());
        assert!(create_notifier(&NotificationConfig::default()).is_none());
    }

    #[test]
    fn slack_notifier_with_webhook() {
        let config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: Some("https://hooks.slack.com/services/T/B/X".to_string()),
        };
        assert!(create_notifier(&config).is_some());
    }
}
