use super::{JobEvent, NotificationChannel};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

/// Failed devices listed in one message before the rest is summarized.
const MAX_LISTED_FAILURES: usize = 10;

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(&self, event: &JobEvent) -> serde_json::Value {
        match event {
            JobEvent::Completed {
                job_id,
                total,
                succeeded,
                failures,
                duration_secs,
            } => {
                let short_id = &job_id[..8.min(job_id.len())];
                let title = if failures.is_empty() {
                    "Config Backup Complete"
                } else {
                    "Config Backup Finished With Failures"
                };

                let mut blocks = vec![
                    json!({
                        "type": "header",
                        "text": { "type": "plain_text", "text": title, "emoji": true }
                    }),
                    json!({
                        "type": "section",
                        "fields": [
                            { "type": "mrkdwn", "text": format!("*Job ID:*\n`{}`", short_id) },
                            { "type": "mrkdwn", "text": format!("*Devices:*\n{}", total) },
                            { "type": "mrkdwn", "text": format!("*Succeeded:*\n{}", succeeded) },
                            { "type": "mrkdwn", "text": format!("*Duration:*\n{}s", duration_secs) }
                        ]
                    }),
                ];

                if !failures.is_empty() {
                    let mut lines: Vec<String> = failures
                        .iter()
                        .take(MAX_LISTED_FAILURES)
                        .map(|(device, reason)| format!("• *{}*: {}", device, reason))
                        .collect();
                    if failures.len() > MAX_LISTED_FAILURES {
                        lines.push(format!(
                            "…and {} more",
                            failures.len() - MAX_LISTED_FAILURES
                        ));
                    }
                    blocks.push(json!({
                        "type": "section",
                        "text": { "type": "mrkdwn", "text": lines.join("\n") }
                    }));
                }

                json!({ "blocks": blocks })
            }
            JobEvent::Failed { job_id, error } => {
                let short_id = &job_id[..8.min(job_id.len())];
                json!({
                    "blocks": [
                        {
                            "type": "header",
                            "text": { "type": "plain_text", "text": "Config Backup Failed", "emoji": true }
                        },
                        {
                            "type": "section",
                            "fields": [
                                { "type": "mrkdwn", "text": format!("*Job ID:*\n`{}`", short_id) }
                            ]
                        },
                        {
                            "type": "section",
                            "text": { "type": "mrkdwn", "text": format!("*Error:*\n```{}```", error) }
                        }
                    ]
                })
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn notify(&self, event: JobEvent) -> Result<()> {
        let payload = self.format_message(&event);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
