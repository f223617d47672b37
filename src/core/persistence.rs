//! Durable records for successful backups.
//!
//! All records of one job commit in a single transaction. Artifact files are
//! already on disk by the time this runs, so a failed commit leaves files
//! without matching records; nothing here tries to reconcile that.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{BackupRecord, BackupSuccess};

const UNNAMED_PROFILE: &str = "Unknown";

/// Durable sink for backup records.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Insert every record and set each device's `last_backup` to the
    /// record's timestamp, atomically: all or nothing.
    async fn commit_batch(&self, records: &[BackupRecord]) -> Result<()>;
}

#[derive(Clone)]
pub struct PersistenceWriter {
    store: Arc<dyn BackupStore>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn BackupStore>) -> Self {
        Self { store }
    }

    pub fn build_records(
        successes: &[BackupSuccess],
        commands: &[String],
        profile_name: &str,
    ) -> Vec<BackupRecord> {
        let profile_name = match profile_name.trim() {
            "" => UNNAMED_PROFILE,
            name => name,
        };

        successes
            .iter()
            .map(|success| BackupRecord {
                id: Uuid::now_v7().to_string(),
                device_id: success.device_id.clone(),
                timestamp: success.completed_at,
                content: success.content.clone(),
                filename: success.filename.clone(),
                checksum: success.checksum.clone(),
                commands: commands.to_vec(),
                profile_name: profile_name.to_string(),
            })
            .collect()
    }

    /// Commit one job's successes. Returns the records written.
    pub async fn commit(
        &self,
        successes: &[BackupSuccess],
        commands: &[String],
        profile_name: &str,
    ) -> Result<Vec<BackupRecord>> {
        if successes.is_empty() {
            debug!("No successful backups to record");
            return Ok(Vec::new());
        }

        let records = Self::build_records(successes, commands, profile_name);
        self.store
            .commit_batch(&records)
            .await
            .context("Backup batch rolled back")?;

        info!(records = records.len(), "Backup records committed");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<BackupRecord>>>,
    }

    #[async_trait]
    impl BackupStore for RecordingStore {
        async fn commit_batch(&self, records: &[BackupRecord]) -> Result<()> {
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(())
        }
    }

    fn success(id: &str) -> BackupSuccess {
        BackupSuccess {
            device_id: id.to_string(),
            device_name: "edge".to_string(),
            device_address: "10.0.0.1".to_string(),
            filename: "edge_10.0.0.1.cfg".to_string(),
            content: "hostname edge".to_string(),
            checksum: "abc".to_string(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn all_successes_go_in_one_batch() {
        let store = Arc::new(RecordingStore::default());
        let writer = PersistenceWriter::new(store.clone());
        let commands = vec!["show version".to_string(), "show run".to_string()];

        let records = writer
            .commit(&[success("a"), success("b")], &commands, "core-lab")
            .await
            .unwrap();

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(records[0].commands, commands);
        assert_eq!(records[0].profile_name, "core-lab");
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn nothing_is_written_without_successes() {
        let store = Arc::new(RecordingStore::default());
        let writer = PersistenceWriter::new(store.clone());

        let records = writer.commit(&[], &[], "x").await.unwrap();

        assert!(records.is_empty());
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn record_timestamp_matches_completion() {
        let done = success("a");
        let records = PersistenceWriter::build_records(&[done.clone()], &[], "  ");

        assert_eq!(records[0].timestamp, done.completed_at);
        assert_eq!(records[0].profile_name, "Unknown");
    }
}
