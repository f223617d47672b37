use anyhow::{Result, anyhow};
use tokio_rusqlite::{Connection, params, rusqlite, rusqlite::OptionalExtension};

use super::{format_timestamp, parse_timestamp};
use crate::core::BackupRecord;

const BACKUP_COLUMNS: &str =
    "id, device_id, timestamp, content, filename, checksum, commands, profile_name";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<BackupRecord> {
    let commands: String = row.get(6)?;
    let commands: Vec<String> = serde_json::from_str(&commands).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(BackupRecord {
        id: row.get(0)?,
        device_id: row.get(1)?,
        timestamp: parse_timestamp(2, row.get(2)?)?,
        content: row.get(3)?,
        filename: row.get(4)?,
        checksum: row.get(5)?,
        commands,
        profile_name: row.get(7)?,
    })
}

/// Write a job's records and bump `last_backup` for each device, in one
/// transaction. Any failure rolls back the whole batch.
pub async fn commit_batch(conn: &Connection, records: Vec<BackupRecord>) -> Result<()> {
    let commands = records
        .iter()
        .map(|r| serde_json::to_string(&r.commands))
        .collect::<Result<Vec<_>, _>>()?;

    conn.call(move |c| {
        let tx = c.transaction()?;

        for (record, commands) in records.iter().zip(&commands) {
            let timestamp = format_timestamp(&record.timestamp);

            let updated = tx.execute(
                "UPDATE devices SET last_backup = ?2 WHERE id = ?1",
                params![&record.device_id, &timestamp],
            )?;
            if updated != 1 {
                // Device vanished after it was resolved
                return Err(rusqlite::Error::StatementChangedRows(updated));
            }

            tx.execute(
                "INSERT INTO backups (id, device_id, timestamp, content, filename, checksum, commands, profile_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    &record.id,
                    &record.device_id,
                    &timestamp,
                    &record.content,
                    &record.filename,
                    &record.checksum,
                    commands,
                    &record.profile_name
                ],
            )?;
        }

        tx.commit()?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;

    Ok(())
}

/// Newest first, optionally for one device only.
pub async fn list(conn: &Connection, device_id: Option<String>) -> Result<Vec<BackupRecord>> {
    conn.call(move |c| {
        let mut stmt = c.prepare(&format!(
            "SELECT {} FROM backups
             WHERE ?1 IS NULL OR device_id = ?1
             ORDER BY timestamp DESC",
            BACKUP_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![device_id], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok::<_, rusqlite::Error>(records)
    })
    .await
    .map_err(|e| anyhow!("Failed to list backups: {}", e))
}

pub async fn get(conn: &Connection, id: String) -> Result<Option<BackupRecord>> {
    conn.call(move |c| {
        c.query_row(
            &format!("SELECT {} FROM backups WHERE id = ?1", BACKUP_COLUMNS),
            params![id],
            row_to_record,
        )
        .optional()
    })
    .await
    .map_err(|e| anyhow!("Failed to get backup: {}", e))
}

/// Delete a record, returning it so the caller can clean up its artifact.
pub async fn delete(conn: &Connection, id: String) -> Result<Option<BackupRecord>> {
    conn.call(move |c| {
        let tx = c.transaction()?;
        let record = tx
            .query_row(
                &format!("SELECT {} FROM backups WHERE id = ?1", BACKUP_COLUMNS),
                params![&id],
                row_to_record,
            )
            .optional()?;
        if record.is_some() {
            tx.execute("DELETE FROM backups WHERE id = ?1", params![&id])?;
        }
        tx.commit()?;
        Ok::<_, rusqlite::Error>(record)
    })
    .await
    .map_err(|e| anyhow!("Failed to delete backup: {}", e))
}

/// Count of records still pointing at `filename`.
pub async fn count_for_filename(conn: &Connection, filename: String) -> Result<u64> {
    conn.call(move |c| {
        c.query_row(
            "SELECT COUNT(*) FROM backups WHERE filename = ?1",
            params![filename],
            |row| row.get::<_, u64>(0),
        )
    })
    .await
    .map_err(|e| anyhow!("Failed to count backups: {}", e))
}
