use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use tokio_rusqlite::{Connection, rusqlite};

use crate::core::{BackupRecord, BackupStore, Device, DeviceRegistry};

pub mod backups;
pub mod devices;

pub async fn init(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    prepare(&conn).await?;
    Ok(conn)
}

/// Fresh private database, used by tests.
pub async fn init_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().await?;
    prepare(&conn).await?;
    Ok(conn)
}

async fn prepare(conn: &Connection) -> Result<()> {
    conn.call(|conn| {
        // SQLite disables foreign keys by default; cascades depend on them
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;

        Ok::<(), rusqlite::Error>(())
    })
    .await?;

    Ok(())
}

/// Fixed-width RFC 3339 (nanoseconds, `Z`), so text order is time order.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(column: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// SQLite-backed device registry and backup store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DeviceRegistry for SqliteStore {
    async fn resolve(&self, ids: &[String]) -> Result<Vec<Device>> {
        devices::resolve(&self.conn, ids.to_vec()).await
    }
}

#[async_trait]
impl BackupStore for SqliteStore {
    async fn commit_batch(&self, records: &[BackupRecord]) -> Result<()> {
        backups::commit_batch(&self.conn, records.to_vec()).await
    }
}
