use anyhow::{Result, anyhow};
use chrono::Utc;
use serde::Deserialize;
use tokio_rusqlite::{Connection, params, rusqlite, rusqlite::OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::core::Device;

const DEFAULT_LOCATION: &str = "Unknown";

const DEVICE_COLUMNS: &str = "id, name, address, vendor, location, last_backup, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewDevice {
    pub name: String,
    #[serde(alias = "ip")]
    pub address: String,
    pub vendor: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Partial update; absent or empty fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    #[serde(alias = "ip")]
    pub address: Option<String>,
    pub vendor: Option<String>,
    pub location: Option<String>,
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let last_backup: Option<String> = row.get(5)?;
    Ok(Device {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        vendor: row.get(3)?,
        location: row.get(4)?,
        last_backup: last_backup.map(|raw| parse_timestamp(5, raw)).transpose()?,
        created_at: parse_timestamp(6, row.get(6)?)?,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create(conn: &Connection, new: NewDevice) -> Result<Device> {
    let device = Device {
        id: Uuid::now_v7().to_string(),
        name: new.name.trim().to_string(),
        address: new.address.trim().to_string(),
        vendor: new.vendor.trim().to_string(),
        location: non_empty(new.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        last_backup: None,
        created_at: Utc::now(),
    };

    let row = device.clone();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO devices (id, name, address, vendor, location, last_backup, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
            params![
                &row.id,
                &row.name,
                &row.address,
                &row.vendor,
                &row.location,
                format_timestamp(&row.created_at)
            ],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;

    Ok(device)
}

pub async fn list(conn: &Connection) -> Result<Vec<Device>> {
    conn.call(|c| {
        let mut stmt = c.prepare(&format!(
            "SELECT {} FROM devices ORDER BY created_at",
            DEVICE_COLUMNS
        ))?;
        let devices = stmt
            .query_map([], row_to_device)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok::<_, rusqlite::Error>(devices)
    })
    .await
    .map_err(|e| anyhow!("Failed to list devices: {}", e))
}

pub async fn get(conn: &Connection, id: String) -> Result<Option<Device>> {
    conn.call(move |c| {
        c.query_row(
            &format!("SELECT {} FROM devices WHERE id = ?1", DEVICE_COLUMNS),
            params![id],
            row_to_device,
        )
        .optional()
    })
    .await
    .map_err(|e| anyhow!("Failed to get device: {}", e))
}

/// Look up devices by id, in the order given. Unknown ids are skipped.
pub async fn resolve(conn: &Connection, ids: Vec<String>) -> Result<Vec<Device>> {
    conn.call(move |c| {
        let mut stmt = c.prepare(&format!(
            "SELECT {} FROM devices WHERE id = ?1",
            DEVICE_COLUMNS
        ))?;
        let mut devices = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(device) = stmt.query_row(params![id], row_to_device).optional()? {
                devices.push(device);
            }
        }
        Ok::<_, rusqlite::Error>(devices)
    })
    .await
    .map_err(|e| anyhow!("Failed to resolve devices: {}", e))
}

/// True if a device other than `except_id` already uses `address`.
pub async fn address_in_use(
    conn: &Connection,
    address: String,
    except_id: Option<String>,
) -> Result<bool> {
    conn.call(move |c| {
        c.query_row(
            "SELECT EXISTS(SELECT 1 FROM devices WHERE address = ?1 AND id IS NOT ?2)",
            params![address.trim(), except_id],
            |row| row.get::<_, bool>(0),
        )
    })
    .await
    .map_err(|e| anyhow!("Failed to check device address: {}", e))
}

pub async fn update(conn: &Connection, id: String, update: DeviceUpdate) -> Result<Option<Device>> {
    let name = non_empty(update.name);
    let address = non_empty(update.address);
    let vendor = non_empty(update.vendor);
    let location = non_empty(update.location);

    let changed = conn
        .call(move |c| {
            let rows = c.execute(
                "UPDATE devices SET
                    name = COALESCE(?2, name),
                    address = COALESCE(?3, address),
                    vendor = COALESCE(?4, vendor),
                    location = COALESCE(?5, location)
                 WHERE id = ?1",
                params![&id, name, address, vendor, location],
            )?;
            Ok::<_, rusqlite::Error>((rows > 0).then_some(id))
        })
        .await?;

    match changed {
        Some(id) => get(conn, id).await,
        None => Ok(None),
    }
}

/// Delete a device and, through the cascade, all of its backup records.
pub async fn delete(conn: &Connection, id: String) -> Result<bool> {
    conn.call(move |c| {
        c.execute("DELETE FROM devices WHERE id = ?1", params![id])
            .map(|rows| rows > 0)
    })
    .await
    .map_err(|e| anyhow!("Failed to delete device: {}", e))
}
