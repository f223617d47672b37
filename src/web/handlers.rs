use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::WebState;
use super::error::ApiError;
use crate::core::artifact::checksum;
use crate::core::{BackupRecord, CredentialProfile, Device, JobRequest, JobResult};
use crate::db::{
    self,
    devices::{DeviceUpdate, NewDevice},
};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct ServiceInfo {
    message: &'static str,
    version: &'static str,
    status: &'static str,
    timestamp: DateTime<Utc>,
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "netguard backup API",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    max_concurrency: usize,
}

pub async fn health(State(state): State<WebState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.ctx.started_at.elapsed().as_secs(),
        max_concurrency: state.ctx.config.max_concurrency,
    })
}

/// Run a batch backup and answer once every device has finished.
pub async fn create_backup_job(
    State(state): State<WebState>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> ApiResult<Json<JobResult>> {
    let Json(request) = payload?;
    info!(
        devices = request.device_ids.len(),
        commands = request.commands.len(),
        profile = %request.profile.name,
        "Backup job requested"
    );

    let result = state.ctx.coordinator.run(request).await?;
    Ok(Json(result))
}

// Devices

fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

fn device_not_found() -> ApiError {
    ApiError::NotFound("Device not found".to_string())
}

pub async fn list_devices(State(state): State<WebState>) -> ApiResult<Json<Vec<Device>>> {
    Ok(Json(db::devices::list(&state.ctx.db).await?))
}

pub async fn create_device(
    State(state): State<WebState>,
    payload: Result<Json<NewDevice>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let Json(new) = payload?;
    require("name", &new.name)?;
    require("address", &new.address)?;
    require("vendor", &new.vendor)?;

    if db::devices::address_in_use(&state.ctx.db, new.address.clone(), None).await? {
        return Err(ApiError::Conflict(format!(
            "A device with address {} already exists",
            new.address.trim()
        )));
    }

    let device = db::devices::create(&state.ctx.db, new).await?;
    info!(device = %device.name, host = %device.address, "Device registered");
    Ok((StatusCode::CREATED, Json(device)))
}

pub async fn get_device(
    State(state): State<WebState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Device>> {
    db::devices::get(&state.ctx.db, id)
        .await?
        .map(Json)
        .ok_or_else(device_not_found)
}

pub async fn update_device(
    State(state): State<WebState>,
    Path(id): Path<String>,
    payload: Result<Json<DeviceUpdate>, JsonRejection>,
) -> ApiResult<Json<Device>> {
    let Json(update) = payload?;

    if let Some(address) = update.address.as_deref().filter(|a| !a.trim().is_empty()) {
        let in_use =
            db::devices::address_in_use(&state.ctx.db, address.to_string(), Some(id.clone()))
                .await?;
        if in_use {
            return Err(ApiError::Conflict(format!(
                "A device with address {} already exists",
                address.trim()
            )));
        }
    }

    db::devices::update(&state.ctx.db, id, update)
        .await?
        .map(Json)
        .ok_or_else(device_not_found)
}

pub async fn delete_device(
    State(state): State<WebState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !db::devices::delete(&state.ctx.db, id.clone()).await? {
        return Err(device_not_found());
    }
    info!(device_id = %id, "Device deleted");
    Ok(StatusCode::NO_CONTENT)
}

// Backups

fn backup_not_found() -> ApiError {
    ApiError::NotFound("Backup not found".to_string())
}

#[derive(Debug, Default, Deserialize)]
pub struct BackupQuery {
    device_id: Option<String>,
}

/// Backup listing entry; the content itself is only served per record.
#[derive(Serialize)]
pub struct BackupSummary {
    id: String,
    device_id: String,
    timestamp: DateTime<Utc>,
    filename: String,
    checksum: String,
    commands: Vec<String>,
    profile_name: String,
    size: usize,
}

impl From<BackupRecord> for BackupSummary {
    fn from(record: BackupRecord) -> Self {
        Self {
            size: record.content.len(),
            id: record.id,
            device_id: record.device_id,
            timestamp: record.timestamp,
            filename: record.filename,
            checksum: record.checksum,
            commands: record.commands,
            profile_name: record.profile_name,
        }
    }
}

pub async fn list_backups(
    State(state): State<WebState>,
    query: Result<Query<BackupQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<BackupSummary>>> {
    let Query(query) = query?;
    let device_id = query.device_id.filter(|id| !id.trim().is_empty());

    let records = db::backups::list(&state.ctx.db, device_id).await?;
    Ok(Json(records.into_iter().map(BackupSummary::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct SingleBackupRequest {
    #[serde(alias = "switch_id")]
    device_id: String,
    commands: Vec<String>,
    #[serde(alias = "template")]
    profile: CredentialProfile,
}

/// Back up one device now and return the stored record.
pub async fn create_backup(
    State(state): State<WebState>,
    payload: Result<Json<SingleBackupRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BackupRecord>)> {
    let Json(request) = payload?;
    let device_id = request.device_id.trim().to_string();

    let result = state
        .ctx
        .coordinator
        .run(JobRequest {
            device_ids: vec![device_id.clone()],
            commands: request.commands,
            profile: request.profile,
        })
        .await?;

    if let Some(failure) = result.failures.first() {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "Backup failed: {}",
            failure.message
        )));
    }

    let record = db::backups::list(&state.ctx.db, Some(device_id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Backup succeeded but no record was stored"))?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_backup(
    State(state): State<WebState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BackupRecord>> {
    db::backups::get(&state.ctx.db, id)
        .await?
        .map(Json)
        .ok_or_else(backup_not_found)
}

/// Delete a record. The artifact file goes too, but only when no other
/// record names it and it still holds this record's content.
pub async fn delete_backup(
    State(state): State<WebState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let record = db::backups::delete(&state.ctx.db, id)
        .await?
        .ok_or_else(backup_not_found)?;

    let remaining = db::backups::count_for_filename(&state.ctx.db, record.filename.clone()).await?;
    if remaining == 0 {
        let on_disk = state.ctx.artifacts.read(&record.filename).await?;
        if on_disk.is_some_and(|content| checksum(&content) == record.checksum) {
            state.ctx.artifacts.remove(&record.filename).await?;
        }
    }

    info!(backup_id = %record.id, filename = %record.filename, "Backup deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Serve the artifact for one record. A later run may have overwritten the
/// file, in which case the stored content is served instead.
pub async fn download_backup(
    State(state): State<WebState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let record = db::backups::get(&state.ctx.db, id)
        .await?
        .ok_or_else(backup_not_found)?;

    let content = match state.ctx.artifacts.read(&record.filename).await {
        Ok(Some(content)) if checksum(&content) == record.checksum => content,
        Ok(_) => record.content,
        Err(e) => {
            warn!(error = %e, filename = %record.filename, "Artifact unreadable, serving stored copy");
            record.content
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", record.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}
