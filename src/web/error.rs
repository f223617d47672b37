use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::JobError;

/// Errors returned by HTTP handlers, rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(msg) => Self::BadRequest(msg),
            JobError::NotFound(msg) => Self::NotFound(msg),
            err @ (JobError::Registry(_) | JobError::Persistence(_)) => {
                Self::Internal(anyhow::Error::new(err))
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            Self::Internal(e) => {
                tracing::error!(error = format!("{:#}", e), "Request failed");
                format!("{:#}", e)
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_errors_map_to_status_codes() {
        let cases = [
            (JobError::Validation("No devices selected".into()), StatusCode::BAD_REQUEST),
            (JobError::NotFound("Device not found".into()), StatusCode::NOT_FOUND),
            (
                JobError::Registry(anyhow::anyhow!("db locked")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                JobError::Persistence(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn persistence_detail_keeps_cause() {
        let err = ApiError::from(JobError::Persistence(anyhow::anyhow!("disk full")));
        let ApiError::Internal(inner) = &err else {
            panic!("expected internal error");
        };
        assert!(format!("{:#}", inner).contains("disk full"));
    }
}
