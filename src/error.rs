//! # Errors — Failure Kinds for Tracking Operations
//!
//! Every core operation (reconcile, batch item, ingestion, deletion) reports
//! failures as a [`TrackError`]. The kind decides how the failure surfaces:
//!
//! | Kind | Meaning | HTTP status |
//! |------|---------|-------------|
//! | `Validation` | Missing or malformed caller input | 400 |
//! | `Auth` | No authenticated principal, or bad trigger secret | 401 |
//! | `Extraction` | Fetch succeeded but yielded no usable product data | 422 |
//! | `Store` | Persistence layer failure | 500 |
//! | `Notify` | Alert delivery failure (never fatal) | 500 |
//!
//! Timeouts are reported as the kind of the call that timed out.

use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Extraction(String),
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
    #[error("{0}")]
    Notify(String),
}

/// Stable machine-readable name for each error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    Extraction,
    Store,
    Notify,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Extraction => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Store | ErrorKind::Notify => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl TrackError {
    pub fn validation(msg: impl Into<String>) -> Self {
        TrackError::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        TrackError::Auth(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        TrackError::Extraction(msg.into())
    }

    pub fn notify(msg: impl Into<String>) -> Self {
        TrackError::Notify(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackError::Validation(_) => ErrorKind::Validation,
            TrackError::Auth(_) => ErrorKind::Auth,
            TrackError::Extraction(_) => ErrorKind::Extraction,
            TrackError::Store(_) => ErrorKind::Store,
            TrackError::Notify(_) => ErrorKind::Notify,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }
}

impl From<anyhow::Error> for TrackError {
    fn from(err: anyhow::Error) -> Self {
        TrackError::Store(err)
    }
}

impl From<sqlx::Error> for TrackError {
    fn from(err: sqlx::Error) -> Self {
        TrackError::Store(err.into())
    }
}

/// Run a collaborator call under a deadline, mapping expiry to `on_timeout`.
pub async fn with_timeout<T, F>(
    limit: std::time::Duration,
    fut: F,
    on_timeout: impl FnOnce() -> TrackError,
) -> Result<T, TrackError>
where
    F: std::future::Future<Output = Result<T, TrackError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
