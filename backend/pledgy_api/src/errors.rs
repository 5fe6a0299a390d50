//! Application-wide error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pledgy_ledger::LedgerError;
use thiserror::Error;
use tracing::error;

use crate::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settlement endpoint rejected request: {0}")]
    Settlement(String),

    #[error("missing x-participant-id header")]
    MissingIdentity,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Ledger(e) => ledger_status(e),
            Self::MissingIdentity => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Database(_)
            | Self::Migrate(_)
            | Self::Http(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Settlement(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::InvalidInput(_) | LedgerError::InvalidDeadline | LedgerError::InvalidAmount => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::Authorization(_) => StatusCode::FORBIDDEN,
        LedgerError::NotFound(_) | LedgerError::NoStake(_) => StatusCode::NOT_FOUND,
        LedgerError::GoalNotOpen(_)
        | LedgerError::PoolCapExceeded(_)
        | LedgerError::InvalidTransition { .. }
        | LedgerError::AlreadyResolved(_)
        | LedgerError::NotResolved(_)
        | LedgerError::AlreadyClaimed(_)
        | LedgerError::ClaimWindowClosed(_) => StatusCode::CONFLICT,
        LedgerError::TooEarly(_) | LedgerError::ClaimWindowOpen(_) => StatusCode::TOO_EARLY,
        LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
