// Error types for the community directory

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::CommunityStatus;

/// Errors raised by the listing engine and the single-entity operations.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// `nearest` requested without a usable origin
    #[error("nearest ordering requires valid lat and lng")]
    InvalidCoordinates,

    #[error("invalid search input: {0}")]
    InvalidSearchInput(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("unsupported group: {0}")]
    InvalidGroup(String),

    #[error("invalid orderBy: {0}")]
    InvalidSort(String),

    #[error("invalid fields: {0}")]
    InvalidProjection(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: CommunityStatus,
        to: CommunityStatus,
    },

    /// Single-entity lookups only; listings answer with an empty page
    #[error("community not found: {0}")]
    CommunityNotFound(String),

    #[error(transparent)]
    Decimal(#[from] DecimalError),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error("request deadline exceeded")]
    Timeout,
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors from the external GraphQL indexers.
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("indexer transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("indexer returned errors: {0}")]
    Graphql(String),

    #[error("malformed indexer payload: {0}")]
    Payload(String),
}

/// Fixed-point rescaling failures. Never rounded away silently.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecimalError {
    #[error("invalid base units: {0}")]
    InvalidBaseUnits(String),

    #[error("decimal exponent {0} out of range")]
    ExponentOutOfRange(u32),

    #[error("{value} has more than {exponent} fractional digits")]
    PrecisionLoss { value: String, exponent: u32 },
}

impl DirectoryError {
    fn status(&self) -> StatusCode {
        match self {
            DirectoryError::InvalidCoordinates
            | DirectoryError::InvalidSearchInput(_)
            | DirectoryError::InvalidFilter(_)
            | DirectoryError::InvalidGroup(_)
            | DirectoryError::InvalidSort(_)
            | DirectoryError::InvalidProjection(_)
            | DirectoryError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            DirectoryError::InvalidTransition { .. } => StatusCode::CONFLICT,
            DirectoryError::CommunityNotFound(_) => StatusCode::NOT_FOUND,
            DirectoryError::Indexer(_) => StatusCode::BAD_GATEWAY,
            DirectoryError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            // rescaling only fails on stored or indexed amounts, or on config
            DirectoryError::Decimal(_)
            | DirectoryError::Store(_)
            | DirectoryError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
