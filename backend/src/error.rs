//! Error handling for the Optics Back-Office backend
//!
//! Every failure renders as the standard response envelope with a single
//! human-readable message and a machine code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::ApiResponse;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid movement kind: {0}")]
    InvalidKind(String),

    #[error("Invalid reason: {0}")]
    InvalidReason(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    // Lookup errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource voided: {0}")]
    Voided(String),

    // Ledger rule violations
    #[error("Duplicate stock record for product, location and variant")]
    DuplicateRecord,

    #[error("Insufficient stock: {available} available, movement requires {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("Stock record still holds {0} units")]
    HasStock(i64),

    #[error("Already voided: {0}")]
    AlreadyVoided(String),

    #[error("A reversal entry cannot itself be reversed")]
    ChainedReversal,

    // Contention
    #[error("Stock record is busy")]
    Busy,

    #[error("Operation timed out")]
    Timeout,

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidToken | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AppError::Validation { .. }
            | AppError::ValidationError(_)
            | AppError::InvalidKind(_)
            | AppError::InvalidReason(_)
            | AppError::InvalidQuantity(_)
            | AppError::HasStock(_)
            | AppError::AlreadyVoided(_)
            | AppError::ChainedReversal => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::Voided(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateRecord | AppError::InsufficientStock { .. } => StatusCode::CONFLICT,
            AppError::Busy | AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidKind(_) => "INVALID_KIND",
            AppError::InvalidReason(_) => "INVALID_REASON",
            AppError::InvalidQuantity(_) => "INVALID_QUANTITY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Voided(_) => "VOIDED",
            AppError::DuplicateRecord => "DUPLICATE_RECORD",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::HasStock(_) => "HAS_STOCK",
            AppError::AlreadyVoided(_) => "ALREADY_VOIDED",
            AppError::ChainedReversal => "CHAINED_REVERSAL",
            AppError::Busy => "BUSY",
            AppError::Timeout => "TIMEOUT",
            AppError::DatabaseError(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Transient contention, worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Busy | AppError::Timeout)
    }

    /// Message shown to API callers
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation { field, message } => format!("{}: {}", field, message),
            AppError::NotFound(resource) => format!("{} not found", resource),
            AppError::Voided(resource) => format!("{} has been voided", resource),
            AppError::Busy => {
                "The stock record is being updated by another request, please retry".to_string()
            }
            AppError::DatabaseError(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() && !self.is_retryable() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::warn!(code = self.code(), "Request rejected: {}", self);
        }

        let body = ApiResponse::failure(self.code(), self.public_message());
        (status, Json(body)).into_response()
    }
}

/// First failing field, in field-name order
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);

        match fields.into_iter().next() {
            Some((field, errors)) => {
                let message = errors
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                AppError::Validation {
                    field: field.to_string(),
                    message,
                }
            }
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Result type alias for services and handlers
pub type AppResult<T> = Result<T, AppError>;

/// Map a store failure onto the ledger taxonomy.
///
/// Unique violations on the record tuple become `DuplicateRecord`;
/// lock and statement timeouts become `Busy`.
pub fn classify_db_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return AppError::DuplicateRecord,
            Some("55P03") | Some("57014") => return AppError::Busy,
            _ => {}
        }
    }
    AppError::DatabaseError(err)
}
