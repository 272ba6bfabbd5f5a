/// Error Handling Module
///
/// Layered error types for the whole service:
/// 1. Domain-specific error enums (validation, database, auth, config)
/// 2. One `AppError` that every fallible operation returns
/// 3. HTTP response mapping with structured logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

use crate::db::TxError;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(&'static str, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(&'static str),
    #[error("password must contain at least one digit, one lowercase letter, and one uppercase letter")]
    WeakPassword,
}

/// Database operation errors, including the terminal outcomes of the
/// retrying transaction executor.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Duplicate entry: {0}")]
    UniqueConstraintViolation(String),
    #[error("Query error: {0}")]
    QueryExecution(String),
    #[error("Database connection error: {0}")]
    ConnectionPool(String),
    #[error("Ambiguous commit: {0}")]
    AmbiguousCommit(String),
    #[error("Transaction restart failed: {0}")]
    TxnRestartFailed(String),
    #[error("Max retries exceeded: {0}")]
    MaxRetriesExceeded(String),
    #[error("Transaction cancelled")]
    Cancelled,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required config: {0}")]
    MissingRequired(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
    #[error("Config parse error: {0}")]
    Parse(#[from] config::ConfigError),
}

/// Authentication errors.
///
/// `InvalidToken` covers every reason a session token cannot be trusted:
/// bad signature, expired, malformed or revoked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid id token: {0}")]
    InvalidIdToken(String),
    #[error("missing authentication token")]
    MissingToken,
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A lookup matched no row. Kept apart from `Auth` so a verified but
    /// unregistered identity is never reported as a bad credential.
    #[error("{resource} with condition {condition} not found")]
    ResourceNotFound {
        resource: &'static str,
        condition: String,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource: &'static str, condition: impl Into<String>) -> Self {
        AppError::ResourceNotFound {
            resource,
            condition: condition.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::ResourceNotFound { .. })
    }
}

// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db_err.message().to_string(),
                ))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::QueryExecution(err.to_string())),
        }
    }
}

impl From<TxError<sqlx::Error>> for AppError {
    fn from(err: TxError<sqlx::Error>) -> Self {
        match err {
            TxError::Failed(e) => AppError::from(e),
            TxError::AmbiguousCommit(_) => {
                AppError::Database(DatabaseError::AmbiguousCommit(err.to_string()))
            }
            TxError::TxnRestartFailed { .. } => {
                AppError::Database(DatabaseError::TxnRestartFailed(err.to_string()))
            }
            TxError::MaxRetriesExceeded { .. } => {
                AppError::Database(DatabaseError::MaxRetriesExceeded(err.to_string()))
            }
            TxError::Cancelled => AppError::Database(DatabaseError::Cancelled),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for correlating with logs
    pub error_id: String,
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: &str, status: u16) -> Self {
        Self {
            error_id,
            message,
            code: code.to_string(),
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, error_id: &str);
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => {
                    (StatusCode::CONFLICT, "DUPLICATE_ENTRY", "Resource already exists".to_string())
                }
                DatabaseError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                DatabaseError::AmbiguousCommit(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AMBIGUOUS_COMMIT",
                    "Transaction outcome is unknown".to_string(),
                ),
                DatabaseError::TxnRestartFailed(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "TXN_RESTART_FAILED",
                    "Transaction could not be restarted".to_string(),
                ),
                DatabaseError::MaxRetriesExceeded(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "MAX_RETRIES_EXCEEDED",
                    "Transaction retry limit reached".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                ),
            },

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", "Invalid credentials".to_string())
                }
                AuthError::InvalidToken => {
                    (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", "Invalid or expired token".to_string())
                }
                AuthError::InvalidIdToken(_) => {
                    (StatusCode::UNAUTHORIZED, "ID_TOKEN_INVALID", "Invalid identity token".to_string())
                }
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN",
                    "Missing authentication token".to_string(),
                ),
            },

            AppError::ResourceNotFound { resource, .. } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{} not found", resource))
            }

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();
        let body = ErrorResponse::new(error_id.to_string(), message, code, status.as_u16());
        (status, body)
    }

    fn log_error(&self, error_id: &str) {
        match self {
            AppError::Validation(_) | AppError::Auth(_) | AppError::ResourceNotFound { .. } => {
                tracing::warn!(error_id = error_id, error = %self, "Request rejected");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(error_id = error_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(_) => {
                tracing::error!(error_id = error_id, error = %self, "Database error");
            }
            AppError::Config(_) | AppError::Internal(_) => {
                tracing::error!(error_id = error_id, error = %self, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&error_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &error_id);
        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}
