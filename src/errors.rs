use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Store errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    DatabaseMigration(#[from] sqlx::migrate::MigrateError),

    // Cache errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // Domain errors
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    // Access errors
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    /// Map a unique-constraint violation to `InvalidState`, everything else to `Database`.
    pub fn from_insert(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::InvalidState(format!("{} already exists", what))
            }
            _ => AppError::Database(err),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_)
            | AppError::DatabaseMigration(_)
            | AppError::Redis(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::DatabaseMigration(_) => {
                tracing::error!("Database error: {:?}", self);
                "Internal server error".to_string()
            }
            AppError::Redis(_) => {
                tracing::error!("Redis error: {:?}", self);
                "Internal server error".to_string()
            }
            AppError::Configuration(_) => {
                tracing::error!("Configuration error: {:?}", self);
                "Internal server error".to_string()
            }
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
            AppError::UpstreamFailure(_) => {
                tracing::error!("Upstream failure: {:?}", self);
                self.to_string()
            }
            _ => self.to_string(),
        }
    }
}

// Implement IntoResponse for Axum
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// `{success, data|error}` envelope returned by read and query endpoints so a
/// page can render a partial failure instead of crashing.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QueryResult<T> {
    Ok { success: bool, data: T },
    Err { success: bool, error: String },
}

impl<T> QueryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Ok { .. })
    }
}

impl<T> From<Result<T>> for QueryResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => QueryResult::Ok {
                success: true,
                data,
            },
            Err(e) => QueryResult::Err {
                success: false,
                error: e.public_message(),
            },
        }
    }
}

/// Render a query outcome with the envelope body and the mapped status code.
pub fn query_response<T: Serialize>(result: Result<T>) -> Response {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    };
    (status, Json(QueryResult::from(result))).into_response()
}
