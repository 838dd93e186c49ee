use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Weather unavailable: {0}")]
    WeatherUnavailable(String),

    #[error("Transient external failure: {0}")]
    TransientExternal(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a retry of the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::HttpClient(_)
                | AppError::TransientExternal(_)
                | AppError::Timeout(_)
                | AppError::Database(sqlx::Error::PoolTimedOut)
                | AppError::Database(sqlx::Error::Io(_))
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::WeatherUnavailable(_)
            | AppError::TransientExternal(_)
            | AppError::ExternalApi(_)
            | AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Persistence(_)
            | AppError::InvalidConfiguration(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
