use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query string: {0}")]
    InvalidQuery(String),

    #[error("Invalid dataset name '{0}'")]
    InvalidDataset(String),

    #[error("Dataset '{0}' resolves outside the data directory")]
    OutsideDataDir(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Duplicate column '{column}' in {dataset}")]
    DuplicateColumn { dataset: String, column: String },

    #[error("Missing required column '{column}' in {dataset}")]
    MissingColumn { dataset: String, column: String },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidQuery(_) | ServiceError::InvalidDataset(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::OutsideDataDir(_) => StatusCode::FORBIDDEN,
            ServiceError::DatasetNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Csv(_)
            | ServiceError::DuplicateColumn { .. }
            | ServiceError::MissingColumn { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = %status, "request failed: {}", message);
        } else {
            warn!(status = %status, "request rejected: {}", message);
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            ServiceError::InvalidDataset("../x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::OutsideDataDir("link.csv".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::DatasetNotFound("nope.csv".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::MissingColumn {
                dataset: "data.csv".into(),
                column: "postalCode".into()
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn io_errors_are_server_errors() {
        let err = ServiceError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "I/O error: disk");
    }
}
