use crate::engine::EngineError;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Upload extension outside the allow-list
    #[error("Invalid File Format")]
    InvalidFileFormat,

    /// Compare-face called without both images
    #[error("Both File required")]
    BothFilesRequired,

    /// Missing field or otherwise malformed request
    #[error("{message}")]
    BadRequest { message: String },

    /// Unreadable multipart body
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// Capability, model, or decode failure
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidFileFormat => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BothFilesRequired => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Engine(_) | ApiError::Io(_) | ApiError::Image(_) | ApiError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {:#}", self);
        } else {
            tracing::debug!("client error: {}", self);
        }

        let body = match &self {
            ApiError::Multipart(e) => e.body_text(),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_statuses() {
        assert_eq!(ApiError::InvalidFileFormat.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::BothFilesRequired.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ApiError::BadRequest { message: "x".into() }.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_server_error_carries_message() {
        let err = ApiError::from(EngineError::ChannelClosed);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "engine thread exited");
    }

    #[test]
    fn test_messages_match_wire_text() {
        assert_eq!(ApiError::InvalidFileFormat.to_string(), "Invalid File Format");
        assert_eq!(ApiError::BothFilesRequired.to_string(), "Both File required");
    }
}
