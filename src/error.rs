use std::path::PathBuf;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// The one failure a download can produce. Network errors, unsupported URLs,
/// private content and missing formats all collapse into the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Download failed: {0}")]
pub struct DownloadError(pub String);

impl DownloadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Fatal problems while bringing the servers up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("could not create storage directory {path:?}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server on {addr} stopped: {source}")]
    Serve {
        addr: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(error: DownloadError) -> Self {
        Self::bad_gateway(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });

        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_error_wraps_the_underlying_message() {
        let error = DownloadError::new("ERROR: Unsupported URL: https://example.com");
        assert_eq!(
            error.to_string(),
            "Download failed: ERROR: Unsupported URL: https://example.com"
        );
        assert_eq!(error.message(), "ERROR: Unsupported URL: https://example.com");
    }

    #[tokio::test]
    async fn api_error_renders_json_error_body() {
        let response = ApiError::from(DownloadError::new("boom")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Download failed: boom" }));
    }
}
