//! HTTP error responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::error::{ChainError, LlmError};

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human readable description.
    pub detail: String,
}

/// Error returned by HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request or the runnable input was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No route matched.
    #[error("not found: {0}")]
    NotFound(String),

    /// An upstream dependency is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Anything else; details are logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// A framework response re-wrapped with its original status.
    #[error("{status}: {detail}")]
    Status {
        /// Original status.
        status: StatusCode,
        /// Original message.
        detail: String,
    },
}

impl ApiError {
    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Status { status, .. } => *status,
        }
    }

    /// Message safe to show to clients.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput(detail)
            | Self::Unavailable(detail)
            | Self::Status { detail, .. } => detail.clone(),
            Self::NotFound(path) => format!("Not Found: {}", path),
            Self::Internal(_) => "Internal Server Error".to_string(),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidInput(detail) => Self::InvalidInput(detail),
            ChainError::Llm(LlmError::RateLimited) => {
                Self::Unavailable("model endpoint is rate limited, retry later".to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(error = %detail, "Request failed");
        }

        let status = self.status();
        let mut response = (
            status,
            Json(ErrorBody {
                detail: self.public_message(),
            }),
        )
            .into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
