//! Error type for the RPC server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::replay::ReplayError;
use crate::stash::StashError;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Stash(#[from] StashError),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::NotFound(_) | RpcError::BadRequest(_) => ErrorKind::Validation,
            RpcError::Replay(e) => e.kind(),
            RpcError::Stash(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::NotFound(_)
            | RpcError::Replay(ReplayError::UnknownAction(_))
            | RpcError::Stash(StashError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Protocol => StatusCode::CONFLICT,
                ErrorKind::AllocationExhausted => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            None
        } else {
            Some(self.to_string())
        };

        let body = Json(ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            kind: self.kind(),
            details,
        });

        (status, body).into_response()
    }
}
