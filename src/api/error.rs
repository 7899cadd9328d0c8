use crate::node::NodeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Node error: {0}")]
    NodeError(#[from] NodeError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing or invalid token")]
    Unauthorized,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match self {
            ApiError::NodeError(NodeError::UnknownPeer(e)) => {
                (StatusCode::NOT_FOUND, e, "UNKNOWN_PEER")
            }
            ApiError::NodeError(NodeError::UnknownChannel(e)) => {
                (StatusCode::NOT_FOUND, e, "CHANNEL_NOT_FOUND")
            }
            ApiError::NodeError(NodeError::InvalidRoute(e)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e, "INVALID_PATH")
            }
            ApiError::NodeError(NodeError::Status { status, body }) => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
                "REJECTED",
            ),
            ApiError::NodeError(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "INTERNAL_ERROR")
            }
            ApiError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e, "INVALID_INPUT"),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid token".to_string(),
                "UNAUTHORIZED",
            ),
        };

        let body = Json(json!({
            "error": error_message,
            "status": error_code,
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
