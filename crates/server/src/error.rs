use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug)]
pub enum Error {
    // Auth
    LoginFail,
    AuthFailNoToken,
    AuthFailTokenWrongFormat,
    InvalidSession,

    // Domain
    RoomNotFound,
    RoomExists,
    MessageNotFound,
    BlobNotFound,
    PermissionDenied(String),

    // Generic
    BadRequest(String),
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Error::LoginFail => (StatusCode::UNAUTHORIZED, "Login failed".to_string()),
            Error::AuthFailNoToken => (StatusCode::UNAUTHORIZED, "No auth token found".to_string()),
            Error::AuthFailTokenWrongFormat => (
                StatusCode::UNAUTHORIZED,
                "Auth token wrong format".to_string(),
            ),
            Error::InvalidSession => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired session".to_string(),
            ),
            Error::RoomNotFound => (StatusCode::NOT_FOUND, "Room not found".to_string()),
            Error::RoomExists => (StatusCode::CONFLICT, "Room already exists".to_string()),
            Error::MessageNotFound => (StatusCode::NOT_FOUND, "Message not found".to_string()),
            Error::BlobNotFound => (StatusCode::NOT_FOUND, "Blob not found".to_string()),
            Error::PermissionDenied(msg) => (StatusCode::FORBIDDEN, msg),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

// Allow conversion from other errors (e.g., anyhow, sqlx) easiest via string
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Internal(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound => Error::RoomNotFound,
            StoreError::RoomExists => Error::RoomExists,
            StoreError::MessageNotFound => Error::MessageNotFound,
            StoreError::NotOwner(msg) => Error::PermissionDenied(msg),
            StoreError::InvalidName => Error::BadRequest("Room name cannot be empty".to_string()),
            StoreError::Storage(e) => Error::Internal(e.to_string()),
        }
    }
}

impl From<ember_blob::BlobError> for Error {
    fn from(err: ember_blob::BlobError) -> Self {
        Error::Internal(err.to_string())
    }
}
