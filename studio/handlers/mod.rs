pub mod models;
pub mod train;
pub mod train_sse;
pub mod users;

use std::io::Read;

use serde::de::DeserializeOwned;
use tiny_http::Request;

use ferrite_workbench::{ArchitectureError, StoreError};

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: u64 = 50 * 1024 * 1024;

/// A failed request, rendered as `{"error": message}` with `status`.
#[derive(Debug)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError { status: 400, message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> ApiError {
        ApiError { status: 409, message: message.into() }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> ApiError {
        let status = match &e {
            StoreError::NotFoundOrForbidden { .. } | StoreError::UnknownUser(_) => 404,
            StoreError::MissingOwner
            | StoreError::InvalidName(_)
            | StoreError::UserRejected(_)
            | StoreError::Architecture(_) => 400,
            _ => 500,
        };
        ApiError { status, message: e.to_string() }
    }
}

impl From<ArchitectureError> for ApiError {
    fn from(e: ArchitectureError) -> ApiError {
        ApiError::bad_request(e.to_string())
    }
}

/// Reads and parses a JSON request body.
pub fn read_json<T: DeserializeOwned>(request: &mut Request) -> Result<T, ApiError> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| ApiError::bad_request(format!("failed to read request body: {}", e)))?;
    if body.len() as u64 > MAX_BODY_BYTES {
        return Err(ApiError { status: 413, message: "request body too large".into() });
    }
    serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))
}
