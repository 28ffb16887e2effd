use thiserror::Error;

use super::transport::TransportError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The access credential was rejected and could not be renewed.
    /// Storage has been cleared; callers must not retry.
    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("No login is awaiting an OTP code")]
    NoPendingLogin,

    #[error("Failed to persist session: {0}")]
    Store(#[from] StoreError),
}

/// Why a refresh credential could not be exchanged for an access credential.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Refresh rejected with status {0}")]
    Rejected(u16),

    #[error("Malformed refresh response: {0}")]
    Malformed(String),

    #[error("Refresh response carried no access token")]
    NoCredential,

    #[error("Network error during refresh: {0}")]
    Network(#[from] TransportError),

    #[error("Failed to persist refreshed token: {0}")]
    Persist(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}
