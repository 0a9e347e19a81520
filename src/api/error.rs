//! Upstream API error taxonomy

use thiserror::Error;

/// Too many requests per second
pub const CODE_TOO_MANY_REQUESTS: i64 = 6;
/// Flood control: the same action repeated too often
pub const CODE_FLOOD_CONTROL: i64 = 9;
/// Access denied codes: generic, deleted/banned, private profile, group access, wall access
pub const ACCESS_DENIED_CODES: [i64; 5] = [15, 18, 30, 203, 212];
/// Object not found
pub const CODE_NOT_FOUND: i64 = 104;
/// Invalid parameter; reported as "not found" when the referenced object is missing
pub const CODE_INVALID_PARAM: i64 = 100;

/// Errors returned by upstream API calls
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Too many requests per second: {message}")]
    RateLimited { message: String },

    #[error("Flood control: {message}")]
    FloodControl { message: String },

    #[error("Access denied (code {code}): {message}")]
    AccessDenied { code: i64, message: String },

    #[error("Not found (code {code}): {message}")]
    NotFound { code: i64, message: String },

    #[error("API error (code {code}): {message}")]
    Upstream { code: i64, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Result type for upstream calls
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Classifies an `{error_code, error_msg}` pair from the response envelope
    pub fn from_code(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            CODE_TOO_MANY_REQUESTS => Self::RateLimited { message },
            CODE_FLOOD_CONTROL => Self::FloodControl { message },
            CODE_NOT_FOUND => Self::NotFound { code, message },
            CODE_INVALID_PARAM if message.to_lowercase().contains("not found") => {
                Self::NotFound { code, message }
            }
            c if ACCESS_DENIED_CODES.contains(&c) => Self::AccessDenied { code, message },
            _ => Self::Upstream { code, message },
        }
    }

    /// Upstream error code, when the error came from the API itself
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::RateLimited { .. } => Some(CODE_TOO_MANY_REQUESTS),
            Self::FloodControl { .. } => Some(CODE_FLOOD_CONTROL),
            Self::AccessDenied { code, .. }
            | Self::NotFound { code, .. }
            | Self::Upstream { code, .. } => Some(*code),
            Self::Network(_) | Self::Timeout | Self::Decode(_) => None,
        }
    }

    /// Returns true for failures that may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::FloodControl { .. } | Self::Network(_) | Self::Timeout
        )
    }

    /// Returns true for permanent per-resource failures the caller should skip
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::AccessDenied { .. } | Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
