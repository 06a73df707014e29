//! Error types for control-plane service calls

use std::fmt;

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that can occur while talking to an external collaborator
#[derive(Debug)]
pub enum ServiceError {
    /// The request never produced a response (connection refused, timeout, ...)
    RequestFailed(String),

    /// The service answered but refused the operation
    Rejected { status: u16, message: String },

    /// The addressed resource does not exist
    NotFound(String),

    /// The response could not be understood
    InvalidResponse(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::RequestFailed(msg) => write!(f, "request failed: {}", msg),
            ServiceError::Rejected { status, message } => {
                write!(f, "request rejected ({}): {}", status, message)
            }
            ServiceError::NotFound(what) => write!(f, "not found: {}", what),
            ServiceError::InvalidResponse(msg) => write!(f, "invalid response: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::RequestFailed(err.to_string())
        }
    }
}
