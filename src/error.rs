use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::application::StageStatus;
use crate::models::stage::StageNumber;
use crate::utils::error_mapping;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable classification of every failure the pipeline can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    ServerError,
    Validation,
    Conflict,
    Authorization,
    NotFound,
}

impl ErrorKind {
    /// Only transport-level and server-side failures can change on a second attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::ServerError)
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Network => "Connection Problem",
            Self::Timeout => "Request Timed Out",
            Self::ServerError => "Server Error",
            Self::Validation => "Invalid Input",
            Self::Conflict => "Action Not Allowed",
            Self::Authorization => "Access Denied",
            Self::NotFound => "Not Found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// Title + message pair shown to the user for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub title: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    InvalidFields(#[from] validator::ValidationErrors),

    #[error("Stage {0} is already assigned to another team member")]
    StageAlreadyAssigned(StageNumber),

    #[error("Stage {stage} is not in pending status. Current status: {status}")]
    StageNotPending { stage: StageNumber, status: StageStatus },

    #[error("Stage {stage} cannot {action} while {status}")]
    InvalidTransition {
        stage: StageNumber,
        status: StageStatus,
        action: &'static str,
    },

    #[error("Application is closed: {0}")]
    ApplicationClosed(String),

    #[error("Edit window expired")]
    EditWindowExpired,

    #[error("Maximum edits reached")]
    MaxEditsReached,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::Io(_) => ErrorKind::Network,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Server { .. } | Error::Json(_) => ErrorKind::ServerError,
            Error::Config(_) | Error::Validation(_) | Error::InvalidFields(_) => {
                ErrorKind::Validation
            }
            Error::StageAlreadyAssigned(_)
            | Error::StageNotPending { .. }
            | Error::InvalidTransition { .. }
            | Error::ApplicationClosed(_)
            | Error::EditWindowExpired
            | Error::MaxEditsReached
            | Error::Conflict(_) => ErrorKind::Conflict,
            Error::Unauthorized(_) => ErrorKind::Authorization,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// The bare detail text without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Config(s)
            | Error::Network(s)
            | Error::Timeout(s)
            | Error::Validation(s)
            | Error::ApplicationClosed(s)
            | Error::Conflict(s)
            | Error::Unauthorized(s)
            | Error::NotFound(s) => s.clone(),
            Error::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn user_facing(&self) -> UserFacingError {
        let kind = self.kind();
        let message = match self {
            Error::Network(_) | Error::Io(_) => {
                error_mapping::NETWORK_ERROR.to_string()
            }
            Error::Timeout(_) => error_mapping::TIMEOUT_ERROR.to_string(),
            Error::Server { .. } | Error::Json(_) => error_mapping::SERVER_ERROR.to_string(),
            Error::StageAlreadyAssigned(_) => error_mapping::STAGE_ALREADY_ASSIGNED.to_string(),
            Error::StageNotPending { .. } => error_mapping::STAGE_NOT_PENDING.to_string(),
            Error::EditWindowExpired => error_mapping::EDIT_WINDOW_EXPIRED.to_string(),
            Error::MaxEditsReached => error_mapping::MAX_EDITS_REACHED.to_string(),
            Error::InvalidFields(errs) => error_mapping::map_field_errors(errs),
            other => error_mapping::map_detail(&other.detail()),
        };
        UserFacingError {
            title: kind.title().to_string(),
            message,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_decode() {
            Error::Server {
                status: err.status().map(|s| s.as_u16()).unwrap_or(502),
                message: format!("Malformed response: {}", err),
            }
        } else if let Some(status) = err.status() {
            error_mapping::classify_response(status.as_u16(), &err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("Invalid URL: {}", err))
    }
}
