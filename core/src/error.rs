use crate::auth::ValidationErrors;
use crate::refresh::RefreshError;
use crate::store::StoreError;
use reqwest::StatusCode;
use serde_json::Value;

pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred while processing your request.";

#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error("authentication expired: {message}")]
    AuthExpired { message: String },
    #[error("session could not be refreshed: {0}")]
    RefreshFailed(#[from] RefreshError),
    #[error("access denied: {message}")]
    Forbidden { message: String },
    #[error("request timed out")]
    Timeout,
    #[error("request failed with status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("network error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Validation(#[from] ValidationErrors),
}

/// Coarse classification used for logging and user-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AuthExpired,
    RefreshFailed,
    Forbidden,
    Timeout,
    Validation,
    Server,
    Network,
    Other,
}

impl HttpError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }

    pub(crate) fn from_status(status: StatusCode, body: &str) -> Self {
        let message = extract_error_message(body);
        match status {
            StatusCode::UNAUTHORIZED => Self::AuthExpired { message },
            StatusCode::FORBIDDEN => Self::Forbidden { message },
            _ => Self::Status { status, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthExpired { .. } => ErrorKind::AuthExpired,
            Self::RefreshFailed(_) => ErrorKind::RefreshFailed,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Timeout => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Status { status, .. } if *status == StatusCode::UNPROCESSABLE_ENTITY => {
                ErrorKind::Validation
            }
            Self::Status { status, .. } if status.is_server_error() => ErrorKind::Server,
            Self::Transport(_) => ErrorKind::Network,
            _ => ErrorKind::Other,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthExpired { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Forbidden { .. } => Some(StatusCode::FORBIDDEN),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text suitable for a dismissible error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthExpired { message } if !message.is_empty() => message.clone(),
            Self::AuthExpired { .. } | Self::RefreshFailed(_) => {
                "Your session has expired. Please log in again.".to_string()
            }
            Self::Forbidden { message } => message.clone(),
            Self::Timeout => "The request timed out. Please try again.".to_string(),
            Self::Status { message, .. } => message.clone(),
            Self::Validation(errors) => errors.to_string(),
            other => other.to_string(),
        }
    }
}

/// Pulls a readable message out of a backend error body.
///
/// `detail` arrays (field validation errors) join each entry's `msg` with `", "`,
/// a string `detail` or `message` is used verbatim, other JSON is pretty-printed
/// and any other non-empty body is returned as is.
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return DEFAULT_ERROR_MESSAGE.to_string();
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => return trimmed.to_string(),
    };
    match value.get("detail") {
        Some(Value::Array(details)) if !details.is_empty() => {
            let messages: Vec<&str> = details
                .iter()
                .filter_map(|detail| detail.get("msg").and_then(Value::as_str))
                .filter(|msg| !msg.is_empty())
                .collect();
            return messages.join(", ");
        }
        Some(Value::String(detail)) => return detail.clone(),
        _ => {}
    }
    if let Some(Value::String(message)) = value.get("message") {
        return message.clone();
    }
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| trimmed.to_string())
}
