use laterclean_api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("auth error: {0}")]
    Auth(String),

    #[error("remote API error{}: {message}", status_suffix(.status))]
    RemoteApi {
        status: Option<u16>,
        message: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("a clean pass is already running")]
    CleanInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl From<ApiError> for CleanerError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Auth(message) => Self::Auth(message),
            ApiError::Api { status, message } => Self::RemoteApi {
                status: Some(status),
                message,
            },
            ApiError::Http(e) => Self::RemoteApi {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            ApiError::Parse(message) => Self::RemoteApi {
                status: None,
                message,
            },
        }
    }
}

impl From<rusqlite::Error> for CleanerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for CleanerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(format!("corrupt stored value: {e}"))
    }
}
