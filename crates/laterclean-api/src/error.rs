use thiserror::Error;

/// Errors from a remote queue client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// HTTP status carried by the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Auth(_) | Self::Parse(_) => None,
        }
    }

    /// Whether the credential was rejected and a fresh one is needed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Auth(_)) || self.status() == Some(401)
    }
}
