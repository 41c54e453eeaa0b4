use thiserror::Error;

/// Failures reported by the identity service adapter.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The service says there is no valid session. A confident negative.
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status: {0}")]
    UnexpectedStatus(u16),

    #[error("invalid response from identity service: {0}")]
    InvalidResponse(String),
}

impl IdentityError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, IdentityError::Unauthorized)
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return IdentityError::UnexpectedStatus(status.as_u16());
        }
        if e.is_decode() {
            return IdentityError::InvalidResponse(e.to_string());
        }
        IdentityError::Transport(e.to_string())
    }
}

/// Failures writing to durable key-value storage.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A storage slot that could not be turned back into a session.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("slot holds no access token")]
    MissingToken,

    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

/// Failures setting up or tearing down the session layer itself.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {0}")]
    Config(String),
}
