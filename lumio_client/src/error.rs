use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Contract query/transaction or media upload failure.
    #[error("remote call failed: {0}")]
    RemoteCallFailed(String),

    #[error("persisted state belongs to contract {stored}, expected {expected}")]
    PersistedStateStale { stored: String, expected: String },

    #[error("please connect your wallet")]
    WalletNotConnected,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ClientError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteCallFailed(message.into())
    }

    /// Short text suitable for an inline, transient error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::RemoteCallFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
