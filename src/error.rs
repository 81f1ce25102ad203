use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The server rejected the session. Credentials have already been torn down
    /// and the navigator sent to `redirect` by the time this is returned.
    #[error("Session is no longer authorized. Sign in again.")]
    Unauthorized { redirect: String },

    /// The server rejected an email/password pair. Nothing local was cleared.
    #[error("Email or password was not accepted")]
    InvalidCredentials,

    #[error("Cryptography unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("Network request failed")]
    NetworkFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to persist {key}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode or decode JSON payload")]
    Serialization(#[source] serde_json::Error),

    #[error("Invalid header value for {0}")]
    InvalidHeader(String),

    #[error("Failed to fetch {resource} (status {status})")]
    FetchFailed { resource: &'static str, status: u16 },

    #[error("Cannot determine configuration directory")]
    ConfigDirNotFound,
}

impl ClientError {
    pub(crate) fn network(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ClientError::NetworkFailure(err.into())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err)
    }
}
