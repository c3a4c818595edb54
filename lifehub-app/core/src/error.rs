use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifeHubError {
    /// Bad input from the user (empty title, malformed passcode, ...).
    /// Recovered locally by re-prompting.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Stale or revoked credentials. The user has to reconnect the provider
    /// or is not a party of the capsule they are acting on.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A third-party API answered with a non-2xx status.
    #[error("{provider} request failed with status {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid passcode")]
    InvalidPasscode,

    #[error("Vault is locked")]
    VaultLocked,
}

impl LifeHubError {
    /// Stable code for programmatic handling on the frontend.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Encryption(_) => "ENCRYPTION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::InvalidPasscode => "INVALID_PASSCODE",
            Self::VaultLocked => "LOCKED",
        }
    }

    /// Whether the caller should ask the user to reconnect an integration.
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for LifeHubError {
    fn from(err: reqwest::Error) -> Self {
        LifeHubError::Http(err.to_string())
    }
}

impl serde::Serialize for LifeHubError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LifeHubError>;
