//! Error types for the die lookup core.

/// Core errors.
#[derive(Debug, thiserror::Error)]
pub enum NukigataError {
    /// Key material could not be parsed or is not an RSA key.
    #[error("credential error: {message}")]
    Credential { message: String },

    /// Claim set rejected before signing.
    #[error("invalid claims: {reason}")]
    InvalidClaims { reason: String },

    /// Token endpoint rejected the assertion.
    #[error("token exchange rejected: HTTP {status} - {message}")]
    Auth { status: u16, message: String },

    /// A folder listing or media call failed.
    #[error("lookup failed for query [{query}]: {message}")]
    Lookup { query: String, message: String },

    /// Caller supplied an unusable lookup key.
    #[error("invalid lookup key: {reason}")]
    InvalidKey { reason: String },

    /// Order table or spreadsheet call failed.
    #[error("{service} error: HTTP {status} - {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Invalid response from a remote endpoint.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl NukigataError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Caller / config issues
            Self::InvalidKey { .. } => 1,
            Self::Config { .. } => 1,

            // Credential / auth issues
            Self::Credential { .. } => 2,
            Self::InvalidClaims { .. } => 2,
            Self::Auth { .. } => 2,

            // Remote store issues
            Self::Lookup { .. } => 3,
            Self::Upstream { .. } => 3,

            // Network/transient
            Self::Network { .. } => 5,

            // Other
            Self::InvalidResponse { .. } => 6,
        }
    }

    /// Whether the error reflects misconfiguration that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Credential { .. }
                | Self::InvalidClaims { .. }
                | Self::Auth { .. }
                | Self::Config { .. }
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for NukigataError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for core operations.
pub type NukigataResult<T> = Result<T, NukigataError>;

/// Cap on response text copied into error messages.
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 300;

pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
