use std::fmt;

use crate::token::TokenId;

/// Machine-readable error codes for host applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterErrorCode {
    TokenNotFound,
    InconsistentState,
    InvalidConfig,
    Persistence,
    Unknown,
}

impl ClusterErrorCode {
    /// Stable code identifier (`ZL####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::TokenNotFound => "ZL1001",
            Self::InconsistentState => "ZL1002",
            Self::InvalidConfig => "ZL2001",
            Self::Persistence => "ZL3001",
            Self::Unknown => "ZL9001",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::TokenNotFound => {
                Some("The cluster state references a vocabulary it was not saved with.")
            }
            Self::InconsistentState => Some("Internal bookkeeping is broken. Report a bug."),
            Self::InvalidConfig => Some("Fix the clustering configuration and retry."),
            Self::Persistence => Some("The state document is malformed or truncated."),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for ClusterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the clustering engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// A token id was expected in the vocabulary but is absent.
    #[error("token not found: {id}")]
    TokenNotFound { id: TokenId },

    /// An internal invariant was violated.
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    /// The configuration was rejected at construction or load time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The persisted state document could not be encoded or decoded.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("unknown clustering error: {0}")]
    Unknown(String),
}

impl ClusterError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ClusterErrorCode {
        match self {
            Self::TokenNotFound { .. } => ClusterErrorCode::TokenNotFound,
            Self::InconsistentState(_) => ClusterErrorCode::InconsistentState,
            Self::InvalidConfig(_) => ClusterErrorCode::InvalidConfig,
            Self::Persistence(_) => ClusterErrorCode::Persistence,
            Self::Unknown(_) => ClusterErrorCode::Unknown,
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

pub type Result<T, E = ClusterError> = std::result::Result<T, E>;
