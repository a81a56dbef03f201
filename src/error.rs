//! Error taxonomy for extraction and navigation.
//!
//! None of these are fatal: every variant leaves the session in a stable
//! state from which the user can retry.

use std::time::Duration;

use thiserror::Error;

/// Failure to get a usable answer from a collaborator at all.
///
/// Distinct from a collaborator that answered with an explicit failure
/// status, which is [`ExtractError::Backend`] or [`ExtractError::Pattern`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Connect(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Connect(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Empty or malformed URL; no network call was made.
    #[error("{0}")]
    Input(String),

    /// No chapter pattern, or the validation collaborator rejected the URL.
    /// Force mode bypasses this.
    #[error("{0}")]
    Pattern(String),

    /// Navigation would leave the valid chapter range, or no sibling is known.
    #[error("{0}")]
    Boundary(String),

    #[error("network error: {0}")]
    Transport(#[from] TransportError),

    /// The collaborator answered with an explicit failure.
    #[error("{0}")]
    Backend(String),

    /// Another extraction is already in flight.
    #[error("an extraction is already in progress")]
    Busy,

    /// The response arrived for a request that is no longer current.
    #[error("response superseded by a newer request")]
    Superseded,
}

impl ExtractError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Pattern(_) => "pattern",
            Self::Boundary(_) => "boundary",
            Self::Transport(_) => "transport",
            Self::Backend(_) => "backend",
            Self::Busy => "busy",
            Self::Superseded => "superseded",
        }
    }

    /// Transport failures may succeed when re-invoked; nothing retries them
    /// automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
