//! Router error types

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    /// No handler (and no fallback) matched an inbound payload
    #[error("no handler for `{event}` payload shape [{key}]")]
    Dispatch { event: String, key: String },

    /// Two handlers in one namespace answer to the same payload shape
    #[error("duplicate handler signature in `{namespace}`: [{key}] already registered")]
    DuplicateHandlerSignature { namespace: String, key: String },

    #[error("invalid handler signature: {0}")]
    InvalidSignature(String),

    /// A playlist mutation arrived before the session had a playlist
    #[error("no playlist exists for session {0}")]
    EmptyState(String),

    #[error("profile store failure: {0}")]
    Persistence(String),

    #[error("operation requires a logged-in identity")]
    NotAuthenticated,

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] cadence_transport::TransportError),

    #[error("core error: {0}")]
    Core(#[from] cadence_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    pub(crate) fn invalid_argument(name: &str, reason: impl std::fmt::Display) -> Self {
        RouterError::InvalidArgument {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
