//! Error types for cadence core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// JSON encoding error
    #[error("encode error: {0}")]
    EncodeError(String),

    /// JSON decoding error
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Frame decoded but is not a usable envelope
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A track with the same source is already queued
    #[error("track already queued: {0}")]
    DuplicateTrack(String),

    /// Index outside the queue
    #[error("index {index} out of range for playlist of {len} tracks")]
    IndexOutOfRange { index: usize, len: usize },
}
