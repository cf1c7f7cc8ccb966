//! Cadence Core
//!
//! Core types and encoding for the cadence now-playing event layer.
//!
//! This crate provides:
//! - The wire envelope for named events ([`Envelope`], [`events`])
//! - JSON frame encoding/decoding ([`codec`])
//! - The playback queue model ([`PlaylistState`], [`Track`], [`PlaylistOptions`])
//!   and the invariant-preserving mutations applied to it

pub mod codec;
pub mod error;
pub mod events;
pub mod playlist;
pub mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use playlist::{floor_volume, PlaylistOptions, PlaylistState, Track};
pub use types::*;

/// Default WebSocket port
pub const DEFAULT_WS_PORT: u16 = 7440;

/// Cookie carrying the session id when the handshake has no `session` query parameter
pub const SESSION_COOKIE: &str = "cadence_session";
