//! Event names carried in [`Envelope::event`](crate::Envelope)

/// Synthesized by the hub when a transport link is accepted
pub const CONNECTION: &str = "connection";
/// Synthesized on transport close, or sent by a client as `{sid}` to drop a connection
pub const DISCONNECT: &str = "disconnect";
/// Playlist operations
pub const PLAYLIST: &str = "playlist";

/// Server -> client: the connection may start issuing playlist requests
pub const READY: &str = "ready";
/// Server -> client: this connection was superseded (payload: successor id)
pub const DISCONNECTED: &str = "disconnected";
/// Server -> client: current playlist state
pub const PLAYLIST_DATA_RESPONSE: &str = "playlist-data-response";
/// Server -> client: cursor update persisted
pub const PL_UPDATE_CURRENT_FINISH: &str = "pl-update-current-finish";
/// Server -> client: an event could not be handled
pub const ERROR: &str = "error";

/// Events only the hub itself may raise
pub fn is_reserved(event: &str) -> bool {
    event == CONNECTION
}
