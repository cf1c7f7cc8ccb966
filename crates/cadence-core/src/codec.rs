//! Cadence JSON Codec
//!
//! Every frame is one UTF-8 JSON object holding an [`Envelope`].

use bytes::Bytes;

use crate::{Envelope, Error, Result};

/// Maximum accepted frame size
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Encode an envelope to a frame
pub fn encode(envelope: &Envelope) -> Result<Bytes> {
    let buf = serde_json::to_vec(envelope).map_err(|e| Error::EncodeError(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Decode a frame to an envelope
pub fn decode(data: &[u8]) -> Result<Envelope> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(Error::DecodeError(format!(
            "frame of {} bytes exceeds {}",
            data.len(),
            MAX_FRAME_SIZE
        )));
    }

    let envelope: Envelope =
        serde_json::from_slice(data).map_err(|e| Error::DecodeError(e.to_string()))?;

    if envelope.event.trim().is_empty() {
        return Err(Error::InvalidEnvelope("empty event name".to_string()));
    }

    Ok(envelope)
}
