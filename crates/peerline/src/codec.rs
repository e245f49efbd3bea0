//! Newline-delimited JSON framing.
//!
//! Each frame is one JSON event object followed by a single `\n`. Standard
//! JSON string escaping guarantees the encoded object never contains a raw
//! newline.

use crate::errors::FrameError;
use crate::event::Event;

/// Frame terminator.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Encodes an event as one complete frame, terminator included.
///
/// # Errors
///
/// Returns the encoder error when the payload cannot be represented as JSON.
pub fn encode_frame(event: &Event) -> Result<Vec<u8>, serde_json::Error> {
    let mut frame = serde_json::to_vec(event)?;
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}

/// Decodes one line into an event.
///
/// Surrounding whitespace (including the terminator) is ignored. Blank lines
/// decode to `Ok(None)`.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] when the line is not a JSON event.
pub fn decode_frame(line: &[u8]) -> Result<Option<Event>, FrameError> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(trimmed)
        .map(Some)
        .map_err(|source| FrameError::Malformed { source })
}
