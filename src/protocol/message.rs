//! Decoded protocol message model.

use std::time::SystemTime;

use bytes::Bytes;
use chrono::NaiveDateTime;

/// Logical direction of a decoded message within its connection.
///
/// Requests travel in the original direction of the flow, responses in
/// the reverse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Original,
    Reverse,
}

/// Index of a TCP direction within a connection, as delivered by the
/// capture layer. `Forward` is the direction the first packet of the
/// flow was seen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDir {
    Forward,
    Backward,
}

impl StreamDir {
    /// Array index for per-direction state.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            StreamDir::Forward => 0,
            StreamDir::Backward => 1,
        }
    }
}

/// One decoded protocol unit.
///
/// Created empty when a stream parser begins accumulating a new frame,
/// populated exactly once when framing completes, immutable from then
/// on. Ownership moves to the correlator, which discards the message
/// after it is matched, timed out, or flushed.
#[derive(Debug, Clone)]
pub struct Message {
    /// Capture time of frame completion (the timestamp of the feed call
    /// that began the frame).
    pub timestamp: SystemTime,
    /// True for request frames, false for responses.
    pub is_request: bool,
    /// Logical direction, consistent with `is_request`.
    pub direction: Direction,
    /// Re-anchored frame payload.
    pub raw_content: Bytes,
    /// Number of framing bytes consumed from the stream for this frame.
    pub size_bytes: u64,
    /// Correlation id; may be a fallback constant when the wire did not
    /// populate one. Metadata only, never the pairing key.
    pub mrpc_id: String,
    /// Origin message id.
    pub orig_msg_id: String,
    /// Origin system id.
    pub orig_sys_id: String,
    /// Target system id.
    pub targ_sys_id: String,
    /// Origin process id.
    pub orig_prc_id: String,
    /// Command name.
    pub command_name: String,
    /// Return code (responses only, empty on requests).
    pub ret_code: String,
    /// Time embedded inside the payload, distinct from the capture
    /// timestamp. `None` when absent or unparseable.
    pub payload_timestamp: Option<NaiveDateTime>,
    /// Processing annotations (format anomalies and the like).
    pub notes: Vec<String>,
}

impl Message {
    /// Create an empty message stamped with the given capture time.
    pub fn new(timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            is_request: true,
            direction: Direction::Original,
            raw_content: Bytes::new(),
            size_bytes: 0,
            mrpc_id: String::new(),
            orig_msg_id: String::new(),
            orig_sys_id: String::new(),
            targ_sys_id: String::new(),
            orig_prc_id: String::new(),
            command_name: String::new(),
            ret_code: String::new(),
            payload_timestamp: None,
            notes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_empty() {
        let msg = Message::new(SystemTime::UNIX_EPOCH);
        assert!(msg.is_request);
        assert_eq!(msg.direction, Direction::Original);
        assert!(msg.raw_content.is_empty());
        assert_eq!(msg.size_bytes, 0);
        assert!(msg.mrpc_id.is_empty());
        assert!(msg.payload_timestamp.is_none());
        assert!(msg.notes.is_empty());
    }

    #[test]
    fn test_stream_dir_index() {
        assert_eq!(StreamDir::Forward.index(), 0);
        assert_eq!(StreamDir::Backward.index(), 1);
    }
}
