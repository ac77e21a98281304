//! Per-direction stream parser.
//!
//! One [`StreamParser`] instance exists per TCP direction. The capture
//! layer appends payload chunks via [`StreamParser::feed`]; the parser
//! accumulates them in a `BytesMut` buffer, detects frame boundaries on
//! the literal `</message>` marker, and decodes every complete frame in
//! the buffer into a [`Message`]. Fragmentation is arbitrary: a frame
//! may arrive one byte at a time or several frames may land in a single
//! read, and the decoded output is identical either way.
//!
//! There is no length header on the wire. A frame is complete exactly
//! when the closing marker is present; until then the parser suspends,
//! keeping the partial bytes and the in-progress [`Message`] (stamped
//! with the feed timestamp that began the frame) across calls.

use std::time::SystemTime;

use bytes::{Bytes, BytesMut};

use super::extract::{attr_value, tag_value};
use super::message::{Direction, Message};
use super::timestamp::parse_payload_timestamp;
use crate::config::GtmConfig;
use crate::error::{GtmError, Result};

/// Literal closing marker delimiting a frame.
const CLOSING_MARKER: &[u8] = b"</message>";

/// Request frames are re-anchored to begin at this marker.
const REQUEST_ANCHOR: &[u8] = b"<message";

/// Response frames are re-anchored to begin at this marker.
const RESPONSE_ANCHOR: &[u8] = b"<?xml";

/// Substring of the type indicator that classifies a frame as a request.
const REQUEST_TYPE_MARKER: &str = "REQST";

/// Stateful frame reassembly for one TCP direction.
#[derive(Debug)]
pub struct StreamParser {
    /// Accumulated bytes from capture reads.
    buf: BytesMut,
    /// Stream size cap; `0` disables the check.
    max_bytes: usize,
    /// Message begun for the frame currently accumulating, `None` when
    /// no partial frame is pending.
    in_progress: Option<Message>,
}

impl StreamParser {
    /// Create a parser for one direction of a connection.
    pub fn new(config: &GtmConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(4 * 1024),
            max_bytes: config.max_stream_bytes,
            in_progress: None,
        }
    }

    /// Append a payload chunk and decode every complete frame.
    ///
    /// `ts` is the capture timestamp of the chunk; it stamps any frame
    /// that begins accumulating during this call.
    ///
    /// # Errors
    ///
    /// [`GtmError::StreamTooLarge`] when the buffer exceeds the
    /// configured cap. Fatal: the caller must drop the stream. The
    /// parser holds no other failure mode; malformed payload degrades
    /// to empty extracted fields.
    pub fn feed(&mut self, ts: SystemTime, data: &[u8]) -> Result<Vec<Message>> {
        self.buf.extend_from_slice(data);
        if self.max_bytes > 0 && self.buf.len() > self.max_bytes {
            return Err(GtmError::StreamTooLarge {
                size: self.buf.len(),
                max: self.max_bytes,
            });
        }

        let mut decoded = Vec::new();
        while !self.buf.is_empty() {
            let mut msg = self.in_progress.take().unwrap_or_else(|| Message::new(ts));

            let Some(idx) = find(&self.buf, CLOSING_MARKER) else {
                // Wait for more data; state survives in the buffer and
                // the in-progress message.
                self.in_progress = Some(msg);
                break;
            };

            // Only the matched frame's bytes leave the buffer; trailing
            // bytes of a following frame are retained for the next pass.
            let frame = self.buf.split_to(idx + CLOSING_MARKER.len()).freeze();
            decode_frame(&mut msg, frame);

            tracing::debug!(
                size = msg.size_bytes,
                is_request = msg.is_request,
                mrpc_id = %msg.mrpc_id,
                "decoded frame"
            );
            decoded.push(msg);
        }

        Ok(decoded)
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when a frame has begun accumulating but is not complete.
    pub fn has_partial_frame(&self) -> bool {
        self.in_progress.is_some()
    }
}

/// Classify a completed frame and populate the message fields.
///
/// Performed once per frame, on the raw text of the candidate. The
/// extraction helpers swallow their own failures, so a malformed frame
/// yields empty fields rather than an error.
fn decode_frame(msg: &mut Message, frame: Bytes) {
    msg.size_bytes = frame.len() as u64;

    let text = String::from_utf8_lossy(&frame);

    let message_type = attr_value("message type", &text);
    msg.orig_msg_id = tag_value("origMsgID", &text);
    msg.mrpc_id = tag_value(r#"field name="mrpcID""#, &text);
    msg.orig_sys_id = tag_value("origSysID", &text);
    msg.targ_sys_id = tag_value("targSysID", &text);
    msg.orig_prc_id = tag_value("origPrcID", &text);
    msg.command_name = attr_value("command name", &text);
    let raw_ts = tag_value("timeStamp", &text);

    if message_type.contains(REQUEST_TYPE_MARKER) {
        msg.is_request = true;
        msg.direction = Direction::Original;
        msg.raw_content = anchor(&frame, REQUEST_ANCHOR);
    } else {
        msg.is_request = false;
        msg.direction = Direction::Reverse;
        msg.ret_code = tag_value("retCode", &text);
        msg.raw_content = anchor(&frame, RESPONSE_ANCHOR);
    }

    // The wire does not always populate a correlation id; fall back to
    // the request family the frame belongs to.
    if msg.mrpc_id.trim().is_empty() {
        msg.mrpc_id = if text.contains("CIF_REQST") {
            "CIF_REQST".to_string()
        } else {
            "OPS_REQST".to_string()
        };
    }

    msg.payload_timestamp = parse_payload_timestamp(&raw_ts);
    if msg.payload_timestamp.is_none() && !raw_ts.is_empty() {
        msg.notes.push(format!("unparseable payload timestamp: {raw_ts}"));
    }
}

/// Trim a frame to start at the first occurrence of `marker`, or leave
/// it whole when the marker is absent.
fn anchor(frame: &Bytes, marker: &[u8]) -> Bytes {
    match find(frame, marker) {
        Some(idx) => frame.slice(idx..),
        None => frame.clone(),
    }
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
