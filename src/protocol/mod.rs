//! Protocol module: framing, classification, and field extraction.
//!
//! This module implements the receive side of the GTM wire protocol:
//! - frame reassembly on the `</message>` closing marker
//! - request/response classification and field extraction
//! - payload timestamp normalization

mod extract;
mod message;
mod stream_parser;
mod timestamp;

pub use extract::{attr_value, tag_value};
pub use message::{Direction, Message, StreamDir};
pub use stream_parser::StreamParser;
pub use timestamp::parse_payload_timestamp;
