//! # gtmwire
//!
//! Stream parser and transaction correlator for the GTM XML-framed
//! request/response protocol carried over TCP.
//!
//! This crate is the parsing/correlation core of a traffic-inspection
//! pipeline. Upstream, a packet-capture host delivers ordered
//! per-direction TCP payload chunks; downstream, a publisher turns
//! matched request/response pairs into structured events. The crate
//! itself performs no I/O and spawns no threads: everything is driven
//! synchronously through [`Connection`].
//!
//! ## Architecture
//!
//! ```text
//! capture layer ─► Connection::feed(dir, ts, bytes)
//!                    │
//!                    ├─ StreamParser[dir]   frame reassembly + decode
//!                    │        │
//!                    ▼        ▼
//!                  Correlator::on_message   FIFO request/response pairing
//!                    │
//!                    ▼
//!                  TransactionSink          matched / unmatched emission
//! ```
//!
//! The wire protocol has no length header and no reliable correlation
//! identifier. Frames are delimited by the literal `</message>` marker,
//! classified by their `<message type="…"` indicator, and paired
//! positionally: a response always matches the oldest outstanding
//! request. Pending requests that age past the configured timeout are
//! reported unmatched, as are any left over when the host drops a flow.
//!
//! ## Example
//!
//! ```
//! use std::time::SystemTime;
//!
//! use gtmwire::{
//!     Connection, GtmConfig, MatchedTransaction, SinkError, StreamDir, TransactionSink,
//!     UnmatchedTransaction,
//! };
//!
//! struct Printer;
//!
//! impl TransactionSink for Printer {
//!     fn matched(&mut self, txn: MatchedTransaction) -> Result<(), SinkError> {
//!         println!("{} -> {}ms", txn.request.mrpc_id, txn.response_time_millis);
//!         Ok(())
//!     }
//!     fn unmatched(&mut self, txn: UnmatchedTransaction) -> Result<(), SinkError> {
//!         println!("{} unmatched: {:?}", txn.request.mrpc_id, txn.reason);
//!         Ok(())
//!     }
//! }
//!
//! let mut conn = Connection::new(&GtmConfig::default(), Printer);
//! let ts = SystemTime::now();
//! conn.feed(StreamDir::Forward, ts, br#"<message type="OPS_REQST"></message>"#)
//!     .unwrap();
//! conn.feed(StreamDir::Backward, ts, br#"<?xml version="1.0"?><message type="OPS_RESP"><retCode>0</retCode></message>"#)
//!     .unwrap();
//! ```

pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod protocol;

pub use config::GtmConfig;
pub use connection::{connection_state, Connection, FlowState};
pub use correlator::{
    Correlator, MatchedTransaction, TransactionSink, TransactionStatus, UnmatchedReason,
    UnmatchedTransaction,
};
pub use error::{GtmError, Result, SinkError};
pub use protocol::{Direction, Message, StreamDir, StreamParser};
