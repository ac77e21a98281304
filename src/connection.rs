//! Connection container and per-flow state handoff.
//!
//! A [`Connection`] owns the two per-direction [`StreamParser`]s and the
//! [`Correlator`] for one TCP flow. The host's capture layer drives it
//! synchronously: payload chunks arrive through [`Connection::feed`],
//! lifecycle notifications through the `notify_*` methods, and an
//! optional periodic [`Connection::tick`] sweeps idle flows. The core
//! performs no locking and no I/O; one connection's state must only be
//! touched by the single logical flow of calls the host delivers for it.
//!
//! Hosts that stash per-flow state behind a type-erased handle get it
//! back through the [`FlowState`] capability interface, which fails with
//! a typed error instead of silently ignoring a foreign state type.

use std::any::Any;
use std::time::SystemTime;

use crate::config::GtmConfig;
use crate::correlator::{Correlator, TransactionSink};
use crate::error::{GtmError, Result};
use crate::protocol::{StreamDir, StreamParser};

/// Per-flow application state as seen by a host that tracks many
/// protocols behind one type-erased handle.
///
/// [`Connection`] is the only concrete variant this crate produces.
pub trait FlowState: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Recover a [`Connection`] from type-erased per-flow state.
///
/// # Errors
///
/// [`GtmError::UnexpectedFlowState`] when the state is not a
/// `Connection<S>`.
pub fn connection_state<S>(state: &mut dyn FlowState) -> Result<&mut Connection<S>>
where
    S: TransactionSink + 'static,
{
    state
        .as_any_mut()
        .downcast_mut::<Connection<S>>()
        .ok_or(GtmError::UnexpectedFlowState)
}

/// State for one tracked TCP flow: two stream parsers and a correlator.
#[derive(Debug)]
pub struct Connection<S: TransactionSink> {
    streams: [StreamParser; 2],
    correlator: Correlator<S>,
}

impl<S: TransactionSink> Connection<S> {
    /// Create the state for a newly observed flow.
    pub fn new(config: &GtmConfig, sink: S) -> Self {
        Self {
            streams: [StreamParser::new(config), StreamParser::new(config)],
            correlator: Correlator::new(config, sink),
        }
    }

    /// Process one captured payload chunk for the given direction.
    ///
    /// Decoded messages are routed into the correlator, which may emit
    /// matched or unmatched transactions to the sink.
    ///
    /// # Errors
    ///
    /// Any error is connection-fatal. Pending requests are flushed as
    /// unmatched before the error is returned, so the transaction
    /// accounting stays complete; the host must then drop its state for
    /// the flow.
    pub fn feed(&mut self, dir: StreamDir, ts: SystemTime, payload: &[u8]) -> Result<()> {
        let messages = match self.streams[dir.index()].feed(ts, payload) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::debug!(?dir, %err, "stream error, dropping connection");
                // Best effort: the connection is going away either way.
                let _ = self.correlator.flush();
                return Err(err);
            }
        };

        for msg in messages {
            if let Err(err) = self.correlator.on_message(dir, msg) {
                let _ = self.correlator.flush();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Handle a lost-packet gap in one direction.
    ///
    /// The parser cannot resynchronize across missing bytes, so the
    /// whole connection is abandoned: pending requests are flushed as
    /// unmatched and the host should drop the flow's state.
    pub fn notify_gap(&mut self, dir: StreamDir) -> Result<()> {
        tracing::debug!(?dir, "gap in stream, flushing pending requests");
        self.correlator.flush()
    }

    /// Handle a TCP FIN in one direction.
    ///
    /// Passthrough: data already buffered stays valid and the opposite
    /// direction may still complete in-flight transactions.
    pub fn notify_fin(&mut self, _dir: StreamDir) {}

    /// Handle the host dropping the flow. Flushes all pending requests
    /// as unmatched, synchronously within this call.
    pub fn notify_drop(&mut self) -> Result<()> {
        self.correlator.flush()
    }

    /// Periodic sweep hook. Evicts pending requests older than the
    /// transaction timeout; needed for flows with no further traffic,
    /// which the opportunistic on-message sweep never revisits.
    pub fn tick(&mut self, now: SystemTime) -> Result<()> {
        self.correlator.expire(now)
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_requests()
    }
}

impl<S: TransactionSink + 'static> FlowState for Connection<S> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
