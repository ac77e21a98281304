//! Error types for gtmwire.

use thiserror::Error;

/// Boxed error produced by a downstream transaction sink.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all gtmwire operations.
///
/// Every variant is connection-fatal: the host must drop its state for
/// the affected flow. Recoverable conditions (a field pattern that does
/// not match, an unparseable payload timestamp) are not errors; they
/// degrade to empty fields and are never surfaced here.
#[derive(Debug, Error)]
pub enum GtmError {
    /// Accumulated stream data exceeded the configured maximum.
    #[error("stream data too large: {size} bytes exceeds cap of {max}")]
    StreamTooLarge { size: usize, max: usize },

    /// A downstream transaction sink call failed.
    #[error("transaction sink failed: {0}")]
    Callback(#[source] SinkError),

    /// Per-flow state handed back by the host was not a [`Connection`].
    ///
    /// [`Connection`]: crate::connection::Connection
    #[error("unexpected per-flow state type")]
    UnexpectedFlowState,
}

/// Result type alias using GtmError.
pub type Result<T> = std::result::Result<T, GtmError>;
