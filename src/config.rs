//! Shared configuration for parsers and correlators.
//!
//! One [`GtmConfig`] is built at host startup and shared read-only across
//! every tracked connection. The struct deserializes from the host's
//! config file via serde; all fields have defaults.

use std::time::Duration;

use serde::Deserialize;

/// Default stream size cap: 10 MiB per direction.
pub const DEFAULT_MAX_STREAM_BYTES: usize = 10 * 1024 * 1024;

/// Default transaction timeout: 10 seconds.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by the stream parsers and the correlator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GtmConfig {
    /// Maximum bytes buffered per direction before the stream is
    /// declared fatal. `0` disables the cap.
    pub max_stream_bytes: usize,

    /// Age after which a pending request is evicted as unmatched.
    pub transaction_timeout: Duration,
}

impl Default for GtmConfig {
    fn default() -> Self {
        Self {
            max_stream_bytes: DEFAULT_MAX_STREAM_BYTES,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }
}
