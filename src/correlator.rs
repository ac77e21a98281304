//! Transaction correlator.
//!
//! One [`Correlator`] instance exists per connection. It receives the
//! decoded messages of both directions, pairs each response with the
//! oldest outstanding request, and hands completed pairs to the
//! downstream [`TransactionSink`]. Requests that never see a response
//! are evicted on age and reported as unmatched, so every request the
//! parser produced is accounted for exactly once.
//!
//! # Pairing policy
//!
//! TCP ordering guarantees each direction's messages arrive in send
//! order, but the wire carries no correlation identifier that is
//! guaranteed present or unique. Pairing is therefore positional: FIFO
//! against the pending-request queue. The origin message ids are only a
//! diagnostic; when both sides carry one and they differ, the pair is
//! still emitted, flagged with [`TransactionStatus::Error`].
//!
//! A response arriving with no pending request is discarded with a
//! warning. The protocol does not support responses preceding requests,
//! so buffering orphans would only delay mispairing; this is a policy
//! choice, not an oversight.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use crate::config::GtmConfig;
use crate::error::{GtmError, Result, SinkError};
use crate::protocol::{Message, StreamDir};

/// Upper sanity bound on payload-derived response time: one hour.
const MAX_PAYLOAD_RESPONSE_TIME_MILLIS: i64 = 3600 * 1000;

/// Health of a matched transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Paired cleanly.
    Ok,
    /// Both sides carried an origin message id and they differ.
    Error,
    /// Capture timestamps ran backwards across the pair.
    Negative,
}

/// Why a request was resolved without a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedReason {
    /// Pending age exceeded the configured transaction timeout.
    TimedOut,
    /// Connection torn down with the request still pending.
    Flushed,
}

/// A request/response pair with the derived timing fields downstream
/// event construction needs.
#[derive(Debug, Clone)]
pub struct MatchedTransaction {
    pub request: Message,
    pub response: Message,
    pub status: TransactionStatus,
    /// Capture-time delta, response minus request, in milliseconds.
    /// Negative when capture timestamps ran backwards.
    pub response_time_millis: i64,
    /// Delta of the embedded payload timestamps, clamped to
    /// `[0, response_time_millis]` and zeroed when either side's payload
    /// timestamp is absent or the delta exceeds one hour.
    pub payload_response_time_millis: i64,
    /// `response_time_millis - payload_response_time_millis`: time spent
    /// outside the producing system's own clock window.
    pub delta_request_millis: i64,
}

/// A request resolved without a response.
#[derive(Debug, Clone)]
pub struct UnmatchedTransaction {
    pub request: Message,
    pub reason: UnmatchedReason,
}

/// Downstream consumer of correlated transactions.
///
/// A sink failure is connection-fatal: it propagates to the host as
/// [`GtmError::Callback`] and the flow's state must be dropped.
pub trait TransactionSink {
    fn matched(&mut self, txn: MatchedTransaction) -> std::result::Result<(), SinkError>;
    fn unmatched(&mut self, txn: UnmatchedTransaction) -> std::result::Result<(), SinkError>;
}

/// Per-connection request/response pairing state.
#[derive(Debug)]
pub struct Correlator<S: TransactionSink> {
    timeout: Duration,
    /// Outstanding requests, oldest first.
    pending: VecDeque<Message>,
    sink: S,
    /// Responses discarded for lack of a pending request.
    orphaned_responses: u64,
}

impl<S: TransactionSink> Correlator<S> {
    /// Create a correlator for one connection.
    pub fn new(config: &GtmConfig, sink: S) -> Self {
        Self {
            timeout: config.transaction_timeout,
            pending: VecDeque::new(),
            sink,
            orphaned_responses: 0,
        }
    }

    /// Handle one decoded message from either direction.
    ///
    /// Requests are enqueued; a response pairs with the oldest pending
    /// request. Timed-out requests are swept opportunistically using
    /// the incoming message's capture timestamp as "now".
    ///
    /// # Errors
    ///
    /// [`GtmError::Callback`] when the sink rejects an emission.
    pub fn on_message(&mut self, dir: StreamDir, msg: Message) -> Result<()> {
        self.sweep(msg.timestamp)?;

        if msg.is_request {
            self.pending.push_back(msg);
            return Ok(());
        }

        let Some(request) = self.pending.pop_front() else {
            self.orphaned_responses += 1;
            tracing::warn!(
                ?dir,
                orphaned = self.orphaned_responses,
                mrpc_id = %msg.mrpc_id,
                "response with no pending request, discarding"
            );
            return Ok(());
        };

        let txn = pair(request, msg);
        self.sink.matched(txn).map_err(GtmError::Callback)
    }

    /// Evict every pending request older than the transaction timeout.
    ///
    /// Hosts with a periodic tick should call this so that a connection
    /// with no further traffic is still swept; it also runs on every
    /// message arrival.
    pub fn expire(&mut self, now: SystemTime) -> Result<()> {
        self.sweep(now)
    }

    /// Report all still-pending requests as unmatched and clear the
    /// queue. Called on connection drop, gap, or stream error so the
    /// transaction accounting stays complete.
    pub fn flush(&mut self) -> Result<()> {
        while let Some(request) = self.pending.pop_front() {
            self.sink
                .unmatched(UnmatchedTransaction {
                    request,
                    reason: UnmatchedReason::Flushed,
                })
                .map_err(GtmError::Callback)?;
        }
        Ok(())
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Responses discarded because no request was pending.
    pub fn orphaned_responses(&self) -> u64 {
        self.orphaned_responses
    }

    fn sweep(&mut self, now: SystemTime) -> Result<()> {
        // Arrival order means the front is always the oldest.
        while let Some(front) = self.pending.front() {
            let expired = now
                .duration_since(front.timestamp)
                .map(|age| age > self.timeout)
                .unwrap_or(false);
            if !expired {
                break;
            }
            let request = match self.pending.pop_front() {
                Some(r) => r,
                None => break,
            };
            tracing::warn!(mrpc_id = %request.mrpc_id, "pending request timed out");
            self.sink
                .unmatched(UnmatchedTransaction {
                    request,
                    reason: UnmatchedReason::TimedOut,
                })
                .map_err(GtmError::Callback)?;
        }
        Ok(())
    }
}

/// Build the matched pair with its derived timing fields.
fn pair(request: Message, response: Message) -> MatchedTransaction {
    let response_time_millis = millis_between(request.timestamp, response.timestamp);

    let mut status = TransactionStatus::Ok;
    if response_time_millis < 0 {
        status = TransactionStatus::Negative;
    }
    // Diagnostic only: the id mismatch flags the pair, it never rejects
    // it, since pairing is positional.
    if !request.orig_msg_id.is_empty()
        && !response.orig_msg_id.is_empty()
        && request.orig_msg_id != response.orig_msg_id
    {
        status = TransactionStatus::Error;
    }

    let raw_payload_delta = match (request.payload_timestamp, response.payload_timestamp) {
        (Some(requ_ts), Some(resp_ts)) => {
            resp_ts.signed_duration_since(requ_ts).num_milliseconds()
        }
        _ => 0,
    };
    // Sanity bounds against malformed embedded clocks.
    let payload_response_time_millis = if raw_payload_delta > MAX_PAYLOAD_RESPONSE_TIME_MILLIS {
        0
    } else {
        raw_payload_delta.clamp(0, response_time_millis.max(0))
    };

    MatchedTransaction {
        status,
        response_time_millis,
        payload_response_time_millis,
        delta_request_millis: response_time_millis - payload_response_time_millis,
        request,
        response,
    }
}

fn millis_between(from: SystemTime, to: SystemTime) -> i64 {
    match to.duration_since(from) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Direction;
    use chrono::NaiveDate;
    use std::time::Duration;

    /// Sink that records every emission.
    #[derive(Default)]
    struct RecordingSink {
        matched: Vec<MatchedTransaction>,
        unmatched: Vec<UnmatchedTransaction>,
        fail: bool,
    }

    impl TransactionSink for RecordingSink {
        fn matched(&mut self, txn: MatchedTransaction) -> std::result::Result<(), SinkError> {
            if self.fail {
                return Err("sink down".into());
            }
            self.matched.push(txn);
            Ok(())
        }

        fn unmatched(&mut self, txn: UnmatchedTransaction) -> std::result::Result<(), SinkError> {
            if self.fail {
                return Err("sink down".into());
            }
            self.unmatched.push(txn);
            Ok(())
        }
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn request(ts: SystemTime, orig_msg_id: &str) -> Message {
        let mut msg = Message::new(ts);
        msg.is_request = true;
        msg.orig_msg_id = orig_msg_id.to_string();
        msg
    }

    fn response(ts: SystemTime, orig_msg_id: &str) -> Message {
        let mut msg = Message::new(ts);
        msg.is_request = false;
        msg.direction = Direction::Reverse;
        msg.orig_msg_id = orig_msg_id.to_string();
        msg
    }

    fn payload_ts(secs: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, secs)
            .unwrap()
    }

    fn correlator() -> Correlator<RecordingSink> {
        Correlator::new(&GtmConfig::default(), RecordingSink::default())
    }

    #[test]
    fn test_fifo_pairing() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "r1")).unwrap();
        c.on_message(StreamDir::Forward, request(at(1), "r2")).unwrap();
        c.on_message(StreamDir::Backward, response(at(2), "r1")).unwrap();
        c.on_message(StreamDir::Backward, response(at(3), "r2")).unwrap();

        let sink = &c.sink;
        assert_eq!(sink.matched.len(), 2);
        assert_eq!(sink.matched[0].request.orig_msg_id, "r1");
        assert_eq!(sink.matched[1].request.orig_msg_id, "r2");
        assert_eq!(sink.matched[0].status, TransactionStatus::Ok);
        assert_eq!(c.pending_requests(), 0);
    }

    #[test]
    fn test_pairing_is_positional_even_with_swapped_ids() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "a")).unwrap();
        c.on_message(StreamDir::Forward, request(at(1), "b")).unwrap();
        // Ids arrive swapped; pairing stays FIFO and both pairs are
        // flagged rather than rejected.
        c.on_message(StreamDir::Backward, response(at(2), "b")).unwrap();
        c.on_message(StreamDir::Backward, response(at(3), "a")).unwrap();

        let sink = &c.sink;
        assert_eq!(sink.matched.len(), 2);
        assert_eq!(sink.matched[0].request.orig_msg_id, "a");
        assert_eq!(sink.matched[0].response.orig_msg_id, "b");
        assert_eq!(sink.matched[0].status, TransactionStatus::Error);
        assert_eq!(sink.matched[1].status, TransactionStatus::Error);
    }

    #[test]
    fn test_empty_id_never_flags_mismatch() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "")).unwrap();
        c.on_message(StreamDir::Backward, response(at(1), "x")).unwrap();
        assert_eq!(c.sink.matched[0].status, TransactionStatus::Ok);
    }

    #[test]
    fn test_orphan_response_discarded() {
        let mut c = correlator();
        c.on_message(StreamDir::Backward, response(at(0), "r1")).unwrap();
        assert!(c.sink.matched.is_empty());
        assert!(c.sink.unmatched.is_empty());
        assert_eq!(c.orphaned_responses(), 1);
    }

    #[test]
    fn test_response_time_millis() {
        let mut c = correlator();
        let mut requ = request(at(0), "r1");
        requ.timestamp = SystemTime::UNIX_EPOCH + Duration::from_millis(100);
        let mut resp = response(at(0), "r1");
        resp.timestamp = SystemTime::UNIX_EPOCH + Duration::from_millis(350);

        c.on_message(StreamDir::Forward, requ).unwrap();
        c.on_message(StreamDir::Backward, resp).unwrap();
        assert_eq!(c.sink.matched[0].response_time_millis, 250);
    }

    #[test]
    fn test_negative_response_time_flags_status() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(5), "r1")).unwrap();
        c.on_message(StreamDir::Backward, response(at(3), "r1")).unwrap();

        let txn = &c.sink.matched[0];
        assert_eq!(txn.response_time_millis, -2000);
        assert_eq!(txn.status, TransactionStatus::Negative);
        // Payload time clamps to zero alongside.
        assert_eq!(txn.payload_response_time_millis, 0);
    }

    #[test]
    fn test_payload_response_time_derived() {
        let mut c = correlator();
        let mut requ = request(at(0), "r1");
        requ.payload_timestamp = Some(payload_ts(0));
        let mut resp = response(at(10), "r1");
        resp.payload_timestamp = Some(payload_ts(2));

        c.on_message(StreamDir::Forward, requ).unwrap();
        c.on_message(StreamDir::Backward, resp).unwrap();

        let txn = &c.sink.matched[0];
        assert_eq!(txn.payload_response_time_millis, 2000);
        assert_eq!(txn.delta_request_millis, txn.response_time_millis - 2000);
    }

    #[test]
    fn test_payload_response_time_zero_when_either_absent() {
        let mut c = correlator();
        let mut requ = request(at(0), "r1");
        requ.payload_timestamp = Some(payload_ts(0));
        let resp = response(at(10), "r1"); // no payload timestamp

        c.on_message(StreamDir::Forward, requ).unwrap();
        c.on_message(StreamDir::Backward, resp).unwrap();
        assert_eq!(c.sink.matched[0].payload_response_time_millis, 0);
    }

    #[test]
    fn test_payload_response_time_clamped_to_capture_delta() {
        let mut c = correlator();
        let mut requ = request(at(0), "r1");
        requ.payload_timestamp = Some(payload_ts(0));
        let mut resp = response(at(1), "r1");
        resp.payload_timestamp = Some(payload_ts(30));

        c.on_message(StreamDir::Forward, requ).unwrap();
        c.on_message(StreamDir::Backward, resp).unwrap();
        // 30s of payload delta against 1s of capture delta.
        assert_eq!(c.sink.matched[0].payload_response_time_millis, 1000);
    }

    #[test]
    fn test_payload_response_time_zeroed_above_one_hour() {
        let mut c = correlator();
        let mut requ = request(at(0), "r1");
        requ.payload_timestamp = Some(
            NaiveDate::from_ymd_opt(2021, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let mut resp = response(at(10_000), "r1");
        resp.payload_timestamp = Some(
            NaiveDate::from_ymd_opt(2021, 5, 1)
                .unwrap()
                .and_hms_opt(2, 0, 0)
                .unwrap(),
        );

        c.on_message(StreamDir::Forward, requ).unwrap();
        c.on_message(StreamDir::Backward, resp).unwrap();
        assert_eq!(c.sink.matched[0].payload_response_time_millis, 0);
    }

    #[test]
    fn test_negative_payload_delta_reported_as_zero() {
        let mut c = correlator();
        let mut requ = request(at(0), "r1");
        requ.payload_timestamp = Some(payload_ts(10));
        let mut resp = response(at(5), "r1");
        resp.payload_timestamp = Some(payload_ts(0));

        c.on_message(StreamDir::Forward, requ).unwrap();
        c.on_message(StreamDir::Backward, resp).unwrap();
        assert_eq!(c.sink.matched[0].payload_response_time_millis, 0);
    }

    #[test]
    fn test_timeout_eviction_on_message_arrival() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "old")).unwrap();
        // Next request arrives 11s later; the default timeout is 10s.
        c.on_message(StreamDir::Forward, request(at(11), "new")).unwrap();

        assert_eq!(c.sink.unmatched.len(), 1);
        assert_eq!(c.sink.unmatched[0].request.orig_msg_id, "old");
        assert_eq!(c.sink.unmatched[0].reason, UnmatchedReason::TimedOut);
        assert_eq!(c.pending_requests(), 1);
    }

    #[test]
    fn test_timed_out_request_is_not_resurrected() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "old")).unwrap();
        c.expire(at(20)).unwrap();
        assert_eq!(c.sink.unmatched.len(), 1);

        // The late response pairs with nothing and is discarded.
        c.on_message(StreamDir::Backward, response(at(20), "old")).unwrap();
        assert!(c.sink.matched.is_empty());
        assert_eq!(c.orphaned_responses(), 1);
    }

    #[test]
    fn test_expire_sweeps_only_aged_requests() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "a")).unwrap();
        c.on_message(StreamDir::Forward, request(at(8), "b")).unwrap();

        c.expire(at(12)).unwrap();
        assert_eq!(c.sink.unmatched.len(), 1);
        assert_eq!(c.sink.unmatched[0].request.orig_msg_id, "a");
        assert_eq!(c.pending_requests(), 1);
    }

    #[test]
    fn test_flush_reports_all_pending() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "a")).unwrap();
        c.on_message(StreamDir::Forward, request(at(1), "b")).unwrap();

        c.flush().unwrap();
        assert_eq!(c.sink.unmatched.len(), 2);
        assert!(c
            .sink
            .unmatched
            .iter()
            .all(|u| u.reason == UnmatchedReason::Flushed));
        assert_eq!(c.pending_requests(), 0);
    }

    #[test]
    fn test_sink_failure_propagates_as_callback_error() {
        let mut c = correlator();
        c.on_message(StreamDir::Forward, request(at(0), "a")).unwrap();
        c.sink.fail = true;

        let err = c
            .on_message(StreamDir::Backward, response(at(1), "a"))
            .unwrap_err();
        assert!(matches!(err, GtmError::Callback(_)));
    }
}
