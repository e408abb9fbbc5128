//! Error taxonomy for tile fetch scheduling.

use thiserror::Error;

use super::request::RequestId;

/// Failure reported by the caller-supplied fetch delegate.
///
/// The scheduler treats both variants uniformly as "attempt failed" and
/// never inspects the payload; the split exists for the delegate's own
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network-level failure (connect, transfer, HTTP status).
    #[error("network error: {0}")]
    Network(String),

    /// Payload arrived but could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Terminal outcome of a scheduled request that did not deliver data.
///
/// Transient fetch and timeout failures are retried internally and only
/// surface wrapped in [`RetriesExhausted`](Self::RetriesExhausted) once
/// the retry budget is spent. Variants are `Clone` so a coalesced
/// request can deliver the same outcome to every joined caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// An attempt exceeded the per-attempt timeout.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// The configured per-attempt timeout.
        timeout_ms: u64,
    },

    /// The fetch delegate reported a failure.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The request was cancelled before completion.
    #[error("request {0} cancelled")]
    Cancelled(RequestId),

    /// Terminal failure after the retry budget was spent; wraps the last
    /// underlying attempt error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The final attempt's error.
        last: Box<SchedulerError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings() {
        let timeout = SchedulerError::Timeout { timeout_ms: 30_000 };
        assert_eq!(timeout.to_string(), "request timed out after 30000 ms");

        let fetch = SchedulerError::Fetch(FetchError::Network("boom".into()));
        assert_eq!(fetch.to_string(), "fetch failed: network error: boom");

        let cancelled = SchedulerError::Cancelled(RequestId::new("3/1/2"));
        assert_eq!(cancelled.to_string(), "request 3/1/2 cancelled");
    }

    #[test]
    fn test_retries_exhausted_wraps_last_error() {
        let err = SchedulerError::RetriesExhausted {
            attempts: 4,
            last: Box::new(SchedulerError::Fetch(FetchError::Decode("bad png".into()))),
        };
        assert_eq!(
            err.to_string(),
            "retries exhausted after 4 attempts: fetch failed: decode error: bad png"
        );
    }

    #[test]
    fn test_fetch_error_converts() {
        let err: SchedulerError = FetchError::Network("offline".into()).into();
        assert_eq!(err, SchedulerError::Fetch(FetchError::Network("offline".into())));
    }
}
