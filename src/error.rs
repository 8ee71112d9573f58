//! Error types for the stream-arena core.

use thiserror::Error;

/// Errors that can occur in the session wrapper and game engine.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// An upstream connection attempt failed.
    #[error("upstream connect failed: {0}")]
    Connect(String),

    /// The upstream connection was reset by the remote peer.
    #[error("connection reset by upstream")]
    ConnectionReset,

    /// DNS resolution of the upstream host failed.
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    /// An upstream operation timed out.
    #[error("upstream connection timed out")]
    Timeout,

    /// Attempted an operation that requires an active session, but the
    /// session has been disconnected.
    #[error("not connected to upstream")]
    NotConnected,

    /// The game engine task has shut down and no longer accepts commands.
    #[error("game engine unavailable")]
    EngineClosed,

    /// The upstream source reported an error the crate does not recognize.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A gift table could not be parsed.
    #[error("malformed gift table: {0}")]
    GiftTable(String),

    /// Failed to serialize or deserialize an outbound event.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for stream-arena operations.
pub type Result<T> = std::result::Result<T, ArenaError>;

// ── Failure classification ──────────────────────────────────────────

/// Coarse classification of a connection failure, used to tune the
/// reconnect backoff policy.
///
/// Classification only adjusts how aggressively backoff grows; it never
/// changes the retry/no-retry decision itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection reset by the remote peer. Retried with the gentler
    /// backoff multiplier and a lower ceiling.
    Reset,
    /// DNS resolution failure (local network issue).
    Dns,
    /// Connection or read timeout.
    Timeout,
    /// The connection dropped without a classified error.
    ConnectionClosed,
    /// An error the crate does not recognize. Retried after a fixed
    /// additional delay to avoid hot-looping on unknown failure modes.
    Unknown,
}

impl ArenaError {
    /// Classify this error for backoff purposes.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ConnectionReset => FailureKind::Reset,
            Self::DnsFailure(_) => FailureKind::Dns,
            Self::Timeout => FailureKind::Timeout,
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
                    FailureKind::Reset
                }
                std::io::ErrorKind::TimedOut => FailureKind::Timeout,
                std::io::ErrorKind::NotFound => FailureKind::Dns,
                _ => FailureKind::Unknown,
            },
            _ => FailureKind::Unknown,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn reset_classifies_as_reset() {
        assert_eq!(
            ArenaError::ConnectionReset.failure_kind(),
            FailureKind::Reset
        );
    }

    #[test]
    fn io_reset_classifies_as_reset() {
        let err = ArenaError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert_eq!(err.failure_kind(), FailureKind::Reset);
    }

    #[test]
    fn dns_and_timeout_classify_distinctly() {
        assert_eq!(
            ArenaError::DnsFailure("live.example.com".into()).failure_kind(),
            FailureKind::Dns
        );
        assert_eq!(ArenaError::Timeout.failure_kind(), FailureKind::Timeout);
    }

    #[test]
    fn unrecognized_errors_classify_as_unknown() {
        assert_eq!(
            ArenaError::Upstream("sign server rejected request".into()).failure_kind(),
            FailureKind::Unknown
        );
        assert_eq!(
            ArenaError::Connect("room offline".into()).failure_kind(),
            FailureKind::Unknown
        );
    }

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            ArenaError::NotConnected.to_string(),
            "not connected to upstream"
        );
        assert_eq!(
            ArenaError::Timeout.to_string(),
            "upstream connection timed out"
        );
    }
}
