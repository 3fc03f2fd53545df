use std::io;
use std::time::Duration;

use crate::config::settings::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS};

/// Why a connection ended before a response frame arrived
#[derive(Debug)]
pub enum CloseReason {
    /// The peer refused the connection
    Refused(io::Error),
    /// Any other transport failure: resolution, reset, EOF
    Io(io::Error),
    /// TLS handshake or certificate failure
    Tls(io::Error),
    /// The request could not be encoded or the response not decoded
    Codec(String),
}

impl CloseReason {
    /// Classify an error from opening the transport
    pub fn from_connect(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => CloseReason::Refused(error),
            _ => CloseReason::Io(error),
        }
    }

    /// Only refusals during connection establishment are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloseReason::Refused(_))
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Refused(e) => write!(f, "connection refused: {}", e),
            CloseReason::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                write!(f, "connection closed by peer")
            }
            CloseReason::Io(e) => write!(f, "{}", e),
            CloseReason::Tls(e) => write!(f, "TLS handshake failed: {}", e),
            CloseReason::Codec(message) => write!(f, "{}", message),
        }
    }
}

/// Bounded, fixed-delay reconnection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether attempt number `attempt` (zero-based) may be followed by another
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Decide the next step after a failed attempt: `Some(delay)` to retry
    pub fn next_delay(&self, attempt: u32, reason: &CloseReason) -> Option<Duration> {
        (reason.is_retryable() && self.should_retry(attempt)).then_some(self.delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, Duration::from_millis(DEFAULT_RETRY_DELAY_MS))
    }
}
