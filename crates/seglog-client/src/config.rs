//! Stream configuration.

use std::time::Duration;

/// Reconnect policy for a stream.
///
/// Each attempt is one establish-plus-handshake; after a transport failure
/// the stream sleeps, multiplies the delay, and tries again. The defaults
/// give delays of 1, 10, 100, 1000 and 10000 ms before giving up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Sleep after the first failed attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt.
    pub backoff_multiplier: u32,
    /// Total connect attempts before the operation fails `Unavailable`.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 10,
            max_attempts: 5,
        }
    }
}

/// Configuration for [`SegmentOutputStream`](crate::SegmentOutputStream).
#[derive(Debug, Clone, Default)]
pub struct OutputStreamConfig {
    pub retry: RetryPolicy,
}

/// Configuration for [`SegmentInputStream`](crate::SegmentInputStream).
#[derive(Debug, Clone)]
pub struct InputStreamConfig {
    /// Bytes requested from the server per read.
    pub read_length: u32,
    pub retry: RetryPolicy,
}

impl Default for InputStreamConfig {
    fn default() -> Self {
        Self {
            read_length: 64 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_schedule() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.initial_delay, Duration::from_millis(1));
        assert_eq!(retry.backoff_multiplier, 10);
        assert_eq!(retry.max_attempts, 5);
    }

    #[test]
    fn default_read_length_is_64k() {
        assert_eq!(InputStreamConfig::default().read_length, 64 * 1024);
    }
}
