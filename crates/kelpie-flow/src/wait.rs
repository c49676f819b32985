//! Polling helpers.
//!
//! There is no push channel from executors or detection agents back to
//! a flow; all waiting is a sleep-then-probe loop against the store.
//! Interval and deadline are explicit so no loop can wait unbounded by
//! accident.

use std::time::Duration;
use tokio::time::Instant;

/// Parameters of one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    /// Sleep between probes.
    pub interval: Duration,
    /// Give up after this long; `None` polls indefinitely.
    pub deadline: Option<Duration>,
}

impl WaitOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            deadline: None,
        }
    }
}

/// Running deadline for one loop instance.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn expired(&self) -> bool {
        self.limit
            .map(|limit| self.started.elapsed() >= limit)
            .unwrap_or(false)
    }

    /// The configured limit, for error reporting.
    pub fn limit(&self) -> Duration {
        self.limit.unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_without_limit_never_expires() {
        let deadline = Deadline::new(None);
        assert!(!deadline.expired());
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let deadline = Deadline::new(Some(Duration::from_millis(5)));
        assert!(!deadline.expired());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(deadline.expired());
    }

    #[test]
    fn test_wait_options_builder() {
        let opts = WaitOptions::new(Duration::from_millis(10))
            .with_deadline(Duration::from_secs(1));
        assert_eq!(opts.interval, Duration::from_millis(10));
        assert_eq!(opts.deadline, Some(Duration::from_secs(1)));
    }
}
