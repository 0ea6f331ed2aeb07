// Bounded, cancellable polling for long-running remote operations.
//
// Import into a store finishes asynchronously on the service side. The
// client checks the operation repeatedly, waiting between attempts with an
// exponentially growing delay, and gives up when the overall deadline
// passes or the cancel token is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{RagError, Result};

/// Delay schedule and deadline for [`poll_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second check.
    pub initial_interval: Duration,
    /// Upper bound on any single delay.
    pub max_interval: Duration,
    /// Growth factor applied after every attempt (1 keeps a fixed interval).
    pub multiplier: u32,
    /// Overall deadline. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(16),
            multiplier: 2,
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl PollPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay to wait after the given attempt (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt.min(30));
        self.initial_interval
            .saturating_mul(factor)
            .min(self.max_interval.max(self.initial_interval))
    }
}

/// Shared flag that aborts an in-progress poll at the next check.
///
/// Nothing in the binary sets it; library callers hand a clone to another
/// thread (or a signal handler) to stop a long import wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for the next wait.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Call `check` until it yields `Some`, sleeping between attempts per
/// `policy`. `name` identifies the operation in errors and logs.
///
/// Errors from `check` end the wait immediately.
pub fn poll_until<T, F>(
    name: &str,
    policy: &PollPolicy,
    cancel: &CancelToken,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Result<Option<T>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RagError::PollCancelled {
                name: name.to_string(),
            });
        }
        if let Some(value) = check()? {
            debug!(operation = name, attempts = attempt + 1, "operation finished");
            return Ok(value);
        }

        let mut delay = policy.delay_for(attempt);
        if let Some(timeout) = policy.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(RagError::PollTimeout {
                    name: name.to_string(),
                    elapsed,
                });
            }
            // last sleep ends at the deadline so one more check lands on it
            delay = delay.min(timeout - elapsed);
        }
        debug!(operation = name, attempt, ?delay, "operation pending");
        thread::sleep(delay);
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_policy() -> PollPolicy {
        PollPolicy::new()
            .with_initial_interval(Duration::ZERO)
            .with_max_interval(Duration::ZERO)
            .with_timeout(None)
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = PollPolicy::new()
            .with_initial_interval(Duration::from_secs(2))
            .with_max_interval(Duration::from_secs(10))
            .with_multiplier(2);
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn multiplier_one_is_fixed_interval() {
        let policy = PollPolicy::new()
            .with_initial_interval(Duration::from_secs(2))
            .with_multiplier(1);
        assert_eq!(policy.delay_for(0), policy.delay_for(7));
    }

    #[test]
    fn returns_once_check_reports_done() {
        let mut calls = 0;
        let value = poll_until("op", &instant_policy(), &CancelToken::new(), || {
            calls += 1;
            Ok(if calls == 3 { Some(calls) } else { None })
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn times_out_when_deadline_passes() {
        let policy = instant_policy().with_timeout(Some(Duration::ZERO));
        let err = poll_until::<(), _>("op/1", &policy, &CancelToken::new(), || Ok(None))
            .unwrap_err();
        assert!(matches!(err, RagError::PollTimeout { ref name, .. } if name == "op/1"));
    }

    #[test]
    fn checks_once_more_at_the_deadline() {
        let policy = PollPolicy::new()
            .with_initial_interval(Duration::from_millis(50))
            .with_multiplier(2)
            .with_max_interval(Duration::from_millis(400))
            .with_timeout(Some(Duration::from_millis(250)));
        // checks at ~0, 50, 150 and then 250 (the 200ms delay is cut to 100ms)
        let started = Instant::now();
        let value = poll_until("op", &policy, &CancelToken::new(), || {
            Ok((started.elapsed() >= Duration::from_millis(200)).then_some(()))
        });
        assert!(value.is_ok(), "{value:?}");
    }

    #[test]
    fn timeout_reports_at_least_the_deadline() {
        let policy = PollPolicy::new()
            .with_initial_interval(Duration::from_millis(10))
            .with_max_interval(Duration::from_millis(40))
            .with_timeout(Some(Duration::from_millis(60)));
        let err = poll_until::<(), _>("op", &policy, &CancelToken::new(), || Ok(None)).unwrap_err();
        match err {
            RagError::PollTimeout { elapsed, .. } => {
                assert!(elapsed >= Duration::from_millis(60), "{elapsed:?}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancel_stops_the_wait() {
        let cancel = CancelToken::new();
        let mut calls = 0;
        let err = poll_until::<(), _>("op/2", &instant_policy(), &cancel, || {
            calls += 1;
            if calls == 2 {
                cancel.cancel();
            }
            Ok(None)
        })
        .unwrap_err();
        assert!(matches!(err, RagError::PollCancelled { .. }));
        assert_eq!(calls, 2);
    }

    #[test]
    fn check_errors_propagate() {
        let err = poll_until::<(), _>("op", &instant_policy(), &CancelToken::new(), || {
            Err(RagError::UnexpectedResponse("boom".into()))
        })
        .unwrap_err();
        assert!(matches!(err, RagError::UnexpectedResponse(_)));
    }
}
