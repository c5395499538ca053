//! The run's absolute deadline. Armed once at startup; on expiry it reports
//! FAILED through the arbiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::info;

use crate::arbiter::{DecisionArbiter, DecisionSource};
use crate::error::ConfigError;
use crate::predicate::Outcome;

/// One-shot wall-clock ceiling on the whole run.
///
/// The deadline is fixed when the timer is armed and is never pushed back by
/// message activity.
pub struct DeadlineTimer {
    duration: Duration,
    deadline: Instant,
    cancelled: AtomicBool,
    cancel: Notify,
}

impl DeadlineTimer {
    /// Arm the timer now. Zero durations are rejected.
    pub fn arm(duration: Duration) -> Result<Self, ConfigError> {
        if duration.is_zero() {
            return Err(ConfigError::Invalid {
                field: "listener_timeout",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(Self {
            duration,
            deadline: Instant::now() + duration,
            cancelled: AtomicBool::new(false),
            cancel: Notify::new(),
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Disarm the timer; a pending [`expire`](Self::expire) returns `false`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.cancel.notify_waiters();
    }

    /// Sleep until the deadline, then report FAILED/TIMEOUT to the arbiter.
    ///
    /// Returns `true` iff the timeout became the decision.
    pub async fn expire(&self, arbiter: &DecisionArbiter) -> bool {
        tokio::select! {
            _ = sleep_until(self.deadline) => {}
            _ = self.cancelled() => return false,
        }
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        info!(
            "listener timed out after {:.2} minutes waiting for target message, marking job as FAILED",
            self.duration.as_secs_f64() / 60.0
        );
        arbiter.report(Outcome::Failed, DecisionSource::Timeout, None)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.cancel.notified();
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}
