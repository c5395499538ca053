//! First-writer-wins arbitration between the message path and the deadline.
//!
//! [`DecisionArbiter`] accepts decisive outcomes from any source. The first
//! report is recorded as the run's [`Decision`] and wakes whoever is waiting
//! in [`DecisionArbiter::decided`]; every later report is ignored.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::predicate::Outcome;

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionSource {
    Message,
    Timeout,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSource::Message => write!(f, "MESSAGE"),
            DecisionSource::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// The single, write-once result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub source: DecisionSource,
    /// Raw text of the deciding message; `None` for timeouts.
    pub payload: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Process exit code: 0 for SUCCESS, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            Outcome::Success => 0,
            _ => 1,
        }
    }
}

#[derive(Default)]
pub struct DecisionArbiter {
    decided: AtomicBool,
    decision: OnceLock<Decision>,
    notify: Notify,
}

impl DecisionArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an outcome. Returns `true` iff this call recorded the decision.
    ///
    /// Indeterminate outcomes are never recorded.
    pub fn report(&self, outcome: Outcome, source: DecisionSource, payload: Option<String>) -> bool {
        if !outcome.is_decisive() {
            return false;
        }
        if self
            .decided
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%outcome, %source, "decision already made, ignoring report");
            return false;
        }

        let decision = Decision {
            outcome,
            source,
            payload,
            decided_at: Utc::now(),
        };
        // Only the CAS winner reaches this point.
        let _ = self.decision.set(decision);
        info!(%outcome, %source, "decision recorded");
        self.notify.notify_waiters();
        true
    }

    pub fn is_decided(&self) -> bool {
        self.decided.load(Ordering::Acquire)
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.get()
    }

    /// Wait until a decision has been recorded.
    pub async fn decided(&self) -> &Decision {
        loop {
            let notified = self.notify.notified();
            if let Some(decision) = self.decision.get() {
                return decision;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_report_wins() {
        let arbiter = DecisionArbiter::new();
        assert!(!arbiter.is_decided());

        assert!(arbiter.report(
            Outcome::Success,
            DecisionSource::Message,
            Some("{}".into())
        ));
        assert!(!arbiter.report(Outcome::Failed, DecisionSource::Message, None));
        assert!(!arbiter.report(Outcome::Failed, DecisionSource::Timeout, None));

        let decision = arbiter.decision().unwrap();
        assert_eq!(decision.outcome, Outcome::Success);
        assert_eq!(decision.source, DecisionSource::Message);
        assert_eq!(decision.payload.as_deref(), Some("{}"));
        assert_eq!(decision.exit_code(), 0);
    }

    #[test]
    fn indeterminate_is_never_recorded() {
        let arbiter = DecisionArbiter::new();
        assert!(!arbiter.report(Outcome::Indeterminate, DecisionSource::Message, None));
        assert!(!arbiter.is_decided());
        assert!(arbiter.decision().is_none());

        assert!(arbiter.report(Outcome::Failed, DecisionSource::Timeout, None));
        assert_eq!(arbiter.decision().unwrap().exit_code(), 1);
    }

    #[test]
    fn duplicate_delivery_keeps_recorded_outcome() {
        let arbiter = DecisionArbiter::new();
        assert!(arbiter.report(Outcome::Failed, DecisionSource::Message, Some("a".into())));
        for _ in 0..5 {
            arbiter.report(Outcome::Success, DecisionSource::Message, Some("b".into()));
        }
        let decision = arbiter.decision().unwrap();
        assert_eq!(decision.outcome, Outcome::Failed);
        assert_eq!(decision.payload.as_deref(), Some("a"));
    }

    #[test]
    fn concurrent_reports_produce_exactly_one_winner() {
        let arbiter = DecisionArbiter::new();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let arbiter = &arbiter;
                    scope.spawn(move || {
                        let (outcome, source) = if i % 2 == 0 {
                            (Outcome::Success, DecisionSource::Message)
                        } else {
                            (Outcome::Failed, DecisionSource::Timeout)
                        };
                        usize::from(arbiter.report(outcome, source, None))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
        assert!(arbiter.decision().is_some());
    }

    #[tokio::test]
    async fn decided_wakes_after_report() {
        let arbiter = DecisionArbiter::new();
        let wait = async {
            let decision = arbiter.decided().await;
            decision.source
        };
        let report = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            arbiter.report(Outcome::Failed, DecisionSource::Timeout, None)
        };
        let (source, won) = tokio::join!(wait, report);
        assert!(won);
        assert_eq!(source, DecisionSource::Timeout);
    }

    #[tokio::test]
    async fn decided_returns_immediately_when_already_decided() {
        let arbiter = DecisionArbiter::new();
        arbiter.report(Outcome::Success, DecisionSource::Message, None);
        assert_eq!(arbiter.decided().await.outcome, Outcome::Success);
    }

    #[test]
    fn decision_serializes_with_upper_case_tags() {
        let arbiter = DecisionArbiter::new();
        arbiter.report(Outcome::Failed, DecisionSource::Timeout, None);
        let json = serde_json::to_value(arbiter.decision().unwrap()).unwrap();
        assert_eq!(json["outcome"], "FAILED");
        assert_eq!(json["source"], "TIMEOUT");
        assert!(json["payload"].is_null());
    }
}
