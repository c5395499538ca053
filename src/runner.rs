//! Races the stream listener against the deadline until one of them decides.

use tracing::{info, warn};

use crate::arbiter::{Decision, DecisionArbiter};
use crate::deadline::DeadlineTimer;
use crate::error::ListenerError;
use crate::listener::StreamListener;
use crate::predicate::PredicateEvaluator;
use crate::stream::MessageSource;

/// Race the listener against the deadline until the arbiter has a decision.
///
/// The deadline must already be armed; it is measured from when it was armed,
/// not from when this function is called. Returns an error only when the
/// stream fails before any decision was made.
pub async fn run<S: MessageSource>(
    source: S,
    evaluator: &PredicateEvaluator,
    deadline: &DeadlineTimer,
) -> Result<Decision, ListenerError> {
    let arbiter = DecisionArbiter::new();
    let mut listener = StreamListener::new(source, evaluator);

    let listen = listener.run(&arbiter);
    let expire = deadline.expire(&arbiter);
    tokio::pin!(listen, expire);

    let mut stream_open = true;
    let mut timer_armed = true;

    let decision = loop {
        tokio::select! {
            biased;

            decision = arbiter.decided() => break decision.clone(),

            result = &mut listen, if stream_open => {
                stream_open = false;
                if let Err(e) = result {
                    // A decision recorded before the failure still stands.
                    if let Some(decision) = arbiter.decision() {
                        warn!("stream failed after decision: {e}");
                        break decision.clone();
                    }
                    return Err(e);
                }
                if !arbiter.is_decided() {
                    info!(
                        "stream closed without a decision, waiting {:.1}s for the deadline",
                        deadline.remaining().as_secs_f64()
                    );
                }
            }

            _ = &mut expire, if timer_armed => {
                timer_armed = false;
            }
        }
    };

    deadline.cancel();
    Ok(decision)
}
