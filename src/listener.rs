//! Consumes the status stream: evaluate, checkpoint, then report.

use tracing::{debug, info};

use crate::arbiter::{DecisionArbiter, DecisionSource};
use crate::checkpoint::CheckpointTracker;
use crate::error::ListenerError;
use crate::predicate::PredicateEvaluator;
use crate::stream::{MessageSource, StreamMessage};

/// Feeds every delivered message to the evaluator and checkpoints it.
///
/// The listener never stops on its own after a decision; ending the run is
/// the caller's job once the arbiter has a decision.
pub struct StreamListener<'a, S> {
    source: S,
    evaluator: &'a PredicateEvaluator,
    tracker: CheckpointTracker,
    handled: u64,
}

impl<'a, S: MessageSource> StreamListener<'a, S> {
    pub fn new(source: S, evaluator: &'a PredicateEvaluator) -> Self {
        Self {
            source,
            evaluator,
            tracker: CheckpointTracker::new(),
            handled: 0,
        }
    }

    /// Consume until the stream ends or fails.
    ///
    /// Only stream-level failures are returned; bad messages are absorbed.
    pub async fn run(&mut self, arbiter: &DecisionArbiter) -> Result<(), ListenerError> {
        while let Some(message) = self.source.next_message().await? {
            self.handle(message, arbiter);
        }
        info!(handled = self.handled, "message stream ended");
        Ok(())
    }

    /// Evaluate, checkpoint, then report. Returns `true` iff this message
    /// produced the decision.
    pub fn handle(&mut self, message: StreamMessage, arbiter: &DecisionArbiter) -> bool {
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            payload = %message.payload_text(),
            "received message"
        );
        let evaluation = self
            .evaluator
            .evaluate(message.payload.as_deref().unwrap_or_default());

        self.tracker.advance(&self.source, &message.checkpoint());
        self.handled += 1;

        if !evaluation.outcome.is_decisive() {
            return false;
        }
        info!(
            partition = message.partition,
            offset = message.offset,
            "marked current running job status as {}",
            evaluation.outcome
        );
        arbiter.report(
            evaluation.outcome,
            DecisionSource::Message,
            Some(message.payload_text()),
        )
    }

    #[cfg(test)]
    pub fn handled(&self) -> u64 {
        self.handled
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }
}
