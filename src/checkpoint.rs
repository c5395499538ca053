//! Per-partition offset tracking. Positions only move forward.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::stream::MessageSource;

/// Position of a handled message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Highest handled offset per (topic, partition).
///
/// Positions only move forward. Every handled message is checkpointed,
/// whether or not it matched the predicate.
#[derive(Debug, Default)]
pub struct CheckpointTracker {
    positions: HashMap<(String, i32), i64>,
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `checkpoint` and commit it through `source`.
    ///
    /// Returns `false` (and commits nothing) when the offset is not beyond the
    /// recorded position. Commit failures are logged, never returned.
    pub fn advance<S: MessageSource>(&mut self, source: &S, checkpoint: &Checkpoint) -> bool {
        let key = (checkpoint.topic.clone(), checkpoint.partition);
        if let Some(&last) = self.positions.get(&key)
            && checkpoint.offset <= last
        {
            debug!(
                topic = %checkpoint.topic,
                partition = checkpoint.partition,
                offset = checkpoint.offset,
                last,
                "offset already checkpointed"
            );
            return false;
        }
        self.positions.insert(key, checkpoint.offset);

        if let Err(e) = source.commit(checkpoint) {
            warn!(
                topic = %checkpoint.topic,
                partition = checkpoint.partition,
                offset = checkpoint.offset,
                "offset commit failed: {e}"
            );
        }
        true
    }

    #[cfg(test)]
    pub fn position(&self, topic: &str, partition: i32) -> Option<i64> {
        self.positions.get(&(topic.to_string(), partition)).copied()
    }
}
