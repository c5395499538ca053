//! Message source abstraction consumed by the listener.
//!
//! [`MessageSource`] is the seam between the decision engine and the broker:
//! production code uses [`KafkaSource`](crate::kafka::KafkaSource), tests use
//! the in-memory source in [`mock`].

use crate::checkpoint::Checkpoint;
use crate::error::ListenerError;

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// `None` for tombstones / empty values.
    pub payload: Option<Vec<u8>>,
}

impl StreamMessage {
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }

    /// Payload as text, lossily decoded, for logging and output surfacing.
    pub fn payload_text(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}

/// A subscribed, ordered-per-partition stream of messages.
pub trait MessageSource {
    /// Wait for the next message. `Ok(None)` means the stream has ended.
    async fn next_message(&mut self) -> Result<Option<StreamMessage>, ListenerError>;

    /// Record that everything up to and including `checkpoint` was handled.
    fn commit(&self, checkpoint: &Checkpoint) -> Result<(), ListenerError>;
}

#[cfg(test)]
pub mod mock {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;

    /// What the mock does once its queue is drained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum WhenDrained {
        Close,
        Hang,
        Fail,
    }

    /// In-memory source delivering scripted messages, optionally spaced out in time.
    pub struct MockSource {
        queue: VecDeque<(Duration, StreamMessage)>,
        when_drained: WhenDrained,
        fail_commits: bool,
        pub committed: RefCell<Vec<Checkpoint>>,
    }

    impl MockSource {
        pub fn new(when_drained: WhenDrained) -> Self {
            Self {
                queue: VecDeque::new(),
                when_drained,
                fail_commits: false,
                committed: RefCell::new(Vec::new()),
            }
        }

        pub fn failing_commits(mut self) -> Self {
            self.fail_commits = true;
            self
        }

        /// Queue a message on partition 0 of topic `jobs`, delivered immediately.
        pub fn push(self, offset: i64, payload: &[u8]) -> Self {
            self.push_at(Duration::ZERO, 0, offset, payload)
        }

        /// Queue a message delivered `delay` after the previous one.
        pub fn push_at(mut self, delay: Duration, partition: i32, offset: i64, payload: &[u8]) -> Self {
            self.queue.push_back((
                delay,
                StreamMessage {
                    topic: "jobs".into(),
                    partition,
                    offset,
                    payload: Some(payload.to_vec()),
                },
            ));
            self
        }

        pub fn committed_offsets(&self) -> Vec<(i32, i64)> {
            self.committed
                .borrow()
                .iter()
                .map(|c| (c.partition, c.offset))
                .collect()
        }
    }

    impl MessageSource for MockSource {
        async fn next_message(&mut self) -> Result<Option<StreamMessage>, ListenerError> {
            match self.queue.pop_front() {
                Some((delay, message)) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(Some(message))
                }
                None => match self.when_drained {
                    WhenDrained::Close => Ok(None),
                    WhenDrained::Hang => std::future::pending().await,
                    WhenDrained::Fail => Err(ListenerError::Stream("broker went away".into())),
                },
            }
        }

        fn commit(&self, checkpoint: &Checkpoint) -> Result<(), ListenerError> {
            if self.fail_commits {
                return Err(ListenerError::Stream("commit rejected".into()));
            }
            self.committed.borrow_mut().push(checkpoint.clone());
            Ok(())
        }
    }
}
