//! Kafka binding for [`MessageSource`] built on `rdkafka`'s `StreamConsumer`.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{info, warn};

use crate::checkpoint::Checkpoint;
use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::stream::{MessageSource, StreamMessage};

/// Upper bound on the startup reachability probe.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
}

/// librdkafka properties for a listener run.
///
/// Starts from the latest offset and never auto-commits; offsets are
/// committed explicitly by the checkpoint tracker.
pub fn client_config(config: &ListenerConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.broker)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "latest")
        .set("enable.partition.eof", "false");

    let protocol = match (&config.sasl, &config.tls) {
        (Some(_), Some(_)) => "SASL_SSL",
        (Some(_), None) => "SASL_PLAINTEXT",
        (None, Some(_)) => "SSL",
        (None, None) => "PLAINTEXT",
    };
    client.set("security.protocol", protocol);

    if let Some(sasl) = &config.sasl {
        client
            .set("sasl.mechanism", "PLAIN")
            .set("sasl.username", &sasl.username)
            .set("sasl.password", &sasl.password);
    }

    if let Some(tls) = &config.tls {
        let files = [
            ("ssl.ca.location", &tls.ca),
            ("ssl.certificate.location", &tls.cert),
            ("ssl.key.location", &tls.key),
        ];
        for (key, path) in files {
            if let Some(path) = path {
                client.set(key, path.to_string_lossy());
            }
        }
    }

    client
}

impl KafkaSource {
    /// Create the consumer, probe the broker and subscribe. Any failure here
    /// is fatal; there is no retry.
    pub fn connect(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let connection_error = |source: KafkaError| ListenerError::Connection {
            broker: config.broker.clone(),
            source,
        };

        let consumer: StreamConsumer = client_config(config).create().map_err(connection_error)?;

        // fetch_metadata blocks on the network.
        let metadata = tokio::task::block_in_place(|| {
            consumer.fetch_metadata(Some(config.topic.as_str()), METADATA_TIMEOUT)
        })
        .map_err(connection_error)?;

        let topic = metadata
            .topics()
            .iter()
            .find(|t| t.name() == config.topic)
            .ok_or_else(|| ListenerError::Subscribe {
                topic: config.topic.clone(),
                reason: "topic not present in broker metadata".into(),
            })?;
        if let Some(err) = topic.error() {
            return Err(ListenerError::Subscribe {
                topic: config.topic.clone(),
                reason: format!("{err:?}"),
            });
        }

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| ListenerError::Subscribe {
                topic: config.topic.clone(),
                reason: e.to_string(),
            })?;

        info!(
            broker = %config.broker,
            topic = %config.topic,
            group_id = %config.group_id,
            partitions = topic.partitions().len(),
            "subscribed"
        );
        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

impl MessageSource for KafkaSource {
    async fn next_message(&mut self) -> Result<Option<StreamMessage>, ListenerError> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    return Ok(Some(StreamMessage {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        payload: message.payload().map(<[u8]>::to_vec),
                    }));
                }
                Err(KafkaError::MessageConsumption(code)) => {
                    warn!(topic = %self.topic, "message consumption error, skipping: {code}");
                }
                Err(KafkaError::PartitionEOF(partition)) => {
                    warn!(topic = %self.topic, partition, "reached end of partition");
                }
                Err(e) => return Err(ListenerError::Stream(e.to_string())),
            }
        }
    }

    fn commit(&self, checkpoint: &Checkpoint) -> Result<(), ListenerError> {
        let mut offsets = TopicPartitionList::new();
        // Kafka commits the next offset to read.
        offsets
            .add_partition_offset(
                &checkpoint.topic,
                checkpoint.partition,
                Offset::Offset(checkpoint.offset + 1),
            )
            .map_err(|e| ListenerError::Stream(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| ListenerError::Stream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SaslCredentials, TlsSettings};
    use crate::predicate::PredicateStrategy;
    use std::path::PathBuf;

    fn config() -> ListenerConfig {
        ListenerConfig {
            broker: "localhost:9092".into(),
            topic: "jobs".into(),
            strategy: PredicateStrategy::TemplateConditional {
                template: "{{ event.status }}".into(),
            },
            timeout: Duration::from_secs(60),
            group_id: "group-1".into(),
            sasl: None,
            tls: None,
        }
    }

    #[test]
    fn plaintext_defaults() {
        let client = client_config(&config());
        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client.get("group.id"), Some("group-1"));
        assert_eq!(client.get("enable.auto.commit"), Some("false"));
        assert_eq!(client.get("auto.offset.reset"), Some("latest"));
        assert_eq!(client.get("security.protocol"), Some("PLAINTEXT"));
        assert_eq!(client.get("sasl.mechanism"), None);
    }

    #[test]
    fn sasl_over_plaintext() {
        let mut config = config();
        config.sasl = Some(SaslCredentials {
            username: "user".into(),
            password: "secret".into(),
        });
        let client = client_config(&config);
        assert_eq!(client.get("security.protocol"), Some("SASL_PLAINTEXT"));
        assert_eq!(client.get("sasl.mechanism"), Some("PLAIN"));
        assert_eq!(client.get("sasl.username"), Some("user"));
        assert_eq!(client.get("sasl.password"), Some("secret"));
    }

    #[test]
    fn tls_with_and_without_sasl() {
        let mut config = config();
        config.tls = Some(TlsSettings {
            ca: Some(PathBuf::from("/certs/ca.pem")),
            cert: None,
            key: Some(PathBuf::from("/certs/client.key")),
        });
        let client = client_config(&config);
        assert_eq!(client.get("security.protocol"), Some("SSL"));
        assert_eq!(client.get("ssl.ca.location"), Some("/certs/ca.pem"));
        assert_eq!(client.get("ssl.certificate.location"), None);
        assert_eq!(client.get("ssl.key.location"), Some("/certs/client.key"));

        config.sasl = Some(SaslCredentials {
            username: "u".into(),
            password: "p".into(),
        });
        assert_eq!(
            client_config(&config).get("security.protocol"),
            Some("SASL_SSL")
        );
    }
}
