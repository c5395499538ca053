//! Error types: startup configuration, fatal run errors and per-message
//! evaluation failures.

use std::path::PathBuf;

use thiserror::Error;

/// Startup validation failures. Always fatal, raised before subscribing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is a mandatory input and cannot be empty")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("no status predicate configured: set job_id, success_when or status_template")]
    NoStrategy,

    #[error("conflicting status predicates configured: {0}")]
    ConflictingStrategies(String),

    #[error("{field} file does not exist: {}", path.display())]
    FileNotFound { field: &'static str, path: PathBuf },

    #[error("invalid template in {field}: {source}")]
    Template {
        field: &'static str,
        #[source]
        source: minijinja::Error,
    },

    #[error("IO error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Fatal errors of a listener run.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to connect to broker {broker}: {source}")]
    Connection {
        broker: String,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    #[error("failed to subscribe to topic {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("stream error: {0}")]
    Stream(String),
}

/// Reasons a single message could not be classified. Never escalated; the
/// message is treated as indeterminate.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template evaluation failed: {0}")]
    Template(#[from] minijinja::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_display() {
        let err = ConfigError::Missing("kafka_broker");
        assert_eq!(
            err.to_string(),
            "kafka_broker is a mandatory input and cannot be empty"
        );
    }

    #[test]
    fn file_not_found_display() {
        let err = ConfigError::FileNotFound {
            field: "tls_ca",
            path: PathBuf::from("/nope/ca.pem"),
        };
        assert_eq!(err.to_string(), "tls_ca file does not exist: /nope/ca.pem");
    }

    #[test]
    fn subscribe_display_names_topic() {
        let err = ListenerError::Subscribe {
            topic: "jobs".into(),
            reason: "topic not found in cluster metadata".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to subscribe to topic jobs: topic not found in cluster metadata"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
        assert_send_sync::<ListenerError>();
        assert_send_sync::<EvaluationError>();
    }
}
