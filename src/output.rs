//! Publicação do valor de saída `message` para o passo seguinte do pipeline.
//!
//! Com um arquivo configurado (normalmente `$GITHUB_OUTPUT`) o valor é anexado
//! no formato multilinha `nome<<delimitador`; sem arquivo, vai para stdout.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use crate::arbiter::{Decision, DecisionSource};

/// Nome da saída que carrega o payload bruto da mensagem decisiva.
pub const MESSAGE_OUTPUT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    File(PathBuf),
    Stdout,
}

impl OutputSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if !path.as_os_str().is_empty() => OutputSink::File(path),
            _ => OutputSink::Stdout,
        }
    }

    pub fn publish(&self, name: &str, value: &str) -> io::Result<()> {
        match self {
            OutputSink::File(path) => {
                let delimiter = format!("ghadelimiter_{}", Uuid::new_v4());
                let entry = format_entry(name, value, &delimiter)?;
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                file.write_all(entry.as_bytes())?;
                debug!(output = name, path = %path.display(), "published output");
                Ok(())
            }
            OutputSink::Stdout => {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{value}")?;
                stdout.flush()
            }
        }
    }
}

/// Publica o payload bruto da mensagem decisiva. Decisões por timeout não
/// publicam nada. Retorna `true` se algo foi escrito.
pub fn publish_decision(sink: &OutputSink, decision: &Decision) -> io::Result<bool> {
    match (&decision.source, &decision.payload) {
        (DecisionSource::Message, Some(payload)) => {
            sink.publish(MESSAGE_OUTPUT, payload)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn format_entry(name: &str, value: &str, delimiter: &str) -> io::Result<String> {
    if name.contains(delimiter) || value.contains(delimiter) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "output value contains the delimiter",
        ));
    }
    Ok(format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Outcome;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn decision(outcome: Outcome, source: DecisionSource, payload: Option<&str>) -> Decision {
        Decision {
            outcome,
            source,
            payload: payload.map(str::to_string),
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn entry_uses_heredoc_form() {
        let entry = format_entry("message", "{\"a\":1}\nsecond", "EOF_1").unwrap();
        assert_eq!(entry, "message<<EOF_1\n{\"a\":1}\nsecond\nEOF_1\n");
    }

    #[test]
    fn entry_rejects_embedded_delimiter() {
        assert!(format_entry("message", "x EOF_1 y", "EOF_1").is_err());
    }

    #[test]
    fn file_sink_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("github_output");
        fs::write(&path, "previous=1\n").unwrap();

        let sink = OutputSink::new(Some(path.clone()));
        sink.publish(MESSAGE_OUTPUT, r#"{"job_status":"SUCCESS"}"#).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "previous=1");
        assert!(lines[1].starts_with("message<<ghadelimiter_"));
        assert_eq!(lines[2], r#"{"job_status":"SUCCESS"}"#);
        assert_eq!(lines[3], &lines[1]["message<<".len()..]);
    }

    #[test]
    fn empty_path_means_stdout() {
        assert_eq!(OutputSink::new(None), OutputSink::Stdout);
        assert_eq!(OutputSink::new(Some(PathBuf::new())), OutputSink::Stdout);
    }

    #[test]
    fn timeout_decision_publishes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("github_output");
        let sink = OutputSink::new(Some(path.clone()));

        let timeout = decision(Outcome::Failed, DecisionSource::Timeout, None);
        assert!(!publish_decision(&sink, &timeout).unwrap());
        assert!(!path.exists());
        assert_eq!(timeout.exit_code(), 1);
    }

    #[test]
    fn message_decision_publishes_raw_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("github_output");
        let sink = OutputSink::new(Some(path.clone()));
        // Espaços e ordem das chaves chegam intactos ao passo seguinte.
        let raw = r#"{ "job_status":"SUCCESS",  "job_id":"abc" }"#;

        let success = decision(Outcome::Success, DecisionSource::Message, Some(raw));
        assert!(publish_decision(&sink, &success).unwrap());
        assert_eq!(success.exit_code(), 0);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], raw);
    }

    #[test]
    fn failed_message_still_publishes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("github_output");
        let sink = OutputSink::new(Some(path.clone()));
        let raw = r#"{"job_id":"abc","job_status":"FAILED"}"#;

        let failed = decision(Outcome::Failed, DecisionSource::Message, Some(raw));
        assert!(publish_decision(&sink, &failed).unwrap());
        assert_eq!(failed.exit_code(), 1);
        assert!(fs::read_to_string(&path).unwrap().contains(raw));
    }
}
