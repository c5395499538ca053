//! Configuração do listener, montada uma única vez na inicialização.
//!
//! [`ListenerSettings`] é a camada bruta (arquivo TOML opcional, depois flags
//! e variáveis `INPUT_*` por cima). [`ListenerConfig`] é o valor imutável e
//! validado que os componentes recebem por referência.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::predicate::PredicateStrategy;

/// Prefixo do consumer group quando nenhum id ou prefixo é informado.
pub const DEFAULT_GROUP_PREFIX: &str = "job-status-listener";

/// Campos brutos, todos opcionais, na forma em que chegam do arquivo ou da CLI.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListenerSettings {
    pub kafka_broker: Option<String>,
    pub topic_name: Option<String>,
    pub job_id: Option<String>,
    pub job_id_field: Option<String>,
    pub status_field: Option<String>,
    pub success_when: Option<String>,
    pub fail_when: Option<String>,
    pub status_template: Option<String>,
    /// Minutos; frações são aceitas.
    pub listener_timeout: Option<f64>,
    pub group_id: Option<String>,
    pub group_id_prefix: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub tls_enabled: Option<bool>,
    pub tls_ca: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl ListenerSettings {
    /// Carrega o arquivo TOML indicado; sem caminho, retorna tudo vazio.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                field: "config",
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<ListenerSettings>(&contents)?)
    }

    /// Sobrepõe `overrides` campo a campo; valores presentes em `overrides` vencem.
    pub fn merge(self, overrides: ListenerSettings) -> Self {
        Self {
            kafka_broker: overrides.kafka_broker.or(self.kafka_broker),
            topic_name: overrides.topic_name.or(self.topic_name),
            job_id: overrides.job_id.or(self.job_id),
            job_id_field: overrides.job_id_field.or(self.job_id_field),
            status_field: overrides.status_field.or(self.status_field),
            success_when: overrides.success_when.or(self.success_when),
            fail_when: overrides.fail_when.or(self.fail_when),
            status_template: overrides.status_template.or(self.status_template),
            listener_timeout: overrides.listener_timeout.or(self.listener_timeout),
            group_id: overrides.group_id.or(self.group_id),
            group_id_prefix: overrides.group_id_prefix.or(self.group_id_prefix),
            sasl_username: overrides.sasl_username.or(self.sasl_username),
            sasl_password: overrides.sasl_password.or(self.sasl_password),
            tls_enabled: overrides.tls_enabled.or(self.tls_enabled),
            tls_ca: overrides.tls_ca.or(self.tls_ca),
            tls_cert: overrides.tls_cert.or(self.tls_cert),
            tls_key: overrides.tls_key.or(self.tls_key),
        }
    }

    /// Resolve a única estratégia de predicado descrita por estes campos.
    pub fn predicate_strategy(&self) -> Result<PredicateStrategy, ConfigError> {
        select_strategy(
            non_empty(self.job_id.clone()),
            non_blank(self.job_id_field.clone()),
            non_blank(self.status_field.clone()),
            non_blank(self.success_when.clone()),
            non_blank(self.fail_when.clone()),
            non_blank(self.status_template.clone()),
        )
    }
}

/// Credenciais SASL/PLAIN.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
}

// A senha nunca aparece em logs.
impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Arquivos de TLS; cada caminho informado já foi verificado.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

/// Configuração validada e imutável de uma execução.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub broker: String,
    pub topic: String,
    pub strategy: PredicateStrategy,
    pub timeout: Duration,
    pub group_id: String,
    pub sasl: Option<SaslCredentials>,
    pub tls: Option<TlsSettings>,
}

impl ListenerConfig {
    /// Valida as configurações brutas.
    pub fn from_settings(settings: ListenerSettings) -> Result<Self, ConfigError> {
        let broker = required("kafka_broker", settings.kafka_broker.clone())?;
        let topic = required("topic_name", settings.topic_name.clone())?;
        let strategy = settings.predicate_strategy()?;

        let timeout = timeout_from_minutes(settings.listener_timeout)?;

        let group_id = match (
            non_blank(settings.group_id),
            non_blank(settings.group_id_prefix),
        ) {
            (Some(id), _) => id,
            (None, Some(prefix)) => format!("{prefix}-{}", Uuid::new_v4()),
            (None, None) => format!("{DEFAULT_GROUP_PREFIX}-{}", Uuid::new_v4()),
        };

        // Credenciais seguem para o librdkafka exatamente como informadas.
        let sasl = match (
            non_empty(settings.sasl_username),
            non_empty(settings.sasl_password),
        ) {
            (Some(username), Some(password)) => Some(SaslCredentials { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("sasl_password")),
            (None, Some(_)) => return Err(ConfigError::Missing("sasl_username")),
        };

        let tls_files = TlsSettings {
            ca: existing_file("tls_ca", settings.tls_ca)?,
            cert: existing_file("tls_cert", settings.tls_cert)?,
            key: existing_file("tls_key", settings.tls_key)?,
        };
        let tls = settings.tls_enabled.unwrap_or(false).then_some(tls_files);

        Ok(Self {
            broker,
            topic,
            strategy,
            timeout,
            group_id,
            sasl,
            tls,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Descarta valores vazios ou só com espaços, sem alterar os demais.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Converte o texto de `listener_timeout`; vazio conta como ausente.
pub fn parse_minutes(value: Option<String>) -> Result<Option<f64>, ConfigError> {
    let Some(raw) = non_blank(value) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            field: "listener_timeout",
            reason: format!("{raw:?} is not a number of minutes ({e})"),
        })
}

/// Converte um booleano textual (true/false, yes/no, on/off, 1/0); vazio conta como ausente.
pub fn parse_switch(field: &'static str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = non_blank(value) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Ok(Some(true)),
        "false" | "no" | "n" | "off" | "0" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid {
            field,
            reason: format!("{raw:?} is not a boolean"),
        }),
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    non_blank(value).ok_or(ConfigError::Missing(field))
}

fn select_strategy(
    job_id: Option<String>,
    job_id_field: Option<String>,
    status_field: Option<String>,
    success_when: Option<String>,
    fail_when: Option<String>,
    status_template: Option<String>,
) -> Result<PredicateStrategy, ConfigError> {
    if fail_when.is_some() && success_when.is_none() {
        return Err(ConfigError::Invalid {
            field: "fail_when",
            reason: "requires success_when".into(),
        });
    }

    let configured: Vec<&str> = [
        job_id.as_ref().map(|_| "job_id"),
        success_when.as_ref().map(|_| "success_when"),
        status_template.as_ref().map(|_| "status_template"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if configured.len() > 1 {
        return Err(ConfigError::ConflictingStrategies(configured.join(", ")));
    }

    if let Some(id_value) = job_id {
        Ok(PredicateStrategy::IdentityMatch {
            job_id_field: job_id_field.unwrap_or_else(|| "job_id".to_string()),
            status_field: status_field.unwrap_or_else(|| "job_status".to_string()),
            id_value,
        })
    } else if let Some(success_expr) = success_when {
        Ok(PredicateStrategy::ExpressionPair {
            success_expr,
            fail_expr: fail_when,
        })
    } else if let Some(template) = status_template {
        Ok(PredicateStrategy::TemplateConditional { template })
    } else {
        Err(ConfigError::NoStrategy)
    }
}

fn timeout_from_minutes(minutes: Option<f64>) -> Result<Duration, ConfigError> {
    let minutes = minutes.ok_or(ConfigError::Missing("listener_timeout"))?;
    let invalid = |reason: &str| ConfigError::Invalid {
        field: "listener_timeout",
        reason: reason.to_string(),
    };
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(invalid("must be a positive number of minutes"));
    }
    let timeout =
        Duration::try_from_secs_f64(minutes * 60.0).map_err(|_| invalid("out of range"))?;
    if timeout.is_zero() {
        return Err(invalid("must be a positive number of minutes"));
    }
    Ok(timeout)
}

fn existing_file(field: &'static str, path: Option<PathBuf>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) if path.as_os_str().is_empty() => Ok(None),
        Some(path) if !path.exists() => Err(ConfigError::FileNotFound { field, path }),
        other => Ok(other),
    }
}
