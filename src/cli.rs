//! Interface de linha de comando baseada em clap.
//!
//! Cada entrada do `listen` pode vir como flag ou como variável de ambiente
//! `INPUT_<NOME>`, que é como o runner do GitHub Actions repassa os inputs.
//! O runner exporta inputs não preenchidos como string vazia, por isso todo
//! valor chega aqui como texto e só é convertido depois de descartar os vazios.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{ListenerSettings, non_empty, parse_minutes, parse_switch};
use crate::error::ConfigError;

/// Aguarda o evento de status de um job num tópico Kafka e converte-o em código de saída.
#[derive(Debug, Parser)]
#[command(name = "job-status-listener", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Filtro de log (trace, debug, info, warn, error ou diretiva EnvFilter).
    #[arg(long, global = true, env = "LISTENER_LOG", default_value = "info")]
    pub log_level: String,

    /// Habilita saída detalhada (equivale a --log-level debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Waits for the job's status event. Exits 0 on SUCCESS, 1 on FAILED or timeout.
    Listen(ListenArgs),

    /// Evaluates one payload against the predicate without a broker.
    /// Exits 0 on SUCCESS, 1 on FAILED, 2 when the payload decides nothing.
    Check {
        #[command(flatten)]
        predicate: PredicateArgs,

        /// JSON payload to evaluate, or `-` to read it from stdin.
        payload: String,
    },
}

/// Predicate selection shared by `listen` and `check`.
#[derive(Debug, Clone, Default, Args)]
pub struct PredicateArgs {
    /// Job id to match against the event's job id field.
    #[arg(long, env = "INPUT_JOB_ID")]
    pub job_id: Option<String>,

    /// Event field holding the job id.
    #[arg(long, env = "INPUT_JOB_ID_FIELD")]
    pub job_id_field: Option<String>,

    /// Event field holding the status.
    #[arg(long, env = "INPUT_STATUS_FIELD")]
    pub status_field: Option<String>,

    /// Boolean expression marking the event as SUCCESS, e.g. `event.job_status == 'SUCCESS'`.
    #[arg(long, env = "INPUT_SUCCESS_WHEN")]
    pub success_when: Option<String>,

    /// Boolean expression marking the event as FAILED (requires --success-when).
    #[arg(long, env = "INPUT_FAIL_WHEN")]
    pub fail_when: Option<String>,

    /// Template rendering to SUCCESS or FAILED.
    #[arg(long, env = "INPUT_STATUS_TEMPLATE")]
    pub status_template: Option<String>,
}

impl PredicateArgs {
    pub fn settings(&self) -> ListenerSettings {
        ListenerSettings {
            job_id: non_empty(self.job_id.clone()),
            job_id_field: non_empty(self.job_id_field.clone()),
            status_field: non_empty(self.status_field.clone()),
            success_when: non_empty(self.success_when.clone()),
            fail_when: non_empty(self.fail_when.clone()),
            status_template: non_empty(self.status_template.clone()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ListenArgs {
    /// TOML file with listener settings; flags and environment override it.
    #[arg(long, env = "INPUT_CONFIG")]
    pub config: Option<String>,

    /// Broker address (host:port, comma separated for several).
    #[arg(long, env = "INPUT_KAFKA_BROKER")]
    pub kafka_broker: Option<String>,

    /// Topic carrying job status events.
    #[arg(long, env = "INPUT_TOPIC_NAME")]
    pub topic_name: Option<String>,

    #[command(flatten)]
    pub predicate: PredicateArgs,

    /// Overall wait ceiling in minutes (fractions allowed).
    #[arg(long, env = "INPUT_LISTENER_TIMEOUT")]
    pub listener_timeout: Option<String>,

    /// Consumer group id. Defaults to a unique generated id.
    #[arg(long, env = "INPUT_GROUP_ID")]
    pub group_id: Option<String>,

    /// Prefix for a generated consumer group id.
    #[arg(long, env = "INPUT_GROUP_ID_PREFIX")]
    pub group_id_prefix: Option<String>,

    #[arg(long, env = "INPUT_SASL_USERNAME")]
    pub sasl_username: Option<String>,

    #[arg(long, env = "INPUT_SASL_PASSWORD", hide_env_values = true)]
    pub sasl_password: Option<String>,

    /// Connect over TLS (true/false, yes/no, on/off, 1/0).
    #[arg(
        long,
        env = "INPUT_TLS_ENABLED",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub tls_enabled: Option<String>,

    /// CA certificate file.
    #[arg(long, env = "INPUT_TLS_CA")]
    pub tls_ca: Option<String>,

    /// Client certificate file.
    #[arg(long, env = "INPUT_TLS_CERT")]
    pub tls_cert: Option<String>,

    /// Client private key file.
    #[arg(long, env = "INPUT_TLS_KEY")]
    pub tls_key: Option<String>,

    /// File receiving the `message` output. Without it the payload goes to stdout.
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub output_file: Option<String>,
}

impl ListenArgs {
    /// Os valores desta invocação como camada de configuração.
    ///
    /// Valores vazios viram `None`, então não sobrepõem o arquivo de configuração.
    pub fn settings(&self) -> Result<ListenerSettings, ConfigError> {
        Ok(ListenerSettings {
            kafka_broker: non_empty(self.kafka_broker.clone()),
            topic_name: non_empty(self.topic_name.clone()),
            listener_timeout: parse_minutes(self.listener_timeout.clone())?,
            group_id: non_empty(self.group_id.clone()),
            group_id_prefix: non_empty(self.group_id_prefix.clone()),
            sasl_username: non_empty(self.sasl_username.clone()),
            sasl_password: non_empty(self.sasl_password.clone()),
            tls_enabled: parse_switch("tls_enabled", self.tls_enabled.clone())?,
            tls_ca: path(&self.tls_ca),
            tls_cert: path(&self.tls_cert),
            tls_key: path(&self.tls_key),
            ..self.predicate.settings()
        })
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        path(&self.config)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        path(&self.output_file)
    }
}

/// Código de saída quando a linha de comando não pôde ser lida.
///
/// `--help` e `--version` terminam com 0; qualquer erro de uso é uma falha de
/// configuração e termina com 1, não com o 2 padrão do clap.
pub fn parse_failure_code(err: &clap::Error) -> u8 {
    if err.use_stderr() { 1 } else { 0 }
}

fn path(value: &Option<String>) -> Option<PathBuf> {
    non_empty(value.clone()).map(PathBuf::from)
}
