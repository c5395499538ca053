//! Interface de terminal do listener: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner de espera e `console` para as cores. Fora de
//! um terminal (CI) o spinner fica oculto e só o resumo final é impresso.

use console::Style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::arbiter::{Decision, DecisionSource};
use crate::config::ListenerConfig;
use crate::predicate::Outcome;

/// Indicador visual enquanto o listener aguarda o evento de status.
pub struct WaitProgress {
    // Spinner do indicatif, desenhado em stderr.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WaitProgress {
    /// Inicia o spinner descrevendo o tópico e o predicado em uso.
    pub fn start(config: &ListenerConfig) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
            pb.set_style(style);
        }
        pb.set_message(format!(
            "waiting on {} ({} predicate, timeout {:.1} min)",
            config.topic,
            config.strategy.kind(),
            config.timeout.as_secs_f64() / 60.0
        ));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e mostra o resultado: verde para SUCCESS, vermelho para FAILED.
    pub fn complete(&self, decision: &Decision) {
        self.pb.finish_and_clear();
        match (decision.outcome, decision.source) {
            (Outcome::Success, _) => {
                eprintln!("  {} Job reported SUCCESS", self.green.apply_to("✓"));
            }
            (_, DecisionSource::Timeout) => {
                eprintln!(
                    "  {} Timed out waiting for job status, marked as FAILED",
                    self.red.apply_to("✗")
                );
            }
            _ => {
                eprintln!("  {} Job reported FAILED", self.red.apply_to("✗"));
            }
        }
    }

    /// Imprime o registro da decisão em JSON.
    pub fn print_decision(&self, decision: &Decision) {
        eprintln!();
        eprintln!("{}", self.yellow.apply_to("─── Decision ───"));
        eprintln!(
            "{}",
            serde_json::to_string_pretty(decision).unwrap_or_default()
        );
    }
}
