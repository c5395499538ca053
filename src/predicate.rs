//! Classification of status events.
//!
//! A [`PredicateEvaluator`] owns exactly one [`PredicateStrategy`], chosen at
//! configuration time, and turns raw message bytes into an [`Outcome`].
//! Expressions and templates use Jinja2 syntax (via `minijinja`) with the
//! decoded payload bound to the `event` variable.

use std::fmt;

use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ConfigError, EvaluationError};

/// A decoded message payload.
pub type Event = Map<String, Value>;

/// Classification of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failed,
    Indeterminate,
}

impl Outcome {
    /// SUCCESS and FAILED end the run; INDETERMINATE does not.
    pub fn is_decisive(self) -> bool {
        !matches!(self, Outcome::Indeterminate)
    }

    /// Exit code of the offline `check` command: 0 SUCCESS, 1 FAILED,
    /// 2 when the payload decides nothing.
    pub fn check_exit_code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed => 1,
            Outcome::Indeterminate => 2,
        }
    }

    fn from_status(status: &str) -> Self {
        match status {
            "SUCCESS" => Outcome::Success,
            "FAILED" => Outcome::Failed,
            _ => Outcome::Indeterminate,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "SUCCESS"),
            Outcome::Failed => write!(f, "FAILED"),
            Outcome::Indeterminate => write!(f, "INDETERMINATE"),
        }
    }
}

/// The rule used to classify an event. Exactly one is active per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateStrategy {
    /// Matches when `event[job_id_field] == id_value`, then reads `event[status_field]`.
    IdentityMatch {
        job_id_field: String,
        status_field: String,
        id_value: String,
    },
    /// Two boolean expressions; `success_expr` is checked first.
    ExpressionPair {
        success_expr: String,
        fail_expr: Option<String>,
    },
    /// A template whose trimmed, upper-cased output is the status string.
    TemplateConditional { template: String },
}

impl PredicateStrategy {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PredicateStrategy::IdentityMatch { .. } => "job-id",
            PredicateStrategy::ExpressionPair { .. } => "expression",
            PredicateStrategy::TemplateConditional { .. } => "template",
        }
    }
}

/// Result of evaluating one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: Outcome,
    /// The parsed event, present only for decisive outcomes.
    pub event: Option<Event>,
}

impl Evaluation {
    fn indeterminate() -> Self {
        Self {
            outcome: Outcome::Indeterminate,
            event: None,
        }
    }
}

/// Stateless classifier of raw payloads.
pub struct PredicateEvaluator {
    strategy: PredicateStrategy,
    env: Environment<'static>,
}

impl PredicateEvaluator {
    /// Build an evaluator, rejecting templates that do not compile.
    pub fn new(strategy: PredicateStrategy) -> Result<Self, ConfigError> {
        match &strategy {
            PredicateStrategy::IdentityMatch { .. } => {}
            PredicateStrategy::ExpressionPair {
                success_expr,
                fail_expr,
            } => {
                compile_check("success_when", &guard(success_expr))?;
                if let Some(expr) = fail_expr {
                    compile_check("fail_when", &guard(expr))?;
                }
            }
            PredicateStrategy::TemplateConditional { template } => {
                compile_check("status_template", template)?;
            }
        }
        Ok(Self {
            strategy,
            env: Environment::new(),
        })
    }

    /// Classify a raw payload. Decode and template failures are logged and
    /// yield [`Outcome::Indeterminate`]; this never fails.
    pub fn evaluate(&self, raw: &[u8]) -> Evaluation {
        let event = match decode(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("skipping message: {e}");
                return Evaluation::indeterminate();
            }
        };

        let outcome = match &self.strategy {
            PredicateStrategy::IdentityMatch {
                job_id_field,
                status_field,
                id_value,
            } => match_identity(&event, job_id_field, status_field, id_value),
            PredicateStrategy::ExpressionPair {
                success_expr,
                fail_expr,
            } => {
                if self.truthy("success_when", success_expr, &event) {
                    Outcome::Success
                } else if fail_expr
                    .as_deref()
                    .is_some_and(|expr| self.truthy("fail_when", expr, &event))
                {
                    Outcome::Failed
                } else {
                    Outcome::Indeterminate
                }
            }
            PredicateStrategy::TemplateConditional { template } => {
                match self.render(template, &event) {
                    Ok(rendered) => Outcome::from_status(&rendered.trim().to_uppercase()),
                    Err(e) => {
                        warn!("status_template failed, treating as no match: {e}");
                        Outcome::Indeterminate
                    }
                }
            }
        };

        debug!(strategy = self.strategy.kind(), %outcome, "evaluated message");
        Evaluation {
            outcome,
            event: outcome.is_decisive().then_some(event),
        }
    }

    fn truthy(&self, field: &str, expr: &str, event: &Event) -> bool {
        match self.render(&guard(expr), event) {
            Ok(rendered) => !rendered.trim().is_empty(),
            Err(e) => {
                warn!("{field} failed, treating as no match: {e}");
                false
            }
        }
    }

    fn render(&self, source: &str, event: &Event) -> Result<String, EvaluationError> {
        Ok(self.env.render_str(source, context! { event => event })?)
    }
}

// Wraps a boolean expression so that it renders non-empty only when true.
fn guard(expr: &str) -> String {
    format!("{{% if {expr} %}}true{{% endif %}}")
}

fn compile_check(field: &'static str, source: &str) -> Result<(), ConfigError> {
    Environment::new()
        .template_from_str(source)
        .map(|_| ())
        .map_err(|e| ConfigError::Template { field, source: e })
}

fn decode(raw: &[u8]) -> Result<Event, EvaluationError> {
    let text = std::str::from_utf8(raw)?;
    Ok(serde_json::from_str::<Event>(text)?)
}

fn match_identity(event: &Event, job_id_field: &str, status_field: &str, id_value: &str) -> Outcome {
    let id_matches = event
        .get(job_id_field)
        .and_then(Value::as_str)
        .is_some_and(|id| id == id_value);
    if !id_matches {
        return Outcome::Indeterminate;
    }
    event
        .get(status_field)
        .and_then(Value::as_str)
        .map(Outcome::from_status)
        .unwrap_or(Outcome::Indeterminate)
}
