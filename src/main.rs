mod arbiter;
mod checkpoint;
mod cli;
mod config;
mod deadline;
mod error;
mod kafka;
mod listener;
mod output;
mod predicate;
mod runner;
mod stream;
mod ui;

use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::{Cli, Command, ListenArgs, PredicateArgs, parse_failure_code};
use config::{ListenerConfig, ListenerSettings};
use deadline::DeadlineTimer;
use kafka::KafkaSource;
use output::OutputSink;
use predicate::PredicateEvaluator;
use ui::WaitProgress;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_failure_code(&e));
        }
    };
    init_tracing(&cli);

    let result = match cli.command {
        Command::Listen(args) => listen(args).await,
        Command::Check { predicate, payload } => check(&predicate, &payload),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdout is reserved for the published output.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn listen(args: ListenArgs) -> Result<u8> {
    let file = ListenerSettings::load(args.config_path().as_deref())?;
    let config = args
        .settings()
        .and_then(|inputs| ListenerConfig::from_settings(file.merge(inputs)))
        .context("error while retrieving listener inputs")?;
    let evaluator = PredicateEvaluator::new(config.strategy.clone())?;
    let deadline = DeadlineTimer::arm(config.timeout)?;

    let source = KafkaSource::connect(&config)?;
    info!(
        topic = %config.topic,
        strategy = config.strategy.kind(),
        timeout_secs = deadline.duration().as_secs_f64(),
        "listening for job status"
    );

    let progress = WaitProgress::start(&config);
    let decision = runner::run(source, &evaluator, &deadline).await?;
    progress.complete(&decision);

    output::publish_decision(&OutputSink::new(args.output_path()), &decision)
        .context("failed to publish output")?;
    progress.print_decision(&decision);

    Ok(decision.exit_code())
}

fn check(predicate: &PredicateArgs, payload: &str) -> Result<u8> {
    let strategy = predicate.settings().predicate_strategy()?;
    let evaluator = PredicateEvaluator::new(strategy)?;

    let raw = if payload == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read payload from stdin")?;
        buf
    } else {
        payload.as_bytes().to_vec()
    };

    let evaluation = evaluator.evaluate(&raw);
    println!("{}", evaluation.outcome);
    if let Some(event) = &evaluation.event {
        println!("{}", serde_json::to_string_pretty(event)?);
    }

    Ok(evaluation.outcome.check_exit_code())
}
