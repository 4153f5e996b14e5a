//! `chatpump`: replays a chat event script through the engine.
//!
//! Reads JSON-lines script steps (see [`chatpump::replay`]) from a file or
//! stdin, feeds them to a conversation registry backed by the in-memory
//! transport, and logs what the consumers dispatch.
//!
//! ```bash
//! # Replay a script, logging to stderr
//! cargo run --bin chatpump -- --script demo.jsonl --log-file -
//!
//! # Read the script from stdin with debug logging
//! CHATPUMP_LOG=debug cargo run --bin chatpump < demo.jsonl
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing_appender::non_blocking::WorkerGuard;

use chatpump::config::{AppConfig, CliArgs};
use chatpump::coordinator::EngineContext;
use chatpump::handler::LoggingHandler;
use chatpump::identity::BotIdentity;
use chatpump::registry::ConversationRegistry;
use chatpump::replay::{Replay, ReplayError};
use chatpump::report::TracingReporter;
use chatpump::transport::memory::MemoryTransport;
use chatpump_proto::member::MemberInfo;
use chatpump_proto::message::MemberId;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("chatpump: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("chatpump starting");

    match run(&cli.script, config).await {
        Ok(()) => {
            tracing::info!("chatpump exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "replay failed");
            eprintln!("chatpump: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging.
///
/// Logs go to a file by default, or to stderr when the path is `-`.
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (non_blocking, guard) = if file_path == Some(Path::new("-")) {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        let default_path = std::env::temp_dir().join("chatpump.log");
        let log_path = file_path.unwrap_or(&default_path);
        let log_dir = log_path.parent()?;
        let file_name = log_path.file_name()?.to_str()?;
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, file_name))
    };

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Builds the engine, replays the script and shuts everything down.
async fn run(script: &Path, config: AppConfig) -> Result<(), ReplayError> {
    let transport = Arc::new(
        MemoryTransport::new(MemberInfo::new(
            MemberId::new(config.bot_id.clone()),
            config.bot_name.clone(),
        ))
        .with_edit_window(config.edit_window),
    );

    let bot = BotIdentity::resolve(transport.as_ref()).await?;
    let registry = Arc::new(ConversationRegistry::new(EngineContext::new(
        Arc::clone(&transport),
        Arc::new(LoggingHandler),
        Arc::new(TracingReporter),
        bot,
        config.engine,
    )));
    let replay = Replay::new(transport, Arc::clone(&registry));

    let result = if script == Path::new("-") {
        replay.run(BufReader::new(tokio::io::stdin())).await
    } else {
        let file = tokio::fs::File::open(script).await?;
        replay.run(BufReader::new(file)).await
    };

    let mut coordinators = Vec::new();
    for id in registry.conversations().await {
        if let Some(coordinator) = registry.get(&id).await {
            coordinators.push(coordinator);
        }
    }
    registry.shutdown_all().await;

    for coordinator in coordinators {
        let stats = coordinator.stats();
        tracing::info!(
            conversation = %coordinator.conversation().id,
            processed = stats.consumer.processed,
            commands = stats.consumer.commands,
            messages = stats.consumer.messages,
            failures = stats.consumer.handler_failures,
            cached = stats.cached,
            members = stats.members,
            sweeps = stats.sweeps,
            "conversation stats"
        );
    }

    let summary = result?;
    tracing::info!(
        steps = summary.steps,
        activations = summary.activations,
        deactivations = summary.deactivations,
        forwarded = summary.forwarded,
        edits = summary.edits_applied,
        "replay summary"
    );
    Ok(())
}
