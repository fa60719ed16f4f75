//! Relay CLI - streams chat turns in the data stream wire format.
//!
//! Every reply part is written to stdout as one `<tag>:<json>` line; logs
//! and diagnostics go to stderr.

mod repl;
mod sink;

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::config::Rotation;
use relay_core::tools::builtin_registry;
use relay_core::{ChatService, Config, MemoryStore, TurnError, TurnInput};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

use sink::StdoutSink;

/// Relay CLI - stream an LLM reply as data stream parts
#[derive(Parser)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Message to send (reads from stdin if not provided)
    message: Option<String>,

    /// Session ID to attach the turn to
    #[arg(short, long)]
    session: Option<Uuid>,

    /// Override the LLM provider from config
    #[arg(short = 'p', long)]
    provider: Option<String>,

    /// Path to a custom config file (overrides default search locations)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Read one message per line and answer each in the same session
    #[arg(short, long)]
    repl: bool,

    /// Echo the response headers to stderr
    #[arg(long)]
    show_headers: bool,
}

/// Default tracing directives for this crate and relay-core.
const DEFAULT_DIRECTIVES: &[&str] = &["relay_cli=warn", "relay_core=warn"];

/// Build the default `EnvFilter`: RUST_LOG (if set) plus our default directives.
fn default_env_filter() -> Result<tracing_subscriber::EnvFilter> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Initialize the tracing subscriber.
///
/// Logs always go to stderr so stdout carries only wire parts. With a
/// `[logging]` section, a rolling file layer is added.
///
/// Returns the non-blocking writer guard that must be held for the process lifetime.
fn init_tracing(config: &Config) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let Some(ref lc) = config.logging else {
        tracing_subscriber::registry()
            .with(default_env_filter()?)
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    if let Err(e) = std::fs::create_dir_all(&lc.directory) {
        eprintln!(
            "Warning: Failed to create log directory '{}': {}. Logging to stderr only.",
            lc.directory.display(),
            e
        );
        tracing_subscriber::registry()
            .with(default_env_filter()?)
            .with(stderr_layer)
            .init();
        return Ok(None);
    }

    let rotation = match lc.rotation {
        Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix("relay")
        .filename_suffix("log")
        .max_log_files(lc.max_files)
        .build(&lc.directory)
        .context("Failed to create rolling file appender")?;

    // Guard must be kept alive for the process lifetime.
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(default_env_filter()?)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(Some(guard))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    if let Some(ref provider) = args.provider {
        config.provider = provider.clone();
    }
    Ok(config)
}

/// How a turn ended from the user's point of view.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TurnStatus {
    Completed,
    Interrupted,
}

/// Run one turn, streaming to stdout. Ctrl-C cancels it.
pub(crate) async fn run_turn(
    service: &ChatService,
    input: TurnInput,
    show_headers: bool,
) -> Result<TurnStatus> {
    let cancel = CancellationToken::new();
    let sink = Box::new(StdoutSink::new(show_headers));

    let turn = service.stream_reply(sink, input, cancel.clone());
    tokio::pin!(turn);

    let result = tokio::select! {
        result = &mut turn => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            turn.await
        }
    };

    match result {
        Ok(outcome) => {
            tracing::debug!(
                message_id = %outcome.message_id,
                tool_calls = outcome.tool_calls,
                "turn finished"
            );
            Ok(TurnStatus::Completed)
        }
        Err(TurnError::Cancelled) => Ok(TurnStatus::Interrupted),
        Err(e) => Err(e).context("Turn failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _guard = init_tracing(&config)?;

    let store = Arc::new(MemoryStore::new());
    let service = ChatService::from_config(&config, store, builtin_registry())
        .context("Failed to create chat service")?;

    let session_id = args.session.unwrap_or_else(Uuid::new_v4);
    let user_id = Uuid::new_v4();

    if args.repl {
        return repl::run_repl(&service, session_id, user_id, args.show_headers).await;
    }

    let message = match get_message(&args) {
        Ok(msg) => msg,
        Err(_) => {
            // No input provided, show help
            Args::parse_from(["relay", "--help"]);
            return Ok(());
        }
    };

    let input = TurnInput {
        session_id,
        user_id,
        content: message,
    };
    if run_turn(&service, input, args.show_headers).await? == TurnStatus::Interrupted {
        eprintln!("[Interrupted]");
    }

    Ok(())
}

/// Retrieves the message from arguments or stdin.
///
/// Priority: positional argument > stdin > error (if TTY)
fn get_message(args: &Args) -> io::Result<String> {
    if let Some(msg) = &args.message {
        return Ok(msg.clone());
    }

    if io::stdin().is_terminal() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "No message provided",
        ));
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let message = buffer.trim_end().to_string();
    if message.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Empty message on stdin",
        ));
    }
    Ok(message)
}
