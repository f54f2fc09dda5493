//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! This binary reads `CommandEnvelope` messages as newline-delimited JSON
//! from stdin, routes them to the interaction controller, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr and a daily rolling log
//! file so that stdout remains a clean JSON protocol channel.
//!
//! Usage: `interlocutor-host [--config <path>] [--log-dir <dir>]`

use interlocutor::InteractionConfig;
use interlocutor::host::handler::spawn_host_runtime;
use interlocutor::host::leaves::HostEvents;
use interlocutor::host::stdio::run_stdio_bridge;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
                args.config = Some(PathBuf::from(path));
            }
            "--log-dir" => {
                let dir = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--log-dir needs a directory"))?;
                args.log_dir = Some(PathBuf::from(dir));
            }
            "-h" | "--help" => {
                eprintln!("usage: interlocutor-host [--config <path>] [--log-dir <dir>]");
                return Ok(None);
            }
            "-V" | "--version" => {
                eprintln!("interlocutor-host {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(Some(args))
}

fn init_tracing(log_dir: Option<&PathBuf>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("interlocutor=info,reqwest=warn,hyper=warn"));

    let log_dir = log_dir.cloned().unwrap_or_else(interlocutor::app_dirs::logs_dir);
    // File logging is best effort; stderr always works.
    let file_layer = std::fs::create_dir_all(&log_dir)
        .ok()
        .and_then(|()| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("interlocutor")
                .filename_suffix("log")
                .max_log_files(5)
                .build(&log_dir)
                .ok()
        })
        .map(|appender| fmt::layer().with_writer(appender).with_ansi(false));
    let file_logging = file_layer.is_some();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if !file_logging {
        tracing::warn!(log_dir = %log_dir.display(), "file logging unavailable");
    }
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<InteractionConfig> {
    if let Some(path) = explicit {
        return InteractionConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()));
    }
    let path = InteractionConfig::default_config_path();
    if path.exists() {
        tracing::info!(path = %path.display(), "loading config");
        InteractionConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))
    } else {
        tracing::info!(path = %path.display(), "no config file; using defaults");
        Ok(InteractionConfig::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args()? else {
        return Ok(());
    };
    init_tracing(args.log_dir.as_ref());

    tracing::info!("interlocutor-host starting");
    let config = load_config(args.config.as_ref())?;

    let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_CAPACITY);
    let runtime = spawn_host_runtime(config, HostEvents::new(event_tx.clone()))
        .map_err(|e| anyhow::anyhow!("failed to start controller: {e}"))?;
    let controller = runtime.handler.controller().clone();

    let result = run_stdio_bridge(runtime.handler, event_tx).await;

    controller.shutdown();
    let controller_exit = controller_outcome(runtime.controller_task.await);
    runtime.bridge_task.abort();

    result.map_err(|e| {
        tracing::error!(error = %e, "interlocutor-host exited with error");
        anyhow::anyhow!("interlocutor-host failed: {e}")
    })?;
    controller_exit?;

    tracing::info!("interlocutor-host shut down cleanly");
    Ok(())
}

/// Turn the controller task's join result into the process outcome.
fn controller_outcome(joined: Result<(), tokio::task::JoinError>) -> anyhow::Result<()> {
    joined.map_err(|e| {
        tracing::error!(error = %e, panicked = e.is_panic(), "controller task failed");
        anyhow::anyhow!("controller task failed: {e}")
    })
}
