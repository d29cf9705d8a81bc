#![forbid(unsafe_code)]

//! `inferd` — session host binary.
//!
//! Bootstraps configuration, launches the scheduler and serving
//! processes, and runs the execution engine in this process. Re-executed
//! with the hidden `--serving-child` flag, the same binary becomes the
//! request-serving child.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use inferd::engine::MockEngine;
use inferd::ipc::IpcAttachment;
use inferd::{GlobalConfig, Result, Session, SessionError};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "inferd", about = "Inference session supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, required_unless_present = "serving_child")]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the serving listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the serving listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the scheduler log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Override the scheduler executable.
    #[arg(long)]
    scheduler_bin: Option<PathBuf>,

    /// Run as the serving child (internal).
    #[arg(long, hide = true)]
    serving_child: bool,

    /// Token channel socket name (internal).
    #[arg(long, hide = true, requires = "serving_child")]
    token_socket: Option<String>,

    /// Start event sentinel path (internal).
    #[arg(long, hide = true, requires = "serving_child")]
    start_event: Option<PathBuf>,

    /// Cache-ready event sentinel path (internal).
    #[arg(long, hide = true, requires = "serving_child")]
    cache_ready_event: Option<PathBuf>,

    /// Broadcast endpoint path (internal).
    #[arg(long, hide = true, requires = "serving_child")]
    broadcast_endpoint: Option<PathBuf>,
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(run(args));
    std::process::exit(code);
}

async fn run(args: Cli) -> i32 {
    if args.serving_child {
        return match serving_child_main(&args).await {
            Ok(()) => 0,
            Err(err) => {
                error!(%err, "serving child failed");
                1
            }
        };
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration error");
            return 1;
        }
    };

    info!("inferd session bootstrap");
    let session = match Session::bootstrap(config).await {
        Ok(session) => session,
        Err(err) => {
            error!(%err, "session bootstrap failed");
            return 1;
        }
    };

    // The session host ships with the mock engine; real deployments embed
    // this crate as a library and supply their own `Engine`.
    let mut engine = MockEngine::new();
    session.run(&mut engine).await
}

fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let path = args
        .config
        .as_ref()
        .ok_or_else(|| SessionError::Config("--config is required".into()))?;
    let raw = std::fs::read_to_string(path)
        .map_err(|err| SessionError::Config(format!("cannot read config: {err}")))?;
    let mut config = GlobalConfig::from_toml_str(&raw)?;

    if let Some(host) = &args.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir.clone_from(log_dir);
    }
    if let Some(bin) = &args.scheduler_bin {
        config.scheduler.bin.clone_from(bin);
    }

    config.validate()?;
    Ok(config)
}

async fn serving_child_main(args: &Cli) -> Result<()> {
    let attach = IpcAttachment {
        token_socket: args
            .token_socket
            .clone()
            .ok_or_else(|| SessionError::Config("--token-socket is required".into()))?,
        start_event: args
            .start_event
            .clone()
            .ok_or_else(|| SessionError::Config("--start-event is required".into()))?,
        cache_ready_event: args
            .cache_ready_event
            .clone()
            .ok_or_else(|| SessionError::Config("--cache-ready-event is required".into()))?,
        broadcast_endpoint: args
            .broadcast_endpoint
            .clone()
            .ok_or_else(|| SessionError::Config("--broadcast-endpoint is required".into()))?,
    };
    inferd::serving::run_serving_child(attach).await
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| SessionError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| SessionError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
