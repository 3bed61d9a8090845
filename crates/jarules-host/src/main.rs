//! JaRules bridge host.
//!
//! Runs the bridge as a child of a UI shell: requests arrive as JSON lines
//! on stdin, responses and streaming events leave as JSON lines on stdout.
//! Logs go to stderr or to `--log-file`.

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use jarules_bridge::{BridgeConfig, BridgeContext};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod protocol;
mod server;

const DEFAULT_LOG_FILTER: &str = "jarules=info";

#[derive(Parser, Debug)]
#[command(name = "jarules-bridge-host")]
#[command(about = "JaRules process bridge speaking JSON lines on stdin/stdout")]
#[command(version)]
struct Cli {
    /// Interpreter used to run worker scripts
    #[arg(long, default_value = "python3")]
    python: String,

    /// Interpreter argument placed before the script (repeatable)
    #[arg(long = "python-arg", default_value = "-u", allow_hyphen_values = true)]
    python_args: Vec<String>,

    /// Directory holding the worker scripts; also their working directory
    #[arg(long, default_value = "jarules_agent/electron_bridge")]
    scripts_dir: PathBuf,

    /// LLM configuration file served by get-config
    #[arg(long, default_value = "config/llm_config.yaml")]
    config_file: PathBuf,

    /// Kill a streaming worker after this many silent seconds (0 disables)
    #[arg(long, default_value = "120")]
    stream_idle_timeout_secs: u64,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Skip fetching models and the active model at startup
    #[arg(long)]
    no_startup_refresh: bool,
}

impl Cli {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            interpreter: self.python.clone(),
            interpreter_args: self.python_args.clone(),
            scripts_dir: self.scripts_dir.clone(),
            config_file: self.config_file.clone(),
            stream_idle_timeout: (self.stream_idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.stream_idle_timeout_secs)),
            ..Default::default()
        }
    }
}

fn init_tracing(log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // stdout carries the protocol, so logs never go there.
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            tracing_subscriber::fmt()
                .with_writer(std::sync::Mutex::new(file))
                .with_env_filter(filter)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_ref())?;

    let config = cli.bridge_config();
    info!(
        interpreter = %config.interpreter,
        scripts_dir = %config.scripts_dir.display(),
        idle_timeout_secs = ?config.stream_idle_timeout.map(|d| d.as_secs()),
        "Starting JaRules bridge host"
    );

    let (ctx, events) = BridgeContext::new(config);

    if !cli.no_startup_refresh {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.initialize().await });
    }

    server::serve(
        ctx,
        events,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    info!("Bridge host stopped");
    Ok(())
}
