//! pipedrop server binary
//!
//! Ephemeral in-memory file exchange: one producer POSTs a file, any number
//! of consumers GET it concurrently, streaming bytes while the upload is
//! still running. Files expire after a configurable idle period.
//!
//! # Examples
//!
//! ```bash
//! # Start the server on the default port
//! pipedrop serve
//!
//! # Keep mp4 files around for five minutes of idle time
//! pipedrop serve --expire-override '\.mp4$=300'
//! ```

use clap::{Args, Parser, Subcommand};
use pipedrop::server::{start_server, ServerConfig};
use pipedrop::storage::{ExpirationPolicy, ExpirySweeper, PatternOverride, Repository, SweepConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// pipedrop - ephemeral streaming file exchange
#[derive(Parser, Debug)]
#[command(name = "pipedrop")]
#[command(version = pipedrop::VERSION)]
#[command(about = "Ephemeral in-memory file exchange", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "PIPEDROP_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the pipedrop server
    Serve(ServeArgs),

    /// Show server version
    Version,
}

/// Server configuration arguments
#[derive(Args, Debug)]
struct ServeArgs {
    /// HTTP bind address
    #[arg(short, long, default_value = "0.0.0.0", env = "PIPEDROP_BIND")]
    bind: String,

    /// HTTP port
    #[arg(short, long, default_value = "8080", env = "PIPEDROP_PORT")]
    port: u16,

    /// Enable CORS
    #[arg(long)]
    cors: bool,

    /// Idle seconds before a file expires, unless overridden
    #[arg(long, default_value = "60", env = "PIPEDROP_EXPIRATION_SECS")]
    default_expiration_secs: u64,

    /// Per-path expiration override, as REGEX=SECONDS (repeatable)
    #[arg(long = "expire-override")]
    expire_overrides: Vec<String>,

    /// Seconds between expiration sweeps
    #[arg(long, default_value = "10")]
    sweep_interval_secs: u64,

    /// Maximum upload body size (MB)
    #[arg(long, default_value = "16")]
    max_body_size: usize,

    /// Seconds in-flight uploads may drain after a shutdown signal
    #[arg(long, default_value = "2")]
    upload_grace_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    match cli.command {
        Commands::Serve(args) => serve_command(args).await,
        Commands::Version => {
            println!("pipedrop {}", pipedrop::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "pipedrop.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(!cli.no_color),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Serve command - run the exchange until shutdown
async fn serve_command(args: ServeArgs) -> anyhow::Result<()> {
    info!("🚀 pipedrop {} starting", pipedrop::VERSION);

    let overrides = args
        .expire_overrides
        .iter()
        .map(|spec| PatternOverride::parse(spec))
        .collect::<Result<Vec<_>, _>>()?;
    for rule in &overrides {
        info!(
            pattern = rule.pattern(),
            threshold_secs = rule.threshold().as_secs(),
            "expiration override"
        );
    }

    let policy = ExpirationPolicy::new(Duration::from_secs(args.default_expiration_secs), overrides);
    let repository = Arc::new(Repository::new(policy));

    let sweeper = ExpirySweeper::start(
        repository.clone(),
        SweepConfig {
            interval: Duration::from_secs(args.sweep_interval_secs),
        },
    );

    let config = ServerConfig {
        bind_addr: args.bind,
        port: args.port,
        enable_cors: args.cors,
        max_body_size: args.max_body_size * 1024 * 1024,
        upload_grace_period: Duration::from_secs(args.upload_grace_secs),
    };

    let result = start_server(config, repository).await;

    sweeper.stop();
    info!("pipedrop stopped");
    result
}
