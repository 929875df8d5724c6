//! Pipeway - Main entry point
//!
//! An HTTP gateway routing each host through compiled-in pipes before
//! reverse-proxying it.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pipeway_config::Config;
use pipeway_gateway::generate::Generator;
use pipeway_gateway::{bindings, Gateway, PipeRegistry, ServerError};

const DEFAULT_CONFIG: &str = "pipeway.kdl";

/// Pipeway - HTTP gateway with compiled-in pipes
#[derive(Parser, Debug)]
#[command(name = "pipeway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "PIPEWAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway (default)
    Run,
    /// Validate configuration file and exit
    Test,
    /// Regenerate the pipe dependencies and binding table
    Generate {
        /// Workspace root containing crates/gateway
        #[arg(short = 'w', long = "workspace", default_value = ".")]
        workspace: PathBuf,
    },
    /// Print version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(run_gateway(config_path))
        }
        Commands::Test => test_config(&config_path),
        Commands::Generate { workspace } => generate(&config_path, workspace),
        Commands::Version => {
            println!("pipeway {}", env!("CARGO_PKG_VERSION"));
            for alias in bindings::PIPES {
                println!("  pipe {}", alias);
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Load and validate, logging every finding.
fn load_config(path: &Path) -> Result<Config> {
    let config = Config::from_file(path)?;

    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    for err in &validation.errors {
        error!("{}", err);
    }
    if !validation.is_ok() {
        bail!(
            "Configuration {} has {} error(s)",
            path.display(),
            validation.errors.len()
        );
    }
    Ok(config)
}

/// Test configuration file and exit
fn test_config(path: &Path) -> Result<()> {
    let config = load_config(path).context("Configuration validation failed")?;

    info!("Configuration test successful:");
    info!("  - listen on {}", config.server.listen.socket_address());
    info!("  - {} pipe(s)", config.pipes.len());
    info!("  - {} host(s)", config.hosts.len());

    for pipe in &config.pipes {
        let alias = pipe.alias();
        if !bindings::PIPES.contains(&alias.as_str()) {
            warn!(
                "Pipe '{}' is not compiled into this binary, run 'pipeway generate' and rebuild",
                alias
            );
        }
    }

    println!(
        "pipeway: configuration file {} test is successful",
        path.display()
    );
    Ok(())
}

/// Rewrite the gateway manifest and binding table
fn generate(path: &Path, workspace: PathBuf) -> Result<()> {
    let config = Config::from_file(path)?;
    let generator = Generator::for_workspace(&workspace);
    generator
        .run(&config.pipes)
        .context("Failed to generate pipe bindings")?;

    println!(
        "pipeway: generated {} and {} for {} pipe(s)",
        generator.manifest().display(),
        generator.bindings().display(),
        config.pipes.len()
    );
    Ok(())
}

/// Run the gateway until a shutdown signal or a listener failure
async fn run_gateway(path: PathBuf) -> Result<()> {
    let config = load_config(&path)?;

    let mut registry = PipeRegistry::new(&config.pipes);
    bindings::register(&mut registry).context("Failed to construct pipes")?;

    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<ServerError>();
    let gateway = Gateway::new(&config, registry)
        .context("Failed to configure gateway")?
        .with_async_error_handler(move |err| {
            let _ = error_tx.send(err);
        });

    let addr = gateway.start().await.context("Failed to start gateway")?;
    info!(address = %addr, "Pipeway started");

    let failure = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Received SIGINT, initiating graceful shutdown");
            None
        }
        _ = terminate() => {
            info!("Received SIGTERM, initiating graceful shutdown");
            None
        }
        Some(err) = error_rx.recv() => {
            error!(error = %err, "Listener failed, shutting down");
            Some(err)
        }
    };

    gateway
        .stop(config.server.graceful_shutdown_timeout())
        .await
        .context("Gateway did not shut down cleanly")?;

    match failure {
        Some(err) => Err(err).context("Gateway stopped after a listener failure"),
        None => Ok(()),
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
