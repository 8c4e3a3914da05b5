//! fedcat CLI - federated metadata catalog service.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fedcat_core::config::LogFormat;
use fedcat_core::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, unknown connector type, conflicts)
    ConfigError = 1,
    /// A catalog backend failed or could not be reached
    CatalogError = 2,
    /// Notification pipeline error (producer creation, broker)
    NotificationError = 3,
    /// Health check failure
    HealthCheckError = 6,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Map an error to an exit code, preferring the typed core error.
    fn from_error(error: &anyhow::Error) -> Self {
        if let Some(e) = error.downcast_ref::<fedcat_core::Error>() {
            return match e {
                fedcat_core::Error::Config(_)
                | fedcat_core::Error::UnknownPlugin { .. }
                | fedcat_core::Error::ConfigurationConflict(_) => ExitCode::ConfigError,
                fedcat_core::Error::Catalog(_) => ExitCode::CatalogError,
                fedcat_core::Error::Notification(_) => ExitCode::NotificationError,
                fedcat_core::Error::Shutdown => ExitCode::SignalInterrupt,
                _ => ExitCode::RuntimeError,
            };
        }
        if error.downcast_ref::<fedcat_core::CatalogError>().is_some() {
            return ExitCode::CatalogError;
        }

        let error_str = error.to_string().to_lowercase();
        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else if error_str.contains("health") {
            ExitCode::HealthCheckError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;
mod server;

#[derive(Parser)]
#[command(name = "fedcat")]
#[command(about = "Federated metadata catalog service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the catalog service
    Serve,

    /// Validate configuration file
    Validate,

    /// List configured catalogs
    Catalogs {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show status and health of a running service
    Status {
        /// Health endpoint URL
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Logging settings come from the config file when it parses; fall back to JSON at info
    let monitoring = config_path(&cli.config)
        .and_then(|path| Config::from_file(&path).ok())
        .map(|config| config.monitoring);
    let log_format = monitoring
        .as_ref()
        .map(|m| m.log_format.clone())
        .unwrap_or(LogFormat::Json);
    let default_level = monitoring
        .as_ref()
        .map(|m| m.log_level.as_str())
        .unwrap_or("info");

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(default_level),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    match execute_command(cli).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve => {
            let config = load_config(&cli.config)?;
            // No auxiliary interface implementation is linked into this binary
            commands::serve::run(config, None).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            commands::validate::run(&config)?;
            println!("Configuration is valid");
        }

        Commands::Catalogs { json } => {
            let config = load_config(&cli.config)?;
            commands::catalogs::run(&config, json).await?;
        }

        Commands::Status { url } => {
            commands::status::run(&url).await?;
        }
    }

    Ok(())
}

fn config_path(path: &Option<PathBuf>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(path.clone()),
        None => {
            let default = Path::new("config.toml");
            default.exists().then(|| default.to_path_buf())
        }
    }
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let path = path.clone().unwrap_or_else(|| PathBuf::from("config.toml"));
    Ok(Config::from_file(&path)?)
}
