//! School API server binary.
//!
//! Loads layered configuration, initializes structured logging, runs the
//! startup sequence (migrations, services, middleware), and serves HTTP
//! until SIGINT/SIGTERM.

use clap::Parser;
use school_server::config::{self, Config, SCHOOL_DB};
use school_server::startup::{self, StartupError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line arguments. They override file and environment settings.
#[derive(Debug, Parser)]
#[command(name = "school-server", version, about = "School API server")]
struct Cli {
    /// Path to the TOML configuration file.
    config: Option<String>,

    /// Overrides `ConnectionStrings.SchoolDb`.
    #[arg(long)]
    connection_string: Option<String>,

    /// Overrides `server.environment` (e.g. Development).
    #[arg(long)]
    environment: Option<String>,

    /// Overrides `server.port`.
    #[arg(long)]
    port: Option<u16>,

    /// Apply pending migrations, then exit without serving.
    #[arg(long)]
    migrate_only: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(connection_string) = &self.connection_string {
            config.set_connection_string(SCHOOL_DB, connection_string.clone());
        }
        if let Some(environment) = &self.environment {
            config.server.environment = environment.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

fn resolve_config_path(cli: &Cli) -> (String, &'static str) {
    if let Some(path) = cli.config.as_ref().filter(|p| !p.trim().is_empty()) {
        return (path.clone(), "cli-arg");
    }

    if let Ok(path) = std::env::var("SCHOOL_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (path, "env-var");
        }
    }

    ("config.toml".to_string(), "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), StartupError> {
    if cli.migrate_only {
        let report = startup::migrate_only(&config)?;
        tracing::info!(applied = report.applied.len(), "migrate-only run finished");
        return Ok(());
    }

    let server = startup::start(&config).await?;
    server.serve(startup::shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config_path, config_source) = resolve_config_path(&cli);

    let mut config = match config::load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration from {config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = %config_path,
        environment = %config.server.environment,
        "resolved startup configuration"
    );

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "school server failed to start");
            ExitCode::FAILURE
        }
    }
}
