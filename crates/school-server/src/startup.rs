//! Startup sequencing.
//!
//! The sequence is linear: resolve the `SchoolDb` connection string, build
//! the connection pool, run the migration step, assemble the application
//! state and router, bind the listeners, then serve until shutdown.
//!
//! A failed migration is logged and, under the default
//! [`MigrationFailurePolicy::Continue`], does not stop the server from
//! starting. Every other startup failure is fatal.

use crate::config::{Config, MigrationFailurePolicy, SCHOOL_DB};
use crate::middleware::{HttpsRedirection, TlsConnection};
use crate::{app, AppState};
use axum::http::StatusCode;
use axum::{Extension, Router};
use axum_server::tls_rustls::RustlsConfig;
use school_db::{
    create_pool, upgrade, ConnectionSettings, ConnectionStringError, DbPool, DbRuntimeSettings,
    MigrationError, SchoolDbContext, UpgradeReport,
};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Fatal startup and serving errors.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("connection string '{0}' is not configured")]
    MissingConnectionString(&'static str),

    #[error("invalid connection string '{name}': {source}")]
    ConnectionString {
        name: &'static str,
        source: ConnectionStringError,
    },

    #[error("database migration failed: {0}")]
    Migration(#[from] MigrationError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to load TLS certificate or key: {0}")]
    Tls(std::io::Error),

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Result of the migration step.
#[derive(Debug)]
pub enum MigrationOutcome {
    Upgraded(UpgradeReport),
    /// The upgrade failed and startup continued anyway.
    Failed(MigrationError),
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Upgraded(_))
    }
}

/// Reads and parses the `SchoolDb` connection string.
///
/// # Errors
///
/// Returns `StartupError::MissingConnectionString` if the key is absent or
/// blank, or `StartupError::ConnectionString` if it does not parse.
pub fn resolve_connection(config: &Config) -> Result<ConnectionSettings, StartupError> {
    let raw = config
        .connection_string(SCHOOL_DB)
        .ok_or(StartupError::MissingConnectionString(SCHOOL_DB))?;
    raw.parse()
        .map_err(|source| StartupError::ConnectionString {
            name: SCHOOL_DB,
            source,
        })
}

fn runtime_settings(config: &Config, connection: &ConnectionSettings) -> DbRuntimeSettings {
    DbRuntimeSettings {
        busy_timeout_ms: config.database.busy_timeout_ms,
        pool_max_size: config.database.pool_max_size,
        connect_timeout_ms: config.database.connect_timeout_ms,
    }
    .overridden_by(connection)
}

fn upgrade_with_pool(pool: &DbPool) -> Result<UpgradeReport, MigrationError> {
    let conn = pool.get()?;
    upgrade(&conn)
}

/// Runs all pending embedded migrations and reports the outcome.
///
/// The outcome is logged: the error on failure, then the `Success!` line.
/// Under [`MigrationFailurePolicy::Abort`] a failure is returned as an error
/// instead and no `Success!` line is written.
///
/// # Errors
///
/// Returns `StartupError::Migration` only under the abort policy.
pub fn run_migration_step(
    pool: &DbPool,
    policy: MigrationFailurePolicy,
) -> Result<MigrationOutcome, StartupError> {
    let outcome = match upgrade_with_pool(pool) {
        Ok(report) => {
            tracing::info!(
                applied = report.applied.len(),
                schema_version = report.schema_version.as_deref().unwrap_or("<none>"),
                "database upgrade complete"
            );
            MigrationOutcome::Upgraded(report)
        }
        Err(e) => {
            tracing::error!(error = %e, "database upgrade failed");
            if policy == MigrationFailurePolicy::Abort {
                return Err(StartupError::Migration(e));
            }
            tracing::warn!("continuing startup with a failed database upgrade");
            MigrationOutcome::Failed(e)
        }
    };

    tracing::info!("Success!");
    Ok(outcome)
}

/// Runs the startup sequence up to, but not including, binding listeners.
///
/// # Errors
///
/// Returns `StartupError` if the connection string is missing or invalid, or
/// if the migration fails under the abort policy. An unreachable database
/// is a migration failure, so under the continue policy it does not stop
/// startup.
pub fn bootstrap(config: &Config) -> Result<(AppState, MigrationOutcome), StartupError> {
    let connection = resolve_connection(config)?;
    tracing::info!(connection = %connection, "resolved {} connection string", SCHOOL_DB);

    let pool = create_pool(&connection, runtime_settings(config, &connection));

    let outcome = run_migration_step(&pool, config.database.on_migration_failure)?;

    if config.auth.api_keys.is_empty() {
        tracing::warn!("no API keys configured, authorized routes are open");
    }

    // Validated by `Config::validate`; fall back to 307 for hand-built configs.
    let status = StatusCode::from_u16(config.https_redirection.status_code)
        .unwrap_or(StatusCode::TEMPORARY_REDIRECT);

    let state = AppState {
        db: SchoolDbContext::new(pool),
        https: HttpsRedirection::new(
            config.https_port(),
            status,
            config.https_redirection.trust_forwarded_proto,
        ),
        api_keys: config.auth.api_keys.clone().into(),
        enable_docs: config.is_development(),
    };

    Ok((state, outcome))
}

/// Runs only the configuration and migration steps.
///
/// # Errors
///
/// Returns `StartupError` on any failure, including a failed upgrade.
pub fn migrate_only(config: &Config) -> Result<UpgradeReport, StartupError> {
    let connection = resolve_connection(config)?;
    let pool = create_pool(&connection, runtime_settings(config, &connection));
    match run_migration_step(&pool, MigrationFailurePolicy::Abort)? {
        MigrationOutcome::Upgraded(report) => Ok(report),
        MigrationOutcome::Failed(e) => Err(StartupError::Migration(e)),
    }
}

/// A bootstrapped server with its listeners bound, ready to serve.
pub struct Server {
    router: Router,
    http: TcpListener,
    tls: Option<(SocketAddr, RustlsConfig)>,
    migration: MigrationOutcome,
}

impl Server {
    /// Address of the plain HTTP listener.
    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn migration(&self) -> &MigrationOutcome {
        &self.migration
    }

    /// Serves until `shutdown` completes, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns `StartupError::Serve` if either listener fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Server {
            router,
            http: listener,
            tls,
            ..
        } = self;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let tls_handle = axum_server::Handle::new();

        let handle = tls_handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            let _ = stop_tx.send(true);
        });

        let tls_router = router.clone().layer(Extension(TlsConnection));

        let http = async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.wait_for(|stopped| *stopped).await;
                })
                .await
        };

        let tls = async move {
            match tls {
                Some((addr, rustls)) => {
                    axum_server::bind_rustls(addr, rustls)
                        .handle(tls_handle)
                        .serve(tls_router.into_make_service())
                        .await
                }
                None => Ok(()),
            }
        };

        tokio::try_join!(http, tls).map_err(StartupError::Serve)?;

        tracing::info!("school server shut down");
        Ok(())
    }
}

/// Runs the full startup sequence and binds the listeners.
///
/// # Errors
///
/// Returns `StartupError` if bootstrapping fails, a listener cannot be
/// bound, or the TLS certificate cannot be loaded.
pub async fn start(config: &Config) -> Result<Server, StartupError> {
    let (state, migration) = bootstrap(config)?;
    let router = app(state);

    let tls = match &config.server.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .map_err(StartupError::Tls)?;
            let addr = SocketAddr::new(config.server.host, tls.port);
            tracing::info!(%addr, "https listener configured");
            Some((addr, rustls))
        }
        None => None,
    };

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let http = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    tracing::info!(addr = %http.local_addr().unwrap_or(addr), "now listening on http");

    Ok(Server {
        router,
        http,
        tls,
        migration,
    })
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
