mod common;

use common::test_config;
use school_db::{schema_version, MigrationError, MIGRATIONS};
use school_server::config::{Config, MigrationFailurePolicy, SCHOOL_DB};
use school_server::startup::{self, MigrationOutcome, StartupError};
use tempfile::TempDir;

fn last_script() -> Option<&'static str> {
    MIGRATIONS.last().map(|m| m.name)
}

/// Creates the students table ahead of the migrations so the first script fails.
fn poison_database(dir: &TempDir) {
    let conn = rusqlite::Connection::open(dir.path().join("school.db")).unwrap();
    conn.execute_batch("CREATE TABLE Students (Id INTEGER PRIMARY KEY);")
        .unwrap();
}

#[test]
fn test_fresh_database_is_upgraded_to_latest_script() {
    let dir = tempfile::tempdir().unwrap();
    let (state, outcome) = startup::bootstrap(&test_config(&dir)).unwrap();

    match outcome {
        MigrationOutcome::Upgraded(report) => {
            assert_eq!(report.applied.len(), MIGRATIONS.len());
            assert_eq!(report.schema_version.as_deref(), last_script());
        }
        MigrationOutcome::Failed(e) => panic!("unexpected migration failure: {e}"),
    }

    let conn = state.db.pool().get().unwrap();
    assert_eq!(schema_version(&conn).unwrap().as_deref(), last_script());
}

#[test]
fn test_second_startup_applies_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    startup::bootstrap(&config).unwrap();
    let (_, outcome) = startup::bootstrap(&config).unwrap();

    match outcome {
        MigrationOutcome::Upgraded(report) => {
            assert!(report.applied.is_empty());
            assert_eq!(report.schema_version.as_deref(), last_script());
        }
        MigrationOutcome::Failed(e) => panic!("unexpected migration failure: {e}"),
    }
}

#[test]
fn test_missing_connection_string_fails_before_migrations() {
    let err = startup::bootstrap(&Config::default()).err().unwrap();
    assert!(matches!(err, StartupError::MissingConnectionString(name) if name == SCHOOL_DB));
}

#[test]
fn test_malformed_connection_string_is_fatal() {
    let mut config = Config::default();
    config.set_connection_string(SCHOOL_DB, "Server=db;Database=School");
    let err = startup::bootstrap(&config).err().unwrap();
    assert!(matches!(err, StartupError::ConnectionString { .. }));
}

#[tokio::test]
async fn test_missing_connection_string_binds_no_listener() {
    let err = startup::start(&Config::default()).await.err().unwrap();
    assert!(matches!(err, StartupError::MissingConnectionString(_)));
}

/// Config whose database lives in a directory that does not exist.
fn unreachable_db_config(dir: &TempDir) -> Config {
    let mut config = test_config(dir);
    let path = dir.path().join("missing").join("nested").join("school.db");
    config.set_connection_string(SCHOOL_DB, format!("Data Source={}", path.display()));
    config.database.connect_timeout_ms = 200;
    config
}

#[test]
fn test_unreachable_database_is_a_migration_failure_under_continue() {
    let dir = tempfile::tempdir().unwrap();
    let (_, outcome) = startup::bootstrap(&unreachable_db_config(&dir))
        .expect("an unreachable database must not stop startup");
    assert!(matches!(
        outcome,
        MigrationOutcome::Failed(MigrationError::Connection(_))
    ));
}

#[test]
fn test_unreachable_database_is_fatal_under_abort() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = unreachable_db_config(&dir);
    config.database.on_migration_failure = MigrationFailurePolicy::Abort;

    let err = startup::bootstrap(&config).err().unwrap();
    assert!(matches!(
        err,
        StartupError::Migration(MigrationError::Connection(_))
    ));
}

#[tokio::test]
async fn test_unreachable_database_still_binds_listener() {
    let dir = tempfile::tempdir().unwrap();
    let server = startup::start(&unreachable_db_config(&dir)).await.unwrap();
    assert!(!server.migration().is_success());
    assert!(server.http_addr().is_ok());
}

#[test]
fn test_abort_policy_stops_startup_on_failed_migration() {
    let dir = tempfile::tempdir().unwrap();
    poison_database(&dir);

    let mut config = test_config(&dir);
    config.database.on_migration_failure = MigrationFailurePolicy::Abort;

    let err = startup::bootstrap(&config).err().unwrap();
    assert!(matches!(err, StartupError::Migration(_)));
}

#[test]
fn test_migrate_only_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    poison_database(&dir);

    let err = startup::migrate_only(&test_config(&dir)).unwrap_err();
    assert!(matches!(err, StartupError::Migration(_)));
}

#[tokio::test]
async fn test_failed_migration_still_serves_requests() {
    let dir = tempfile::tempdir().unwrap();
    poison_database(&dir);

    let server = startup::start(&test_config(&dir))
        .await
        .expect("startup should continue past a failed migration");
    assert!(matches!(server.migration(), MigrationOutcome::Failed(_)));

    let addr = server.http_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let response = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .expect("listener should be reachable");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_plain_listener_redirects_to_https() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.https_redirection.port = Some(5001);

    let server = startup::start(&config).await.unwrap();
    let addr = server.http_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let response = client
        .get(format!("http://{addr}/api/students"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()["location"],
        "https://127.0.0.1:5001/api/students"
    );

    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
}
