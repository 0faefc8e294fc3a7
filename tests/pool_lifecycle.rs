//! Pool manager lifecycle tests that need no running database.

use pgkit::{Database, DbError, PoolConfig, PoolStatus, TxClient, TxFuture};

fn unreachable_config() -> PoolConfig {
    PoolConfig {
        host: "127.0.0.1".to_string(),
        // Reserved port; nothing listens here.
        port: 1,
        connection_timeout_ms: 500,
        retry_attempts: 2,
        retry_delay_ms: 10,
        check_connection: true,
        ..PoolConfig::default()
    }
}

#[test]
fn status_is_all_zeros_when_uninitialized() {
    let db = Database::new(PoolConfig::default()).unwrap();
    assert_eq!(db.status(), PoolStatus::default());
}

#[tokio::test]
async fn query_before_initialize_fails_fast() {
    let db = Database::new(PoolConfig::default()).unwrap();
    let err = db.query("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_not_initialized());

    let err = db.query_one("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_not_initialized());
}

#[tokio::test]
async fn transaction_before_initialize_never_runs_callback() {
    fn must_not_run(_tx: &TxClient) -> TxFuture<'_, ()> {
        Box::pin(async { panic!("callback must not run without a pool") })
    }

    let db = Database::new(PoolConfig::default()).unwrap();
    let err = db.transaction(must_not_run).await.unwrap_err();
    assert!(err.is_not_initialized());
}

#[tokio::test]
async fn connectivity_check_disabled_returns_immediately() {
    let cfg = PoolConfig {
        check_connection: false,
        ..unreachable_config()
    };
    // Returns Ok even before initialize: the probe is skipped outright.
    let db = Database::new(cfg).unwrap();
    db.verify_connectivity().await.unwrap();
}

#[tokio::test]
async fn retry_exhaustion_names_attempt_count() {
    let db = Database::new(unreachable_config()).unwrap();
    db.initialize().unwrap();

    let err = db.verify_connectivity().await.unwrap_err();
    assert!(err.is_connectivity());
    match &err {
        DbError::Connectivity { attempts, .. } => assert_eq!(*attempts, 2),
        other => panic!("expected connectivity error, got {other}"),
    }
    assert!(err.to_string().contains("2 attempts"));
}

#[test]
fn double_initialize_is_rejected() {
    let db = Database::new(unreachable_config()).unwrap();
    db.initialize().unwrap();
    let err = db.initialize().unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}

#[tokio::test]
async fn shutdown_is_a_no_op_without_a_pool_and_terminal_with_one() {
    // No pool: shutdown must not fail and may repeat.
    let db = Database::new(PoolConfig::default()).unwrap();
    db.shutdown();
    db.shutdown();

    // With a pool: queries fail fast afterwards and re-initialization is
    // refused.
    let db = Database::new(unreachable_config()).unwrap();
    db.initialize().unwrap();
    db.shutdown();
    assert_eq!(db.status(), PoolStatus::default());

    let err = db.query("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_not_initialized());

    let err = db.initialize().unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}

#[test]
fn database_debug_reports_lifecycle_state() {
    let db = Database::new(PoolConfig::default()).unwrap();
    let rendered = format!("{db:?}");
    assert!(rendered.contains("initialized: false"));
    assert!(rendered.contains("closed: false"));

    db.shutdown();
    assert!(format!("{db:?}").contains("closed: true"));
}

#[test]
fn invalid_configs_are_rejected_up_front() {
    let err = Database::new(PoolConfig {
        pool_max: 0,
        ..PoolConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, DbError::Config(_)));

    let err = Database::new(PoolConfig {
        host: String::new(),
        ..PoolConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}
