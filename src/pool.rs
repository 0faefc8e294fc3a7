//! Pool lifecycle manager: creation, startup probe, query and transaction
//! execution, telemetry, shutdown.
//!
//! [`Database`] owns a single `deadpool-postgres` pool for the process
//! lifetime. Each logical unit of work (one `query` call, or an entire
//! `transaction` callback) holds exclusive use of one pooled connection,
//! and the connection returns to the pool when the guard drops, on every
//! exit path.
//!
//! # Example
//!
//! ```ignore
//! use pgkit::{Database, PoolConfig};
//!
//! let db = Database::connect(PoolConfig::default()).await?;
//! let rows = db.query("SELECT id, name FROM users WHERE id = $1", &[&7_i64]).await?;
//! db.shutdown();
//! ```

use crate::builder::BuiltStatement;
use crate::config::{PoolConfig, RetryPolicy};
use crate::error::{DbError, DbResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio_postgres::config::SslMode;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row, Socket};
use tracing::{debug, error, info, warn};

/// Queries slower than this are logged at `warn`.
const SLOW_QUERY: Duration = Duration::from_millis(500);

/// Boxed future returned by a transaction callback.
pub type TxFuture<'a, T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send + 'a>>;

/// Pool occupancy counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections currently held by the pool (in use or idle).
    pub total: usize,
    /// Connections sitting idle in the pool.
    pub idle: usize,
    /// Callers currently waiting for a free connection.
    pub waiting: usize,
}

/// Owner of the process-wide connection pool.
///
/// Lifecycle: `new` (validated, uninitialized) → `initialize` →
/// optional `verify_connectivity` → ready → `shutdown` (terminal). Query and
/// transaction methods fail fast with [`DbError::NotInitialized`] outside
/// the ready state.
pub struct Database {
    config: PoolConfig,
    retry: RetryPolicy,
    pool: RwLock<Option<Pool>>,
    closed: AtomicBool,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let initialized = self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("initialized", &initialized)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Database {
    /// Create an uninitialized manager from a validated configuration.
    pub fn new(config: PoolConfig) -> DbResult<Self> {
        config.validate()?;
        let retry = RetryPolicy::Fixed(config.retry_delay());
        Ok(Self {
            config,
            retry,
            pool: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Replace the default fixed-delay retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Convenience constructor: `new` + `initialize` + `verify_connectivity`.
    pub async fn connect(config: PoolConfig) -> DbResult<Self> {
        let db = Self::new(config)?;
        db.initialize()?;
        db.verify_connectivity().await?;
        Ok(db)
    }

    /// Create the pool without TLS.
    ///
    /// The pool is created unconditionally, even when the connectivity check
    /// is disabled; connections themselves are established lazily.
    pub fn initialize(&self) -> DbResult<()> {
        self.initialize_with_tls(NoTls)
    }

    /// Create the pool with a caller-supplied TLS connector.
    pub fn initialize_with_tls<T>(&self, tls: T) -> DbResult<()>
    where
        T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
    {
        let mut slot = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so a racing shutdown cannot slip a new pool
        // in after close.
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::config("pool manager is shut down"));
        }
        if slot.is_some() {
            return Err(DbError::config("pool is already initialized"));
        }

        let c = &self.config;
        let mut pg = tokio_postgres::Config::new();
        pg.host(&c.host)
            .port(c.port)
            .user(&c.username)
            .password(&c.password)
            .dbname(&c.database)
            .connect_timeout(c.connection_timeout())
            .ssl_mode(if c.ssl { SslMode::Require } else { SslMode::Disable });

        let mgr = Manager::from_config(
            pg,
            tls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(c.pool_max)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(c.connection_timeout()))
            .create_timeout(Some(c.connection_timeout()))
            .recycle_timeout(Some(c.idle_timeout()))
            .build()
            .map_err(|e| DbError::Pool(e.to_string()))?;

        info!(
            host = %c.host,
            port = c.port,
            database = %c.database,
            pool_max = c.pool_max,
            "connection pool created"
        );
        *slot = Some(pool);
        Ok(())
    }

    /// Probe the database with bounded retries.
    ///
    /// Returns immediately (pool unverified) when `check_connection` is
    /// false. Otherwise each attempt acquires a connection and runs a
    /// trivial round trip; failures sleep per the retry policy before the
    /// next attempt, and exhaustion reports the attempt count together with
    /// the last underlying error.
    pub async fn verify_connectivity(&self) -> DbResult<()> {
        if !self.config.check_connection {
            debug!("connectivity check disabled; pool left unverified");
            return Ok(());
        }
        let pool = self.handle().ok_or(DbError::NotInitialized)?;

        let attempts = self.config.retry_attempts;
        let mut last = String::new();
        for attempt in 1..=attempts {
            match Self::probe(&pool).await {
                Ok(()) => {
                    info!(attempt, "database connectivity verified");
                    return Ok(());
                }
                Err(e) => {
                    last = e.to_string();
                    if attempt < attempts {
                        let delay = self.retry.delay(attempt);
                        warn!(
                            attempt,
                            attempts,
                            error = %last,
                            retry_in_ms = delay.as_millis() as u64,
                            "connectivity check failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(attempt, attempts, error = %last, "connectivity check failed");
                    }
                }
            }
        }
        Err(DbError::Connectivity { attempts, last })
    }

    async fn probe(pool: &Pool) -> DbResult<()> {
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DbError::execution("connectivity probe", e))?;
        Ok(())
    }

    /// Execute a statement and return every row.
    ///
    /// Acquires a connection (suspending while the pool is at capacity),
    /// executes, and returns the connection to the pool on both success and
    /// failure. Driver failures are wrapped with the originating operation.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        let pool = self.handle().ok_or(DbError::NotInitialized)?;
        let client = pool.get().await?;

        let started = Instant::now();
        let result = client.query(sql, params).await;
        let elapsed = started.elapsed();

        match result {
            Ok(rows) => {
                if elapsed >= SLOW_QUERY {
                    warn!(elapsed_ms = elapsed.as_millis() as u64, sql, "slow query");
                } else {
                    debug!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        rows = rows.len(),
                        "query executed"
                    );
                }
                Ok(rows)
            }
            Err(e) => {
                error!(elapsed_ms = elapsed.as_millis() as u64, error = %e, sql, "query failed");
                Err(DbError::execution("query", e))
            }
        }
    }

    /// Execute a statement and return the first row, if any.
    pub async fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DbResult<Option<Row>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Execute a statement and return the full row set.
    pub async fn query_many(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DbResult<Vec<Row>> {
        self.query(sql, params).await
    }

    /// Execute a statement and return the affected-row count.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        let pool = self.handle().ok_or(DbError::NotInitialized)?;
        let client = pool.get().await?;

        let started = Instant::now();
        let result = client.execute(sql, params).await;
        let elapsed = started.elapsed();

        match result {
            Ok(affected) => {
                if elapsed >= SLOW_QUERY {
                    warn!(elapsed_ms = elapsed.as_millis() as u64, sql, "slow query");
                } else {
                    debug!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        affected, "statement executed"
                    );
                }
                Ok(affected)
            }
            Err(e) => {
                error!(elapsed_ms = elapsed.as_millis() as u64, error = %e, sql, "execute failed");
                Err(DbError::execution("execute", e))
            }
        }
    }

    /// Execute a built statement and return every row.
    pub async fn query_statement(&self, stmt: &BuiltStatement) -> DbResult<Vec<Row>> {
        let params = stmt.params_ref();
        self.query(&stmt.sql, &params).await
    }

    /// Execute a built statement and return the first row, if any.
    pub async fn query_statement_one(&self, stmt: &BuiltStatement) -> DbResult<Option<Row>> {
        let params = stmt.params_ref();
        self.query_one(&stmt.sql, &params).await
    }

    /// Run `callback` inside a transaction on one exclusively held
    /// connection.
    ///
    /// Issues `BEGIN`, hands the callback a [`TxClient`] bound to that
    /// connection, then `COMMIT`s and surfaces the callback's value
    /// unchanged on success, or `ROLLBACK`s and returns a wrapped
    /// transaction error on failure. The connection is released to the pool
    /// exactly once, after commit or rollback resolves.
    ///
    /// If the returned future is dropped before it resolves (a caller
    /// timeout, a lost `select!` branch), the open transaction is rolled
    /// back on a background task before the connection can be reused.
    ///
    /// ```ignore
    /// fn move_funds(tx: &TxClient) -> TxFuture<'_, u64> {
    ///     Box::pin(async move {
    ///         tx.execute("UPDATE accounts SET balance = balance - $1 WHERE id = $2", &[&100_i64, &1_i64]).await?;
    ///         tx.execute("UPDATE accounts SET balance = balance + $1 WHERE id = $2", &[&100_i64, &2_i64]).await
    ///     })
    /// }
    /// let moved = db.transaction(move_funds).await?;
    /// ```
    pub async fn transaction<T, F>(&self, callback: F) -> DbResult<T>
    where
        F: for<'a> FnOnce(&'a TxClient) -> TxFuture<'a, T>,
    {
        let pool = self.handle().ok_or(DbError::NotInitialized)?;
        let client = pool.get().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| DbError::execution("BEGIN", e))?;
        let mut tx = TxClient {
            client: Some(client),
        };

        let outcome = async {
            let value = callback(&tx).await?;
            tx.client()?
                .batch_execute("COMMIT")
                .await
                .map_err(|e| DbError::execution("COMMIT", e))?;
            Ok(value)
        }
        .await;

        match outcome {
            Ok(value) => {
                // Committed; disarm the rollback-on-drop guard.
                let _ = tx.client.take();
                debug!("transaction committed");
                Ok(value)
            }
            Err(cause) => {
                let rolled_back = match tx.client.take() {
                    Some(client) => client.batch_execute("ROLLBACK").await,
                    None => Ok(()),
                };
                match rolled_back {
                    Ok(()) => {
                        warn!(error = %cause, "transaction rolled back");
                        Err(DbError::transaction(cause))
                    }
                    Err(rollback_err) => Err(DbError::Other(format!(
                        "{cause} (rollback failed: {rollback_err})"
                    ))),
                }
            }
        }
    }

    /// Current pool occupancy. All zeros (never an error) before the pool
    /// exists or after shutdown.
    pub fn status(&self) -> PoolStatus {
        match self.handle() {
            Some(pool) => {
                let s = pool.status();
                PoolStatus {
                    total: s.size,
                    idle: s.available,
                    waiting: s.waiting,
                }
            }
            None => PoolStatus::default(),
        }
    }

    /// Close the pool. A no-op when the pool was never created. Terminal:
    /// the manager cannot be re-initialized afterwards.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let taken = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(pool) => {
                pool.close();
                info!("connection pool closed");
            }
            None => debug!("shutdown with no active pool"),
        }
    }

    fn handle(&self) -> Option<Pool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The single connection handed to a transaction callback.
///
/// Every statement issued through it runs on the one connection holding the
/// open transaction. Dropping it with the transaction still open rolls back
/// on a background task.
pub struct TxClient {
    client: Option<deadpool_postgres::Client>,
}

impl TxClient {
    fn client(&self) -> DbResult<&deadpool_postgres::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::Other("transaction connection already released".to_string()))
    }

    /// Execute a statement on the transaction's connection, returning every
    /// row.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<Vec<Row>> {
        self.client()?
            .query(sql, params)
            .await
            .map_err(|e| DbError::execution("transaction query", e))
    }

    /// Execute a statement, returning the first row if any.
    pub async fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DbResult<Option<Row>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Execute a statement, returning the full row set.
    pub async fn query_many(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DbResult<Vec<Row>> {
        self.query(sql, params).await
    }

    /// Execute a statement, returning the affected-row count.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbResult<u64> {
        self.client()?
            .execute(sql, params)
            .await
            .map_err(|e| DbError::execution("transaction execute", e))
    }

    /// Execute a built statement, returning every row.
    pub async fn query_statement(&self, stmt: &BuiltStatement) -> DbResult<Vec<Row>> {
        let params = stmt.params_ref();
        self.query(&stmt.sql, &params).await
    }
}

impl Drop for TxClient {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        // The transaction future was dropped before commit or rollback
        // resolved. Roll back on a spawned task so the connection does not
        // return to the pool with an open transaction.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        warn!(error = %e, "rollback of abandoned transaction failed");
                    }
                });
            }
            Err(_) => warn!("transaction dropped outside a runtime; rollback skipped"),
        }
    }
}
