//! Pool configuration and retry-delay policy.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection-pool configuration.
///
/// An external configuration loader is expected to produce this (all fields
/// deserialize with defaults); the pool manager only validates the handful
/// of constraints it depends on.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Require TLS on the wire. Pair with
    /// [`Database::initialize_with_tls`](crate::Database::initialize_with_tls);
    /// the plain `NoTls` initializer cannot satisfy a TLS-required server.
    pub ssl: bool,
    /// Desired warm-pool floor. Recorded for operators; the underlying pool
    /// creates connections lazily and does not enforce a minimum.
    pub pool_min: usize,
    pub pool_max: usize,
    pub connection_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    /// Total connectivity-probe attempts (not retries after the first).
    pub retry_attempts: u32,
    /// Delay between probe attempts for the default fixed policy.
    pub retry_delay_ms: u64,
    /// Skip the startup connectivity probe entirely when false.
    pub check_connection: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            ssl: false,
            pool_min: 2,
            pool_max: 10,
            connection_timeout_ms: 5_000,
            idle_timeout_ms: 10_000,
            retry_attempts: 5,
            retry_delay_ms: 2_000,
            check_connection: true,
        }
    }
}

impl PoolConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.host.is_empty() {
            return Err(DbError::config("host must not be empty"));
        }
        if self.database.is_empty() {
            return Err(DbError::config("database must not be empty"));
        }
        if self.pool_max == 0 {
            return Err(DbError::config("pool_max must be at least 1"));
        }
        if self.pool_min > self.pool_max {
            return Err(DbError::config(format!(
                "pool_min ({}) must not exceed pool_max ({})",
                self.pool_min, self.pool_max
            )));
        }
        if self.retry_attempts == 0 {
            return Err(DbError::config("retry_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Delay strategy between connectivity-probe attempts.
///
/// The default is a fixed delay taken from
/// [`PoolConfig::retry_delay_ms`]; swap in `Exponential` via
/// [`Database::with_retry_policy`](crate::Database::with_retry_policy) when
/// backoff is wanted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The same delay before every retry.
    Fixed(Duration),
    /// Doubling delay starting at `initial`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl RetryPolicy {
    /// Delay to wait after a failed attempt. `attempt` is 1-based.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::Fixed(delay) => *delay,
            RetryPolicy::Exponential { initial, max } => {
                let exponent = attempt.saturating_sub(1).min(16);
                initial.saturating_mul(1u32 << exponent).min(*max)
            }
        }
    }
}
