//! Error types for pgkit

use thiserror::Error;

/// Result type alias for pgkit operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for the data-access layer
#[derive(Debug, Error)]
pub enum DbError {
    /// Invalid or unusable pool configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A query or transaction was issued before the pool exists
    #[error("Connection pool is not initialized")]
    NotInitialized,

    /// The startup connectivity probe exhausted all retries
    #[error("Connectivity check failed after {attempts} attempts: {last}")]
    Connectivity { attempts: u32, last: String },

    /// A single statement failed against a live pool
    #[error("{op} failed: {source}")]
    Execution {
        op: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    /// A transaction callback or COMMIT failed and the work was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(#[source] Box<DbError>),

    /// Pool acquisition or construction error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Statement builder misuse detected at build time
    #[error("Statement builder error: {0}")]
    Builder(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a builder error
    pub fn builder(message: impl Into<String>) -> Self {
        Self::Builder(message.into())
    }

    /// Wrap a driver error with the operation that produced it
    pub fn execution(op: &'static str, source: tokio_postgres::Error) -> Self {
        Self::Execution { op, source }
    }

    /// Wrap an error that caused a transaction rollback
    pub fn transaction(source: DbError) -> Self {
        Self::Transaction(Box::new(source))
    }

    /// Check if this error means the pool was never initialized
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized)
    }

    /// Check if this is a connectivity-probe failure
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
