//! # pgkit
//!
//! A small PostgreSQL data-access layer: a pooled connection manager and a
//! fluent statement builder with safe positional-parameter handling.
//!
//! ## Features
//!
//! - **One pool for the process**: created once at startup, optionally
//!   health-checked with bounded retries, closed exactly once at shutdown
//! - **Guaranteed release**: every acquired connection returns to the pool
//!   on success and failure paths alike (RAII, no manual release)
//! - **Transactions as callbacks**: `BEGIN`/`COMMIT`/`ROLLBACK` handled for
//!   you around a callback that issues statements on one connection
//! - **Placeholder renumbering**: predicates are written with local
//!   `$1..$k` placeholders per call; the builder shifts them so the final
//!   statement is contiguous `$1..$N` and aligned with its parameter list
//! - **Pool telemetry**: total/idle/waiting counters, safe to read in any
//!   state
//!
//! ## Statement builder
//!
//! ```ignore
//! use pgkit::{params, StatementBuilder};
//!
//! let mut qb = StatementBuilder::new();
//! let stmt = qb
//!     .select(&["id", "name"])
//!     .from("users")
//!     .filter("age > $1 AND status = $2", params![18, "active"])
//!     .or_filter("role = $1", params!["admin"])
//!     .order_by_desc("created_at")
//!     .paginate(1, 20)
//!     .build()?;
//!
//! let rows = db.query_statement(&stmt).await?;
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod param;
pub mod pool;

pub use builder::{BuiltStatement, JoinKind, Order, StatementBuilder};
pub use config::{PoolConfig, RetryPolicy};
pub use error::{DbError, DbResult};
pub use param::{Param, ParamList};
pub use pool::{Database, PoolStatus, TxClient, TxFuture};
