//! Positional bind-value storage for the statement builder.

use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A single positional bind value.
///
/// Values are stored behind `Arc` so builders stay cheap to clone and
/// `build()` can hand out parameter snapshots without copying the values.
#[derive(Clone)]
pub struct Param(Arc<dyn ToSql + Sync + Send>);

impl Param {
    /// Wrap any bindable value.
    pub fn new<T: ToSql + Sync + Send + 'static>(value: T) -> Self {
        Param(Arc::new(value))
    }

    /// Borrow the value as the trait object `tokio-postgres` expects.
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Param").field(&"<dyn ToSql>").finish()
    }
}

/// The ordered, append-only list of positional parameters for one statement.
///
/// Parameter `i` (0-based) binds placeholder `$i+1` in the final SQL.
#[derive(Clone, Debug, Default)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Append one value.
    pub fn push<T: ToSql + Sync + Send + 'static>(&mut self, value: T) {
        self.params.push(Param::new(value));
    }

    /// Append pre-wrapped parameters in order.
    pub fn extend_params(&mut self, params: impl IntoIterator<Item = Param>) {
        self.params.extend(params);
    }

    /// Number of parameters collected so far.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether no parameters have been collected.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Borrow every parameter as a reference slice for execution.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(Param::as_sql).collect()
    }

    /// Drop all parameters.
    pub fn clear(&mut self) {
        self.params.clear();
    }
}

/// Build a heterogeneous `Vec<Param>` from bindable values.
///
/// # Example
/// ```ignore
/// builder.filter("age > $1 AND status = $2", params![18, "active"]);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Param>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Param::new($value)),+]
    };
}
