//! Fluent SQL statement builder with automatic placeholder renumbering.
//!
//! `StatementBuilder` accumulates SELECT/FROM/JOIN/WHERE/GROUP BY/HAVING/
//! ORDER BY/LIMIT/OFFSET fragments together with an ordered parameter list.
//! Each predicate call writes its condition with *local* placeholders
//! (`$1..$k` for that call's own parameters); the builder shifts them so the
//! assembled statement carries contiguous `$1..$N` placeholders that line up
//! with the final parameter list.
//!
//! The builder is a short-lived, single-owner value. It is not meant to be
//! shared between tasks; build the statement, execute it, move on.
//!
//! # Example
//!
//! ```ignore
//! use pgkit::{params, StatementBuilder};
//!
//! let mut qb = StatementBuilder::new();
//! let stmt = qb
//!     .from("users")
//!     .filter("age > $1 AND status = $2", params![18, "active"])
//!     .and_filter("city = $1", params!["NY"])
//!     .order_by_desc("created_at")
//!     .paginate(1, 20)
//!     .build()?;
//! let rows = db.query_statement(&stmt).await?;
//! ```

use crate::error::{DbError, DbResult};
use crate::param::{Param, ParamList};
use tokio_postgres::types::ToSql;

/// The closed set of supported join kinds.
///
/// Keeping this an enum (rather than caller-supplied text) means a join
/// clause can never carry a malformed kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        }
    }
}

/// Sort direction for `order_by`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A finished statement: SQL text plus the parameter snapshot that binds it.
#[derive(Clone, Debug)]
pub struct BuiltStatement {
    /// The assembled SQL, one clause per line.
    pub sql: String,
    params: ParamList,
}

impl BuiltStatement {
    /// The bound parameters, in placeholder order.
    pub fn params(&self) -> &ParamList {
        &self.params
    }

    /// Parameter references in the form `tokio-postgres` execution expects.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.as_refs()
    }
}

/// Fluent accumulator for a single SELECT statement.
#[derive(Clone, Debug, Default)]
pub struct StatementBuilder {
    select_fields: Vec<String>,
    from_table: String,
    join_clauses: Vec<String>,
    where_clauses: Vec<String>,
    group_by_fields: Vec<String>,
    having_clauses: Vec<String>,
    order_by_fields: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    params: ParamList,
}

impl StatementBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append SELECT expressions. Repeated calls concatenate; nothing is
    /// deduplicated. If no fields are ever selected, `build` emits `SELECT *`.
    pub fn select(&mut self, fields: &[&str]) -> &mut Self {
        self.select_fields
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Set the FROM target. Last call wins; a builder with no FROM target
    /// fails at `build` time.
    pub fn from(&mut self, table: &str) -> &mut Self {
        self.from_table = table.to_string();
        self
    }

    /// Add a join clause. The ON condition is caller-supplied literal text;
    /// it does not participate in parameter binding.
    pub fn join(&mut self, kind: JoinKind, table: &str, on: &str) -> &mut Self {
        self.join_clauses
            .push(format!("{} {} ON {}", kind.as_sql(), table, on));
        self
    }

    /// Add INNER JOIN.
    pub fn inner_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(JoinKind::Inner, table, on)
    }

    /// Add LEFT JOIN.
    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(JoinKind::Left, table, on)
    }

    /// Add RIGHT JOIN.
    pub fn right_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(JoinKind::Right, table, on)
    }

    /// Add FULL OUTER JOIN.
    pub fn full_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.join(JoinKind::Full, table, on)
    }

    /// Add a WHERE predicate.
    ///
    /// `condition` uses local placeholders `$1..$k` for this call's own
    /// `params`; they are renumbered against the parameters already
    /// collected so the final SQL stays contiguous. When predicates already
    /// exist the new one is connected with `AND`.
    ///
    /// A condition whose placeholder count disagrees with `params.len()` is
    /// accepted as-is and produces stray or unresolved placeholders; that is
    /// a caller error, not validated here.
    pub fn filter(&mut self, condition: &str, params: Vec<Param>) -> &mut Self {
        self.push_predicate("AND", condition, params)
    }

    /// Add a WHERE predicate connected with `AND`. As the first predicate
    /// this behaves exactly like [`filter`](Self::filter).
    pub fn and_filter(&mut self, condition: &str, params: Vec<Param>) -> &mut Self {
        self.push_predicate("AND", condition, params)
    }

    /// Add a WHERE predicate connected with `OR`. As the first predicate
    /// this behaves exactly like [`filter`](Self::filter).
    pub fn or_filter(&mut self, condition: &str, params: Vec<Param>) -> &mut Self {
        self.push_predicate("OR", condition, params)
    }

    /// Append GROUP BY fields.
    pub fn group_by(&mut self, fields: &[&str]) -> &mut Self {
        self.group_by_fields
            .extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Add a HAVING predicate. Placeholders renumber exactly like
    /// [`filter`](Self::filter); multiple entries are joined with `AND`
    /// when the statement is assembled.
    pub fn having(&mut self, condition: &str, params: Vec<Param>) -> &mut Self {
        let shifted = renumber_placeholders(condition, self.params.len());
        self.having_clauses.push(shifted);
        self.params.extend_params(params);
        self
    }

    /// Append an ORDER BY field with an explicit direction.
    pub fn order_by(&mut self, field: &str, direction: Order) -> &mut Self {
        self.order_by_fields
            .push(format!("{} {}", field, direction.as_sql()));
        self
    }

    /// Append ORDER BY field ASC.
    pub fn order_by_asc(&mut self, field: &str) -> &mut Self {
        self.order_by(field, Order::Asc)
    }

    /// Append ORDER BY field DESC.
    pub fn order_by_desc(&mut self, field: &str) -> &mut Self {
        self.order_by(field, Order::Desc)
    }

    /// Set LIMIT.
    pub fn limit(&mut self, n: i64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(&mut self, n: i64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// Page-based pagination: `offset = (page - 1) * page_size`,
    /// `limit = page_size`. `page` is 1-based and is not clamped; the caller
    /// must supply `page >= 1`.
    pub fn paginate(&mut self, page: i64, page_size: i64) -> &mut Self {
        self.offset = Some((page - 1) * page_size);
        self.limit = Some(page_size);
        self
    }

    /// Assemble the final SQL and a snapshot of the parameters.
    ///
    /// Read-only and repeatable: the builder can keep accumulating after a
    /// build. Fails if no FROM target was set.
    pub fn build(&self) -> DbResult<BuiltStatement> {
        if self.from_table.is_empty() {
            return Err(DbError::builder("FROM table is required"));
        }

        let mut lines: Vec<String> = Vec::new();

        let select = if self.select_fields.is_empty() {
            "*".to_string()
        } else {
            self.select_fields.join(", ")
        };
        lines.push(format!("SELECT {select}"));
        lines.push(format!("FROM {}", self.from_table));
        lines.extend(self.join_clauses.iter().cloned());

        if !self.where_clauses.is_empty() {
            lines.push(format!("WHERE {}", self.where_clauses.join(" ")));
        }
        if !self.group_by_fields.is_empty() {
            lines.push(format!("GROUP BY {}", self.group_by_fields.join(", ")));
        }
        if !self.having_clauses.is_empty() {
            lines.push(format!("HAVING {}", self.having_clauses.join(" AND ")));
        }
        if !self.order_by_fields.is_empty() {
            lines.push(format!("ORDER BY {}", self.order_by_fields.join(", ")));
        }
        if let Some(limit) = self.limit {
            lines.push(format!("LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            lines.push(format!("OFFSET {offset}"));
        }

        Ok(BuiltStatement {
            sql: lines.join("\n"),
            params: self.params.clone(),
        })
    }

    /// The assembled SQL only, for logging.
    pub fn to_sql(&self) -> DbResult<String> {
        Ok(self.build()?.sql)
    }

    /// Snapshot copy of the parameters collected so far.
    pub fn params(&self) -> ParamList {
        self.params.clone()
    }

    /// Return the builder to its construction-time state for reuse.
    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    fn push_predicate(&mut self, connector: &str, condition: &str, params: Vec<Param>) -> &mut Self {
        let shifted = renumber_placeholders(condition, self.params.len());
        if self.where_clauses.is_empty() {
            self.where_clauses.push(shifted);
        } else {
            self.where_clauses.push(format!("{connector} {shifted}"));
        }
        self.params.extend_params(params);
        self
    }
}

/// Shift every `$n` placeholder in `condition` up by `offset`.
///
/// The scan is digit-aware, so `$1` and `$12` renumber independently, and it
/// rewrites *every* occurrence of a placeholder. A condition that reuses one
/// local placeholder (`price BETWEEN $1 AND $1 + 10`) therefore stays
/// consistent after renumbering.
fn renumber_placeholders(condition: &str, offset: usize) -> String {
    if offset == 0 {
        return condition.to_string();
    }

    let mut out = String::with_capacity(condition.len() + 8);
    let mut chars = condition.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        let mut digits = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() {
                digits.push(next);
                chars.next();
            } else {
                break;
            }
        }
        match digits.parse::<usize>() {
            Ok(local) => {
                out.push('$');
                out.push_str(&(local + offset).to_string());
            }
            // A bare `$` with no digits passes through untouched.
            Err(_) => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    fn lines(sql: &str) -> Vec<&str> {
        sql.lines().collect()
    }

    #[test]
    fn default_select_star() {
        let mut qb = StatementBuilder::new();
        let stmt = qb.from("users").build().unwrap();
        assert_eq!(stmt.sql, "SELECT *\nFROM users");
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn select_fields_concatenate() {
        let mut qb = StatementBuilder::new();
        let stmt = qb
            .select(&["id", "name"])
            .select(&["email"])
            .from("users")
            .build()
            .unwrap();
        assert_eq!(lines(&stmt.sql)[0], "SELECT id, name, email");
    }

    #[test]
    fn from_last_call_wins() {
        let mut qb = StatementBuilder::new();
        let stmt = qb.from("users").from("accounts").build().unwrap();
        assert_eq!(lines(&stmt.sql)[1], "FROM accounts");
    }

    #[test]
    fn missing_from_fails() {
        let qb = StatementBuilder::new();
        let err = qb.build().unwrap_err();
        assert!(matches!(err, DbError::Builder(_)));
        assert!(err.to_string().contains("FROM table is required"));
    }

    #[test]
    fn placeholder_contiguity_across_predicates() {
        // The worked example: three predicate calls, each numbering its own
        // parameters locally, must come out contiguous 1..5 in call order.
        let mut qb = StatementBuilder::new();
        let stmt = qb
            .from("users")
            .filter("age > $1 AND status = $2", params![18, "active"])
            .and_filter("city = $1", params!["NY"])
            .or_filter("country = $1 AND verified = $2", params!["USA", true])
            .build()
            .unwrap();
        assert!(stmt.sql.contains(
            "WHERE age > $1 AND status = $2 AND city = $3 OR country = $4 AND verified = $5"
        ));
        assert_eq!(stmt.params().len(), 5);
    }

    #[test]
    fn and_or_as_first_predicate_take_no_connector() {
        let mut a = StatementBuilder::new();
        a.from("t").and_filter("x = $1", params![1]);
        let mut b = StatementBuilder::new();
        b.from("t").or_filter("x = $1", params![1]);
        assert!(a.build().unwrap().sql.contains("WHERE x = $1"));
        assert!(b.build().unwrap().sql.contains("WHERE x = $1"));
    }

    #[test]
    fn repeated_local_placeholder_renumbers_every_occurrence() {
        let mut qb = StatementBuilder::new();
        let stmt = qb
            .from("products")
            .filter("category = $1", params!["tools"])
            .and_filter("price BETWEEN $1 AND $1 + 10", params![100])
            .build()
            .unwrap();
        assert!(
            stmt.sql
                .contains("WHERE category = $1 AND price BETWEEN $2 AND $2 + 10")
        );
        assert_eq!(stmt.params().len(), 2);
    }

    #[test]
    fn multi_digit_placeholders_shift_correctly() {
        assert_eq!(
            renumber_placeholders("$1 AND $2 AND $10", 5),
            "$6 AND $7 AND $15"
        );
        assert_eq!(renumber_placeholders("price > $1", 0), "price > $1");
        assert_eq!(renumber_placeholders("cost $ rate = $1", 3), "cost $ rate = $4");
    }

    #[test]
    fn mismatched_placeholders_accepted_silently() {
        // Two placeholders, one parameter: caller error, passed through.
        let mut qb = StatementBuilder::new();
        let stmt = qb
            .from("t")
            .filter("a = $1", params![1])
            .and_filter("b = $1 AND c = $2", params![2])
            .build()
            .unwrap();
        assert!(stmt.sql.contains("WHERE a = $1 AND b = $2 AND c = $3"));
        assert_eq!(stmt.params().len(), 2);
    }

    #[test]
    fn having_renumbers_and_joins_with_and() {
        let mut qb = StatementBuilder::new();
        let stmt = qb
            .select(&["user_id", "COUNT(*) AS orders"])
            .from("orders")
            .filter("status = $1", params!["paid"])
            .group_by(&["user_id"])
            .having("COUNT(*) > $1", params![5i64])
            .having("SUM(total) > $1", params![1000i64])
            .build()
            .unwrap();
        assert!(stmt.sql.contains("GROUP BY user_id"));
        assert!(
            stmt.sql
                .contains("HAVING COUNT(*) > $2 AND SUM(total) > $3")
        );
        assert_eq!(stmt.params().len(), 3);
    }

    #[test]
    fn join_kinds_render_fixed_fragments() {
        let mut qb = StatementBuilder::new();
        let stmt = qb
            .from("users u")
            .inner_join("orders o", "u.id = o.user_id")
            .left_join("profiles p", "u.id = p.user_id")
            .join(JoinKind::Full, "audits a", "u.id = a.user_id")
            .build()
            .unwrap();
        let sql = stmt.sql;
        assert!(sql.contains("INNER JOIN orders o ON u.id = o.user_id"));
        assert!(sql.contains("LEFT JOIN profiles p ON u.id = p.user_id"));
        assert!(sql.contains("FULL OUTER JOIN audits a ON u.id = a.user_id"));
    }

    #[test]
    fn clause_assembly_order_is_fixed() {
        let mut qb = StatementBuilder::new();
        let stmt = qb
            .select(&["user_id"])
            .from("orders")
            .inner_join("users u", "u.id = orders.user_id")
            .filter("status = $1", params!["paid"])
            .group_by(&["user_id"])
            .having("COUNT(*) > $1", params![1i64])
            .order_by_desc("user_id")
            .limit(10)
            .offset(20)
            .build()
            .unwrap();
        assert_eq!(
            lines(&stmt.sql),
            vec![
                "SELECT user_id",
                "FROM orders",
                "INNER JOIN users u ON u.id = orders.user_id",
                "WHERE status = $1",
                "GROUP BY user_id",
                "HAVING COUNT(*) > $2",
                "ORDER BY user_id DESC",
                "LIMIT 10",
                "OFFSET 20",
            ]
        );
    }

    #[test]
    fn paginate_arithmetic() {
        let mut qb = StatementBuilder::new();
        let first = qb.from("users").paginate(1, 10).build().unwrap();
        assert!(first.sql.contains("LIMIT 10"));
        assert!(first.sql.contains("OFFSET 0"));

        let mut qb = StatementBuilder::new();
        let second = qb.from("users").paginate(2, 10).build().unwrap();
        assert!(second.sql.contains("LIMIT 10"));
        assert!(second.sql.contains("OFFSET 10"));
    }

    #[test]
    fn build_is_repeatable() {
        let mut qb = StatementBuilder::new();
        qb.from("users").filter("id = $1", params![7]);
        let a = qb.build().unwrap();
        let b = qb.build().unwrap();
        assert_eq!(a.sql, b.sql);
        assert_eq!(a.params().len(), b.params().len());
    }

    #[test]
    fn reset_leaves_no_residual_state() {
        let mut qb = StatementBuilder::new();
        qb.select(&["id"])
            .from("orders")
            .filter("status = $1", params!["paid"])
            .limit(5);
        qb.reset();

        let reused = qb.from("x").build().unwrap();
        let fresh = StatementBuilder::new().from("x").build().unwrap();
        assert_eq!(reused.sql, fresh.sql);
        assert!(reused.params().is_empty());
    }

    #[test]
    fn to_sql_matches_build() {
        let mut qb = StatementBuilder::new();
        qb.from("users").filter("id = $1", params![1]);
        assert_eq!(qb.to_sql().unwrap(), qb.build().unwrap().sql);
    }
}
