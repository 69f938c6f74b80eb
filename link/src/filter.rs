//! Filter compilation and evaluation for realtime subscriptions
//!
//! Subscriptions are scoped with the backend's compact filter syntax,
//! `column=operator.value`. The same compiled [`FilterExpression`] is sent
//! to the server to scope the channel and the snapshot query, and is
//! evaluated locally to validate incoming change events.
//!
//! # Example
//!
//! ```rust
//! use stallplass_link::{Entity, FilterExpression, FilterOperator};
//! use serde_json::json;
//!
//! let filter = FilterExpression::compile("price=lte.1500").unwrap();
//! assert_eq!(filter.operator(), FilterOperator::Lte);
//!
//! let row = Entity::new().with("id", json!("b1")).with("price", json!(1200));
//! assert!(filter.matches(&row));
//! assert_eq!(filter.to_string(), "price=lte.1500");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};
use crate::models::Entity;

/// Comparison operators understood by the filter syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 10] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Like,
        FilterOperator::Ilike,
        FilterOperator::In,
        FilterOperator::Is,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::In => "in",
            FilterOperator::Is => "is",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled `column=operator.value` filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterExpression {
    column: String,
    operator: FilterOperator,
    value: String,
}

impl FilterExpression {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Equality filter on the identifier column, used by record subscriptions
    pub fn id_eq(id: &str) -> Self {
        Self::new(crate::models::ID_COLUMN, FilterOperator::Eq, id)
    }

    /// Compile a filter string.
    ///
    /// The string is split on its first `=`; the remainder must be a
    /// lowercase operator token, a `.`, and a non-empty value. Anything
    /// else is a [`SyncError::CompileError`].
    pub fn compile(expr: &str) -> Result<Self> {
        let (column, rest) = expr
            .split_once('=')
            .ok_or_else(|| compile_error(expr, "missing '='"))?;

        if column.is_empty() {
            return Err(compile_error(expr, "empty column name"));
        }

        let (token, value) = rest
            .split_once('.')
            .ok_or_else(|| compile_error(expr, "expected operator.value after '='"))?;

        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_lowercase()) {
            return Err(compile_error(expr, "operator must be lowercase letters"));
        }

        if value.is_empty() {
            return Err(compile_error(expr, "empty value"));
        }

        let operator = FilterOperator::from_token(token)
            .ok_or_else(|| compile_error(expr, &format!("unknown operator '{}'", token)))?;

        Ok(Self {
            column: column.to_string(),
            operator,
            value: value.to_string(),
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Operator and value in the `operator.value` form used as a query parameter
    pub fn condition(&self) -> String {
        format!("{}.{}", self.operator, self.value)
    }

    /// Evaluate this filter against a row.
    ///
    /// A missing column only satisfies `is.null`.
    pub fn matches(&self, entity: &Entity) -> bool {
        let cell = entity.get(&self.column).unwrap_or(&JsonValue::Null);

        match self.operator {
            FilterOperator::Is => Self::matches_is(cell, &self.value),
            _ if cell.is_null() => false,
            FilterOperator::Eq => loose_eq(cell, &self.value),
            FilterOperator::Neq => !loose_eq(cell, &self.value),
            FilterOperator::Gt => loose_cmp(cell, &self.value) == Ordering::Greater,
            FilterOperator::Gte => loose_cmp(cell, &self.value) != Ordering::Less,
            FilterOperator::Lt => loose_cmp(cell, &self.value) == Ordering::Less,
            FilterOperator::Lte => loose_cmp(cell, &self.value) != Ordering::Greater,
            FilterOperator::Like => like_match(&cell_text(cell), &self.value),
            FilterOperator::Ilike => {
                like_match(&cell_text(cell).to_lowercase(), &self.value.to_lowercase())
            }
            FilterOperator::In => in_list(&self.value).any(|item| loose_eq(cell, item)),
        }
    }

    fn matches_is(cell: &JsonValue, value: &str) -> bool {
        match value.to_ascii_lowercase().as_str() {
            "null" => cell.is_null(),
            "true" => cell.as_bool() == Some(true),
            "false" => cell.as_bool() == Some(false),
            _ => false,
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.column, self.operator, self.value)
    }
}

impl FromStr for FilterExpression {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::compile(s)
    }
}

/// Join filter strings into a conjunction for server-side scoping.
///
/// Blank inputs are dropped before joining.
pub fn and<I, S>(exprs: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    exprs
        .into_iter()
        .filter_map(|expr| {
            let expr = expr.as_ref().trim();
            (!expr.is_empty()).then(|| expr.to_string())
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn compile_error(expr: &str, reason: &str) -> SyncError {
    SyncError::CompileError(format!("'{}': {}", expr, reason))
}

fn cell_text(cell: &JsonValue) -> String {
    match cell {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(cell: &JsonValue, value: &str) -> bool {
    match (cell_number(cell), value.parse::<f64>()) {
        (Some(left), Ok(right)) => left == right,
        _ => cell_text(cell) == value,
    }
}

/// Numeric comparison when both sides are numbers, lexicographic otherwise
fn loose_cmp(cell: &JsonValue, value: &str) -> Ordering {
    match (cell_number(cell), value.parse::<f64>()) {
        (Some(left), Ok(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        _ => cell_text(cell).as_str().cmp(value),
    }
}

fn cell_number(cell: &JsonValue) -> Option<f64> {
    match cell {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Items of an `in` list: `(a,b,"c d")`
fn in_list(value: &str) -> impl Iterator<Item = &str> {
    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(value);
    inner
        .split(',')
        .map(|item| item.trim().trim_matches('"'))
        .filter(|item| !item.is_empty())
}

/// SQL LIKE with `%` (or `*`) for any run and `_` for a single character
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '%' || pattern[p] == '*') {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%' || *c == '*')
}
