//! Query predicates compiled into SQL `WHERE` clauses.
//!
//! A predicate names the fields it reads so the fetch compiler can decide
//! whether the related kind must be joined in.

use std::collections::BTreeSet;
use std::fmt::Debug;

use regex::Regex;
use tunedb_types::{Boolean, PathType, QueryKind, SqlValue, Type, Value};

use crate::error::{DbError, Result};
use crate::kind::Kind;
use crate::sql::SqlScope;

/// A predicate over models of some kind.
pub trait Query: Debug + Send + Sync {
    /// SQL fragment and the parameters bound to its `?` placeholders.
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>);

    /// Names of the fields this predicate reads.
    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueQuery;

impl Query for TrueQuery {
    fn clause(&self, _scope: &SqlScope) -> (String, Vec<SqlValue>) {
        ("1".to_string(), Vec::new())
    }
}

/// Matches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FalseQuery;

impl Query for FalseQuery {
    fn clause(&self, _scope: &SqlScope) -> (String, Vec<SqlValue>) {
        ("0".to_string(), Vec::new())
    }
}

/// Bind a value compared against `field`. Flexible attributes are stored
/// as text, so their comparison value is too.
fn bind(scope: &SqlScope, field: &str, value: &Value) -> SqlValue {
    if scope.is_flex(field) {
        return value.to_text().map(SqlValue::Text).unwrap_or(SqlValue::Null);
    }
    value.to_sql()
}

/// Exact equality.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    field: String,
    value: Value,
}

impl MatchQuery {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), value: value.into() }
    }
}

impl Query for MatchQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        (
            format!("{} = ?", scope.column(&self.field)),
            vec![bind(scope, &self.field, &self.value)],
        )
    }

    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }
}

/// The field is absent (`NULL`).
#[derive(Debug, Clone)]
pub struct NoneQuery {
    field: String,
}

impl NoneQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Query for NoneQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        (format!("{} IS NULL", scope.column(&self.field)), Vec::new())
    }

    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }
}

/// Case-insensitive substring match through `LIKE`.
#[derive(Debug, Clone)]
pub struct SubstringQuery {
    field: String,
    pattern: String,
    fold_accents: bool,
}

impl SubstringQuery {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self { field: field.into(), pattern: pattern.into(), fold_accents: false }
    }

    /// Also match when the field and pattern differ only in accents, by
    /// transliterating both sides to ASCII.
    pub fn fold_accents(mut self, fold: bool) -> Self {
        self.fold_accents = fold;
        self
    }
}

/// Escape `LIKE` wildcards with `\`.
fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Query for SubstringQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        let column = scope.column(&self.field);
        let pattern = SqlValue::Text(format!("%{}%", escape_like(&self.pattern)));
        let sql = if self.fold_accents {
            format!("unidecode({column}) LIKE unidecode(?) ESCAPE '\\'")
        } else {
            format!("{column} LIKE ? ESCAPE '\\'")
        };
        (sql, vec![pattern])
    }

    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }
}

/// Case-insensitive regular expression search through `REGEXP`.
#[derive(Debug, Clone)]
pub struct RegexpQuery {
    field: String,
    pattern: String,
}

impl RegexpQuery {
    /// Fails when `pattern` is not a valid regular expression.
    pub fn new(field: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        Regex::new(&pattern).map_err(|e| DbError::InvalidQuery(e.to_string()))?;
        Ok(Self { field: field.into(), pattern })
    }
}

impl Query for RegexpQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        (
            format!("{} REGEXP ?", scope.column(&self.field)),
            vec![SqlValue::Text(self.pattern.clone())],
        )
    }

    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }
}

/// A number or an inclusive range with optional open ends.
#[derive(Debug, Clone)]
pub struct NumericQuery {
    field: String,
    exact: Option<f64>,
    low: Option<f64>,
    high: Option<f64>,
}

impl NumericQuery {
    /// Parse `5`, `1..5`, `..5` or `1..`.
    pub fn parse(field: impl Into<String>, pattern: &str) -> Result<Self> {
        let field = field.into();
        let number = |s: &str| -> Result<Option<f64>> {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .map(Some)
                .map_err(|_| DbError::InvalidQuery(format!("{s:?} is not a number")))
        };

        match pattern.split_once("..") {
            Some((low, high)) => {
                Ok(Self { field, exact: None, low: number(low)?, high: number(high)? })
            }
            None => match number(pattern)? {
                Some(exact) => Ok(Self { field, exact: Some(exact), low: None, high: None }),
                None => Err(DbError::InvalidQuery("empty numeric pattern".to_string())),
            },
        }
    }
}

impl Query for NumericQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        let column = scope.numeric_column(&self.field);
        if let Some(exact) = self.exact {
            return (format!("{column} = ?"), vec![SqlValue::Real(exact)]);
        }
        match (self.low, self.high) {
            (Some(low), Some(high)) => (
                format!("{column} >= ? AND {column} <= ?"),
                vec![SqlValue::Real(low), SqlValue::Real(high)],
            ),
            (Some(low), None) => (format!("{column} >= ?"), vec![SqlValue::Real(low)]),
            (None, Some(high)) => (format!("{column} <= ?"), vec![SqlValue::Real(high)]),
            (None, None) => ("1".to_string(), Vec::new()),
        }
    }

    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }
}

/// Compares a field stored as `0`/`1`.
#[derive(Debug, Clone)]
pub struct BooleanQuery {
    field: String,
    value: bool,
}

impl BooleanQuery {
    pub fn new(field: impl Into<String>, value: bool) -> Self {
        Self { field: field.into(), value }
    }

    /// Parse permissive true/false text such as `yes` or `0`.
    pub fn parse(field: impl Into<String>, pattern: &str) -> Self {
        Self::new(field, matches!(Boolean.parse(pattern), Value::Bool(true)))
    }
}

impl Query for BooleanQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        (
            format!("{} = ?", scope.numeric_column(&self.field)),
            vec![SqlValue::Integer(i64::from(self.value))],
        )
    }

    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }
}

/// Matches one file exactly, or every path below a directory.
#[derive(Debug, Clone)]
pub struct PathQuery {
    field: String,
    file: Vec<u8>,
    dir: Vec<u8>,
    case_sensitive: bool,
}

impl PathQuery {
    pub fn new(field: impl Into<String>, path: &str, case_sensitive: bool) -> Self {
        let mut file = match PathType::new().parse(path) {
            Value::Bytes(b) => b,
            _ => Vec::new(),
        };
        while file.len() > 1 && file.last() == Some(&b'/') {
            file.pop();
        }
        let mut dir = file.clone();
        if dir.last() != Some(&b'/') {
            dir.push(b'/');
        }
        Self { field: field.into(), file, dir, case_sensitive }
    }
}

impl Query for PathQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        let column = scope.column(&self.field);
        let bytes = |b: &[u8]| {
            if scope.is_flex(&self.field) {
                SqlValue::Text(String::from_utf8_lossy(b).into_owned())
            } else {
                SqlValue::Blob(b.to_vec())
            }
        };
        let params = vec![
            bytes(&self.file),
            SqlValue::Integer(self.dir.len() as i64),
            bytes(&self.dir),
        ];

        let sql = if self.case_sensitive {
            format!("({column} = ?) OR (substr({column}, 1, ?) = ?)")
        } else {
            format!(
                "(bytelower({column}) = bytelower(?)) \
                 OR (substr(bytelower({column}), 1, ?) = bytelower(?))"
            )
        };
        (sql, params)
    }

    fn field_names(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }
}

// ── Combinators ─────────────────────────────────────────────────────────────

fn join_clauses(
    subqueries: &[Box<dyn Query>],
    scope: &SqlScope,
    joiner: &str,
    empty: &str,
) -> (String, Vec<SqlValue>) {
    if subqueries.is_empty() {
        return (empty.to_string(), Vec::new());
    }
    let mut parts = Vec::with_capacity(subqueries.len());
    let mut params = Vec::new();
    for q in subqueries {
        let (sql, p) = q.clause(scope);
        parts.push(format!("({sql})"));
        params.extend(p);
    }
    (parts.join(joiner), params)
}

fn union_fields(subqueries: &[Box<dyn Query>]) -> BTreeSet<String> {
    subqueries.iter().flat_map(|q| q.field_names()).collect()
}

/// Every subquery matches. Empty matches everything.
#[derive(Debug, Default)]
pub struct AndQuery(pub Vec<Box<dyn Query>>);

impl Query for AndQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        join_clauses(&self.0, scope, " AND ", "1")
    }

    fn field_names(&self) -> BTreeSet<String> {
        union_fields(&self.0)
    }
}

/// Any subquery matches. Empty matches nothing.
#[derive(Debug, Default)]
pub struct OrQuery(pub Vec<Box<dyn Query>>);

impl Query for OrQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        join_clauses(&self.0, scope, " OR ", "0")
    }

    fn field_names(&self) -> BTreeSet<String> {
        union_fields(&self.0)
    }
}

/// Negation.
#[derive(Debug)]
pub struct NotQuery(pub Box<dyn Query>);

impl Query for NotQuery {
    fn clause(&self, scope: &SqlScope) -> (String, Vec<SqlValue>) {
        let (sql, params) = self.0.clause(scope);
        (format!("NOT ({sql})"), params)
    }

    fn field_names(&self) -> BTreeSet<String> {
        self.0.field_names()
    }
}

// ── Type-directed construction ──────────────────────────────────────────────

/// The type governing `field` on `K`, looking through to the related kind
/// for fields `K` does not have.
fn field_type<K: Kind>(field: &str) -> &'static dyn Type {
    let registry = K::registry();
    if !registry.is_fixed(field) {
        if let Some(related) = K::relation() {
            if related.spec.registry.is_fixed(field) {
                return related.spec.registry.ty(field);
            }
        }
    }
    registry.ty(field)
}

/// Build the predicate appropriate for `field` matching `pattern`.
///
/// A named query registered by the kind wins; otherwise the field's type
/// decides between a numeric, boolean, path or substring match.
pub fn field_query<K: Kind>(field: &str, pattern: &str) -> Result<Box<dyn Query>> {
    if let Some(query) = K::named_query(field, pattern) {
        return Ok(query);
    }
    Ok(match field_type::<K>(field).query_kind() {
        QueryKind::Numeric => Box::new(NumericQuery::parse(field, pattern)?),
        QueryKind::Boolean => Box::new(BooleanQuery::parse(field, pattern)),
        QueryKind::Path => Box::new(PathQuery::new(field, pattern, true)),
        QueryKind::Substring => Box::new(SubstringQuery::new(field, pattern)),
    })
}

/// Substring match of `pattern` against any of the kind's search fields.
pub fn any_field_query<K: Kind>(pattern: &str) -> Box<dyn Query> {
    let subqueries = K::search_fields()
        .iter()
        .map(|field| Box::new(SubstringQuery::new(*field, pattern)) as Box<dyn Query>)
        .collect();
    Box::new(OrQuery(subqueries))
}
