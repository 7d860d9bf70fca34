//! The [`Type`] trait and the scalar field types.

use std::borrow::Cow;
use std::fmt;

use crate::value::{SqlValue, Value};

/// Delimiter for human-edited multi-value fields (`"Rock; Pop"`).
pub const SEMICOLON_SPACE_DELIMITER: &str = "; ";

/// Delimiter for multi-value tags whose items may contain commas and
/// semicolons. The sentinel is a backslash followed by U+2400 (SYMBOL FOR NULL).
pub const MULTI_VALUE_DELIMITER: &str = "\\\u{2400}";

/// SQLite storage affinity of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Real,
    Text,
    Blob,
}

impl Affinity {
    pub fn sql(self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
            Affinity::Blob => "BLOB",
        }
    }
}

/// Which kind of predicate a field-directed query should build for a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Substring,
    Numeric,
    Boolean,
    Path,
}

/// Value semantics for one model field.
///
/// Implementations are stateless apart from their construction
/// parameters and are shared by every model of a kind.
pub trait Type: fmt::Debug + Send + Sync {
    /// Storage affinity used for the column of a fixed field.
    fn affinity(&self) -> Affinity;

    /// Column declaration used in `CREATE TABLE`.
    fn sql(&self) -> &'static str {
        self.affinity().sql()
    }

    /// The value exposed when the stored value is absent.
    fn null(&self) -> Value;

    /// Coerce an arbitrary value into this type, substituting
    /// [`null`](Type::null) for `Null`.
    fn normalize(&self, value: Value) -> Value {
        if value.is_null() { self.null() } else { value }
    }

    /// Best-effort conversion of user-entered text. Never fails: text that
    /// cannot be understood yields [`null`](Type::null).
    fn parse(&self, text: &str) -> Value {
        Value::Text(text.to_string())
    }

    /// Human-readable rendering of a value.
    fn format(&self, value: &Value) -> String {
        let null;
        let value = if value.is_null() {
            null = self.null();
            &null
        } else {
            value
        };
        value.to_text().unwrap_or_default()
    }

    /// Convert a model value into the value bound to SQL statements.
    fn to_sql(&self, value: &Value) -> SqlValue {
        value.to_sql()
    }

    /// Convert a stored value into a model value.
    ///
    /// Flexible attributes always arrive as text, so text (and blobs,
    /// decoded as UTF-8 with replacement) goes through [`parse`](Type::parse);
    /// native numbers go through [`normalize`](Type::normalize).
    fn from_sql(&self, value: SqlValue) -> Value {
        match value {
            SqlValue::Null => self.null(),
            SqlValue::Text(s) => self.parse(&s),
            SqlValue::Blob(b) => self.parse(&String::from_utf8_lossy(&b)),
            SqlValue::Integer(i) => self.normalize(Value::Integer(i)),
            SqlValue::Real(f) => self.normalize(Value::Real(f)),
        }
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Substring
    }
}

// ── Default ─────────────────────────────────────────────────────────────────

/// Type of fields that declare no type of their own: text, absent when unset.
#[derive(Debug, Clone, Copy)]
pub struct DefaultType;

/// Shared instance of [`DefaultType`].
pub static DEFAULT: DefaultType = DefaultType;

impl Type for DefaultType {
    fn affinity(&self) -> Affinity {
        Affinity::Text
    }

    fn null(&self) -> Value {
        Value::Null
    }
}

// ── Integers ────────────────────────────────────────────────────────────────

/// Round a value to the nearest integer (ties to even), parsing text.
fn round_to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        other => {
            let f = other.as_f64()?;
            if f.is_finite() {
                Some(f.round_ties_even() as i64)
            } else {
                None
            }
        }
    }
}

/// An integer column. The plain flavor exposes absence as `0`, the
/// nullable flavor keeps it as `Null`.
#[derive(Debug, Clone, Copy)]
pub struct Integer {
    nullable: bool,
}

impl Integer {
    pub const fn new() -> Self {
        Self { nullable: false }
    }

    pub const fn nullable() -> Self {
        Self { nullable: true }
    }
}

impl Type for Integer {
    fn affinity(&self) -> Affinity {
        Affinity::Integer
    }

    fn null(&self) -> Value {
        if self.nullable { Value::Null } else { Value::Integer(0) }
    }

    fn normalize(&self, value: Value) -> Value {
        round_to_int(&value).map(Value::Integer).unwrap_or_else(|| self.null())
    }

    /// Only integer text is accepted; `"1.5"` parses to null.
    fn parse(&self, text: &str) -> Value {
        text.trim().parse::<i64>().map(Value::Integer).unwrap_or_else(|_| self.null())
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Numeric
    }
}

/// Shared instance of the plain [`Integer`].
pub static INTEGER: Integer = Integer::new();

/// An integer formatted with a fixed number of zero-padded digits.
#[derive(Debug, Clone, Copy)]
pub struct PaddedInt {
    digits: usize,
    inner: Integer,
}

impl PaddedInt {
    pub const fn new(digits: usize) -> Self {
        Self { digits, inner: Integer::new() }
    }

    pub const fn nullable(digits: usize) -> Self {
        Self { digits, inner: Integer::nullable() }
    }
}

impl Type for PaddedInt {
    fn affinity(&self) -> Affinity {
        Affinity::Integer
    }

    fn null(&self) -> Value {
        self.inner.null()
    }

    fn normalize(&self, value: Value) -> Value {
        self.inner.normalize(value)
    }

    fn parse(&self, text: &str) -> Value {
        self.inner.parse(text)
    }

    fn format(&self, value: &Value) -> String {
        let n = value.as_i64().unwrap_or(0);
        format!("{:0width$}", n, width = self.digits)
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Numeric
    }
}

/// An integer displayed divided by a unit, with a suffix (`128kbps`).
#[derive(Debug, Clone)]
pub struct ScaledInt {
    unit: i64,
    suffix: String,
}

impl ScaledInt {
    pub fn new(unit: i64, suffix: impl Into<String>) -> Self {
        Self { unit: unit.max(1), suffix: suffix.into() }
    }
}

impl Type for ScaledInt {
    fn affinity(&self) -> Affinity {
        Affinity::Integer
    }

    fn null(&self) -> Value {
        Value::Integer(0)
    }

    fn normalize(&self, value: Value) -> Value {
        Integer::new().normalize(value)
    }

    /// Text carrying the suffix is scaled back up by the unit; bare
    /// numbers are taken as raw magnitudes.
    fn parse(&self, text: &str) -> Value {
        let text = text.trim();
        match text.strip_suffix(self.suffix.as_str()).filter(|_| !self.suffix.is_empty()) {
            Some(scaled) => match round_to_int(&Value::Text(scaled.to_string())) {
                Some(n) => Value::Integer(n.saturating_mul(self.unit)),
                None => self.null(),
            },
            None => self.normalize(Value::Text(text.to_string())),
        }
    }

    fn format(&self, value: &Value) -> String {
        let n = value.as_i64().unwrap_or(0);
        format!("{}{}", n.div_euclid(self.unit), self.suffix)
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Numeric
    }
}

/// A row id: the table's primary key or a reference to another table's.
/// Always nullable.
#[derive(Debug, Clone, Copy)]
pub struct Id {
    primary: bool,
}

impl Id {
    pub const fn primary() -> Self {
        Self { primary: true }
    }

    pub const fn foreign() -> Self {
        Self { primary: false }
    }
}

impl Type for Id {
    fn affinity(&self) -> Affinity {
        Affinity::Integer
    }

    fn sql(&self) -> &'static str {
        if self.primary { "INTEGER PRIMARY KEY" } else { "INTEGER" }
    }

    fn null(&self) -> Value {
        Value::Null
    }

    fn normalize(&self, value: Value) -> Value {
        Integer::nullable().normalize(value)
    }

    fn parse(&self, text: &str) -> Value {
        Integer::nullable().parse(text)
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Numeric
    }
}

pub static PRIMARY_ID: Id = Id::primary();
pub static FOREIGN_ID: Id = Id::foreign();

// ── Floats ──────────────────────────────────────────────────────────────────

/// A floating-point column formatted with `digits` decimal places.
#[derive(Debug, Clone, Copy)]
pub struct Float {
    digits: usize,
    nullable: bool,
}

impl Float {
    pub const fn new(digits: usize) -> Self {
        Self { digits, nullable: false }
    }

    pub const fn nullable(digits: usize) -> Self {
        Self { digits, nullable: true }
    }
}

impl Type for Float {
    fn affinity(&self) -> Affinity {
        Affinity::Real
    }

    fn null(&self) -> Value {
        if self.nullable { Value::Null } else { Value::Real(0.0) }
    }

    fn normalize(&self, value: Value) -> Value {
        match value.as_f64() {
            Some(f) => Value::Real(f),
            None => self.null(),
        }
    }

    fn parse(&self, text: &str) -> Value {
        self.normalize(Value::Text(text.to_string()))
    }

    fn format(&self, value: &Value) -> String {
        format!("{:.*}", self.digits, value.as_f64().unwrap_or(0.0))
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Numeric
    }
}

/// One decimal place, `0.0` when unset.
pub static FLOAT: Float = Float::new(1);
/// One decimal place, absent when unset.
pub static NULL_FLOAT: Float = Float::nullable(1);

// ── Strings ─────────────────────────────────────────────────────────────────

/// Plain text; absence reads as the empty string.
#[derive(Debug, Clone, Copy)]
pub struct StringType;

impl Type for StringType {
    fn affinity(&self) -> Affinity {
        Affinity::Text
    }

    fn null(&self) -> Value {
        Value::Text(String::new())
    }

    fn normalize(&self, value: Value) -> Value {
        match value {
            Value::Text(_) => value,
            other => other.to_text().map(Value::Text).unwrap_or_else(|| self.null()),
        }
    }
}

pub static STRING: StringType = StringType;

/// A list of strings stored as a single delimiter-joined text value.
#[derive(Debug, Clone)]
pub struct DelimitedString {
    delimiter: Cow<'static, str>,
}

/// `"Rock; Pop"`-style lists.
pub static SEMICOLON_SPACE_DSV: DelimitedString =
    DelimitedString::from_static(SEMICOLON_SPACE_DELIMITER);
/// Lists whose items may contain any punctuation.
pub static MULTI_VALUE_DSV: DelimitedString = DelimitedString::from_static(MULTI_VALUE_DELIMITER);

impl DelimitedString {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self { delimiter: Cow::Owned(delimiter.into()) }
    }

    pub const fn from_static(delimiter: &'static str) -> Self {
        Self { delimiter: Cow::Borrowed(delimiter) }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

impl Type for DelimitedString {
    fn affinity(&self) -> Affinity {
        Affinity::Text
    }

    fn null(&self) -> Value {
        Value::List(Vec::new())
    }

    fn normalize(&self, value: Value) -> Value {
        match value {
            Value::List(_) => value,
            Value::Null => self.null(),
            Value::Text(s) => self.parse(&s),
            other => Value::List(other.to_text().into_iter().collect()),
        }
    }

    fn parse(&self, text: &str) -> Value {
        if text.is_empty() {
            return self.null();
        }
        Value::List(text.split(&*self.delimiter).map(str::to_string).collect())
    }

    fn format(&self, value: &Value) -> String {
        match value {
            Value::List(items) => items.join(&*self.delimiter),
            Value::Null => String::new(),
            other => other.to_text().unwrap_or_default(),
        }
    }

    fn to_sql(&self, value: &Value) -> SqlValue {
        SqlValue::Text(self.format(value))
    }
}

// ── Boolean ─────────────────────────────────────────────────────────────────

/// Tokens accepted as `true` by [`Boolean::parse`]; everything else is false.
const TRUE_TOKENS: &[&str] = &["yes", "1", "true", "t", "y", "on"];

/// A boolean stored as `0`/`1` and displayed as `True`/`False`.
#[derive(Debug, Clone, Copy)]
pub struct Boolean;

impl Type for Boolean {
    fn affinity(&self) -> Affinity {
        Affinity::Integer
    }

    fn null(&self) -> Value {
        Value::Bool(false)
    }

    fn normalize(&self, value: Value) -> Value {
        match value {
            Value::Bool(_) => value,
            Value::Text(s) => self.parse(&s),
            Value::Null => self.null(),
            other => Value::Bool(other.as_f64().is_some_and(|f| f != 0.0)),
        }
    }

    fn parse(&self, text: &str) -> Value {
        let text = text.trim().to_lowercase();
        Value::Bool(TRUE_TOKENS.contains(&text.as_str()))
    }

    fn format(&self, value: &Value) -> String {
        let truthy = matches!(self.normalize(value.clone()), Value::Bool(true));
        if truthy { "True" } else { "False" }.to_string()
    }

    fn query_kind(&self) -> QueryKind {
        QueryKind::Boolean
    }
}

pub static BOOLEAN: Boolean = Boolean;
