//! Sort criteria: pushed into SQL when possible, applied in memory
//! otherwise.

use std::cmp::Ordering;
use std::fmt::Debug;

use tunedb_types::Value;

use crate::kind::Kind;
use crate::schema::quote_ident;

/// Read access to field values for in-memory comparisons.
pub trait FieldLookup {
    /// The value of `key`, or `None` when the model has no such field.
    fn lookup(&self, key: &str) -> Option<Value>;
}

/// An ordering of fetched models.
pub trait Sort: Debug + Send + Sync {
    /// `ORDER BY` terms, or `None` when the sort cannot be expressed in SQL.
    fn order_clause(&self) -> Option<String>;

    /// Whether the sort must run in memory after all rows are materialized.
    fn is_slow(&self) -> bool {
        self.order_clause().is_none()
    }

    fn compare(&self, a: &dyn FieldLookup, b: &dyn FieldLookup) -> Ordering;
}

fn compare_field(
    field: &str,
    ascending: bool,
    case_insensitive: bool,
    a: &dyn FieldLookup,
    b: &dyn FieldLookup,
) -> Ordering {
    let a = a.lookup(field).unwrap_or_default();
    let b = b.lookup(field).unwrap_or_default();
    let ord = a.sort_cmp(&b, case_insensitive);
    if ascending { ord } else { ord.reverse() }
}

/// Sort on a fixed column, compiled to `ORDER BY`.
#[derive(Debug, Clone)]
pub struct FixedFieldSort {
    field: String,
    ascending: bool,
    case_insensitive: bool,
}

impl FixedFieldSort {
    pub fn new(field: impl Into<String>, ascending: bool, case_insensitive: bool) -> Self {
        Self { field: field.into(), ascending, case_insensitive }
    }
}

impl Sort for FixedFieldSort {
    fn order_clause(&self) -> Option<String> {
        let column = quote_ident(&self.field);
        let order = if self.ascending { "ASC" } else { "DESC" };
        let term = if self.case_insensitive {
            format!("(CASE WHEN typeof({column}) = 'text' THEN LOWER({column}) ELSE {column} END)")
        } else {
            column
        };
        Some(format!("{term} {order}"))
    }

    fn compare(&self, a: &dyn FieldLookup, b: &dyn FieldLookup) -> Ordering {
        compare_field(&self.field, self.ascending, self.case_insensitive, a, b)
    }
}

/// Sort on a flexible or computed field, applied in memory.
#[derive(Debug, Clone)]
pub struct SlowFieldSort {
    field: String,
    ascending: bool,
    case_insensitive: bool,
}

impl SlowFieldSort {
    pub fn new(field: impl Into<String>, ascending: bool, case_insensitive: bool) -> Self {
        Self { field: field.into(), ascending, case_insensitive }
    }
}

impl Sort for SlowFieldSort {
    fn order_clause(&self) -> Option<String> {
        None
    }

    fn compare(&self, a: &dyn FieldLookup, b: &dyn FieldLookup) -> Ordering {
        compare_field(&self.field, self.ascending, self.case_insensitive, a, b)
    }
}

/// Several sorts applied in order, each breaking the ties of the previous.
/// Runs in memory as a whole if any component does.
#[derive(Debug, Default)]
pub struct MultipleSort(pub Vec<Box<dyn Sort>>);

impl Sort for MultipleSort {
    fn order_clause(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let terms = self.0.iter().map(|s| s.order_clause()).collect::<Option<Vec<_>>>()?;
        Some(terms.join(", "))
    }

    fn is_slow(&self) -> bool {
        self.0.iter().any(|s| s.is_slow())
    }

    fn compare(&self, a: &dyn FieldLookup, b: &dyn FieldLookup) -> Ordering {
        self.0
            .iter()
            .map(|s| s.compare(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// The sort for `field` on `K`: a named sort registered by the kind, a
/// SQL sort for fixed columns, otherwise an in-memory sort.
pub fn sort_for_field<K: Kind>(field: &str, ascending: bool, case_insensitive: bool) -> Box<dyn Sort> {
    if let Some(sort) = K::named_sort(field, ascending) {
        return sort;
    }
    if K::registry().is_fixed(field) {
        Box::new(FixedFieldSort::new(field, ascending, case_insensitive))
    } else {
        Box::new(SlowFieldSort::new(field, ascending, case_insensitive))
    }
}
