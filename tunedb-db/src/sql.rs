//! Compiling a query and sort into one `SELECT` statement.
//!
//! Each kind's fixed table is read through a subquery that adds a
//! `flex_attrs` column: the kind's flexible attributes aggregated into one
//! JSON object per row. When a query names a field the kind lacks, the
//! related kind's subquery is joined in as well and flexible lookups read
//! from both JSON objects merged, the primary kind winning.

use tunedb_types::SqlValue;

use crate::kind::{FieldRegistry, Kind, Relation, TableSpec};
use crate::query::Query;
use crate::schema::quote_ident;
use crate::sort::Sort;

/// Name of the pseudo-column holding the aggregated flexible attributes.
pub const FLEX_ATTRS: &str = "flex_attrs";

/// The fixed table of `spec` with its flexible attributes attached,
/// aliased as the table name.
pub(crate) fn table_with_flex_attrs(spec: &TableSpec) -> String {
    let table = quote_ident(spec.table);
    let flex_table = quote_ident(spec.flex_table);
    format!(
        "(SELECT {table}.*, \
         COALESCE(json_group_object(flex.key, flex.value) FILTER (WHERE flex.key IS NOT NULL), '{{}}') AS {FLEX_ATTRS} \
         FROM {table} \
         LEFT JOIN (SELECT entity_id, key, CAST(value AS text) AS value FROM {flex_table}) AS flex \
         ON flex.entity_id = {table}.id \
         GROUP BY {table}.id) AS {table}"
    )
}

/// Resolves field names to SQL expressions for one compiled statement.
#[derive(Debug, Clone, Copy)]
pub struct SqlScope {
    table: &'static str,
    registry: &'static FieldRegistry,
    related: Option<Relation>,
}

impl SqlScope {
    /// A scope over `spec` alone, or joined against `related`.
    pub fn new(spec: &TableSpec, related: Option<Relation>) -> Self {
        Self { table: spec.table, registry: spec.registry, related }
    }

    /// Whether `field` is neither a fixed field of the kind nor of the
    /// joined related kind.
    pub fn is_flex(&self, field: &str) -> bool {
        if self.registry.is_fixed(field) {
            return false;
        }
        !self.related.is_some_and(|r| r.spec.registry.is_fixed(field))
    }

    /// The expression reading `field`.
    pub fn column(&self, field: &str) -> String {
        if self.registry.is_fixed(field) {
            return format!("{}.{}", quote_ident(self.table), quote_ident(field));
        }
        if let Some(related) = self.related {
            if related.spec.registry.is_fixed(field) {
                return format!("{}.{}", quote_ident(related.spec.table), quote_ident(field));
            }
        }
        format!("json_extract({}, {})", self.flex_json(), json_path_literal(field))
    }

    /// Like [`column`](Self::column), but flexible values (always text) are
    /// cast so they compare numerically.
    pub fn numeric_column(&self, field: &str) -> String {
        let column = self.column(field);
        if self.is_flex(field) { format!("CAST({column} AS REAL)") } else { column }
    }

    fn flex_json(&self) -> String {
        let own = format!("{}.{FLEX_ATTRS}", quote_ident(self.table));
        match self.related {
            Some(related) => format!(
                "json_patch(COALESCE({}.{FLEX_ATTRS}, '{{}}'), COALESCE({own}, '{{}}'))",
                quote_ident(related.spec.table)
            ),
            None => own,
        }
    }
}

/// A JSON path literal addressing one top-level key.
fn json_path_literal(key: &str) -> String {
    let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
    format!("'$.\"{}\"'", escaped.replace('\'', "''"))
}

/// Build the statement fetching models of `K` matching `query`.
///
/// The related kind is joined only when the query names a field that is not
/// a fixed field of `K`. A sort contributes an `ORDER BY` only when it can
/// be expressed in SQL; the whole statement is then wrapped so the ordering
/// columns refer to the selected row unambiguously.
pub(crate) fn compile_fetch<K: Kind>(
    query: &dyn Query,
    sort: Option<&dyn Sort>,
) -> (String, Vec<SqlValue>) {
    let spec = K::table_spec();
    let needs_join = query.field_names().iter().any(|f| !spec.registry.is_fixed(f));
    let related = K::relation().filter(|_| needs_join);
    let scope = SqlScope::new(&spec, related);

    let (clause, params) = query.clause(&scope);
    let mut statement = match related {
        Some(related) => format!(
            "SELECT {}.* FROM {} LEFT JOIN {} ON {} WHERE {clause}",
            quote_ident(spec.table),
            table_with_flex_attrs(&spec),
            table_with_flex_attrs(&related.spec),
            related.on
        ),
        None => format!("SELECT * FROM {} WHERE {clause}", table_with_flex_attrs(&spec)),
    };

    if let Some(order) = sort.filter(|s| !s.is_slow()).and_then(|s| s.order_clause()) {
        statement = format!("SELECT * FROM ({statement}) ORDER BY {order}");
    }
    (statement, params)
}
