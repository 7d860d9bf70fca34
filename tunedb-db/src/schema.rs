//! Table creation and in-place migration for registered kinds.
//!
//! The schema is derived from the field registries. A fixed table that
//! lacks columns for newly declared fields is extended with
//! `ALTER TABLE ADD COLUMN`; it is never recreated.

use tunedb_types::SqlValue;

use crate::database::Database;
use crate::error::Result;
use crate::kind::TableSpec;

/// Column names of `table`, in declaration order. Empty when the table
/// does not exist.
pub(crate) fn table_columns(db: &Database, table: &str) -> Result<Vec<String>> {
    let tx = db.transaction()?;
    let rows = tx.query(&format!("PRAGMA table_info({})", quote_ident(table)), &[])?;
    tx.commit()?;

    Ok(rows
        .iter()
        .filter_map(|row| match row.get("name") {
            Some(SqlValue::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect())
}

/// Ensure the fixed-field table of `spec` exists and has a column for
/// every fixed field.
pub(crate) fn make_table(db: &Database, spec: &TableSpec) -> Result<()> {
    let existing = table_columns(db, spec.table)?;

    let sql = if existing.is_empty() {
        let columns: Vec<String> = spec
            .registry
            .fixed()
            .iter()
            .map(|f| format!("{} {}", quote_ident(f.name()), f.ty().sql()))
            .collect();
        log::info!("Creating table {}", spec.table);
        format!("CREATE TABLE {} ({});", quote_ident(spec.table), columns.join(", "))
    } else {
        let mut statements = String::new();
        for field in spec.registry.fixed() {
            if existing.iter().any(|c| c == field.name()) {
                continue;
            }
            log::info!("Adding column {}.{}", spec.table, field.name());
            statements.push_str(&format!(
                "ALTER TABLE {} ADD COLUMN {} {};\n",
                quote_ident(spec.table),
                quote_ident(field.name()),
                field.ty().sql()
            ));
        }
        statements
    };

    if sql.is_empty() {
        return Ok(());
    }
    let tx = db.transaction()?;
    tx.script(&sql)?;
    tx.commit()
}

/// Ensure the flexible-attribute table of `spec` exists.
///
/// Rows are unique per `(entity_id, key)`; writing an existing pair
/// replaces the old row.
pub(crate) fn make_attribute_table(db: &Database, spec: &TableSpec) -> Result<()> {
    if !table_columns(db, spec.flex_table)?.is_empty() {
        return Ok(());
    }

    log::info!("Creating attribute table {}", spec.flex_table);
    let table = quote_ident(spec.flex_table);
    let index = quote_ident(&format!("{}_by_entity", spec.flex_table));
    let tx = db.transaction()?;
    tx.script(&format!(
        "CREATE TABLE {table} (
            id INTEGER PRIMARY KEY,
            entity_id INTEGER,
            key TEXT,
            value TEXT,
            UNIQUE(entity_id, key) ON CONFLICT REPLACE);
        CREATE INDEX IF NOT EXISTS {index} ON {table} (entity_id);"
    ))?;
    tx.commit()
}

/// Quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
