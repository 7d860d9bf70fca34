//! [`Model`]: one record of an entity kind, with dirty tracking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::time::{SystemTime, UNIX_EPOCH};

use tunedb_types::{SqlValue, Value};

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::kind::{Kind, ID_FIELD};
use crate::schema::quote_ident;
use crate::sort::FieldLookup;
use crate::sql::FLEX_ATTRS;
use crate::transaction::Row;

/// Field that [`Model::add`] stamps with the creation time.
pub const ADDED_FIELD: &str = "added";

/// One record of kind `K`.
///
/// Fixed fields always read as a value: an unset one yields its type's
/// null. Flexible fields may be absent. Computed fields are produced by
/// [`Kind::compute`] on every read and never stored.
pub struct Model<K: Kind> {
    db: Option<Database>,
    fixed: BTreeMap<String, Value>,
    flex: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    /// Database revision at the last synchronization with storage.
    revision: Option<u64>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Kind> Clone for Model<K> {
    /// Duplicates values and dirty state. The copy shares the same
    /// database handle.
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            fixed: self.fixed.clone(),
            flex: self.flex.clone(),
            dirty: self.dirty.clone(),
            revision: self.revision,
            _kind: PhantomData,
        }
    }
}

impl<K: Kind> fmt::Debug for Model<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::TABLE)
            .field("fixed", &self.fixed)
            .field("flex", &self.flex)
            .field("dirty", &self.dirty)
            .field("revision", &self.revision)
            .finish()
    }
}

impl<K: Kind> Default for Model<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kind> Model<K> {
    /// An empty record not associated with any database.
    pub fn new() -> Self {
        Self {
            db: None,
            fixed: BTreeMap::new(),
            flex: BTreeMap::new(),
            dirty: BTreeSet::new(),
            revision: None,
            _kind: PhantomData,
        }
    }

    /// An empty record associated with `db`.
    pub fn with_db(db: &Database) -> Self {
        Self { db: Some(db.clone()), ..Self::new() }
    }

    /// Hydrate a record from a row read at `revision`. The result is clean.
    pub(crate) fn from_row(db: &Database, row: Row, revision: u64) -> Self {
        let registry = K::registry();
        let mut model = Self::with_db(db);
        model.revision = Some(revision);

        for (column, value) in row.into_pairs() {
            if column == FLEX_ATTRS {
                model.flex = decode_flex_attrs::<K>(&value);
            } else if let Some(field) = registry.field(&column) {
                model.fixed.insert(column, field.ty().from_sql(value));
            }
        }
        model
    }

    pub fn database(&self) -> Option<&Database> {
        self.db.as_ref()
    }

    /// Database revision this record was last synchronized at.
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    pub fn id(&self) -> Option<i64> {
        self.fixed.get(ID_FIELD).and_then(Value::as_i64)
    }

    // ── Field access ────────────────────────────────────────────────────────

    /// The value of `key`.
    ///
    /// Computed fields take precedence, then fixed fields (their type's
    /// null when unset), then flexible ones. Fails with
    /// [`DbError::UnknownField`] when `key` is none of these.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.value(key).ok_or_else(|| DbError::UnknownField(key.to_string()))
    }

    /// The value of `key`, or `default` when it is unknown or an unset
    /// flexible field.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.value(key).unwrap_or(default)
    }

    /// The value of `key`, `None` when unknown.
    pub fn value(&self, key: &str) -> Option<Value> {
        if K::is_computed(key) {
            return Some(K::compute(self, key).unwrap_or_default());
        }
        if let Some(field) = K::registry().field(key) {
            return Some(self.fixed.get(key).cloned().unwrap_or_else(|| field.ty().null()));
        }
        self.flex.get(key).cloned()
    }

    /// Assign `key`, normalized by its type. Returns whether the value
    /// changed. Computed fields cannot be assigned.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<bool> {
        if K::is_computed(key) {
            return Err(DbError::ComputedField(key.to_string()));
        }
        let registry = K::registry();
        let value = registry.ty(key).normalize(value.into());

        let (changed, always_dirty) = match registry.field(key) {
            Some(field) => {
                let old = self.fixed.get(key).cloned().unwrap_or_else(|| field.ty().null());
                let changed = old != value;
                self.fixed.insert(key.to_string(), value);
                (changed, field.always_dirty())
            }
            None => {
                let changed = self.flex.get(key) != Some(&value);
                self.flex.insert(key.to_string(), value);
                (changed, false)
            }
        };

        if changed || always_dirty {
            self.dirty.insert(key.to_string());
        }
        Ok(changed)
    }

    /// Assign `key` from user-entered text, parsed by the field's type.
    pub fn set_parse(&mut self, key: &str, text: &str) -> Result<bool> {
        let value = K::registry().ty(key).parse(text);
        self.set(key, value)
    }

    /// Assign several fields.
    pub fn update<I, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, V)>,
        V: Into<Value>,
    {
        for (key, value) in values {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Remove a flexible field, or reset a fixed one to its type's null.
    ///
    /// The removal is persisted on the next [`store`](Self::store).
    pub fn delete(&mut self, key: &str) -> Result<()> {
        if K::is_computed(key) {
            return Err(DbError::ComputedField(key.to_string()));
        }
        if K::registry().is_fixed(key) {
            self.set(key, Value::Null)?;
            return Ok(());
        }
        match self.flex.remove(key) {
            Some(_) => {
                self.dirty.insert(key.to_string());
                Ok(())
            }
            None => Err(DbError::UnknownField(key.to_string())),
        }
    }

    /// Fixed field names followed by the flexible fields that are set,
    /// and the computed names when `include_computed` is set. Computed
    /// values are not evaluated.
    pub fn keys(&self, include_computed: bool) -> Vec<String> {
        let mut keys: Vec<String> = K::registry().names().map(str::to_string).collect();
        keys.extend(self.flex.keys().cloned());
        if include_computed {
            keys.extend(K::computed_fields().iter().map(|k| k.to_string()));
        }
        keys
    }

    /// Every fixed and computed field name of the kind.
    pub fn all_keys() -> Vec<&'static str> {
        K::registry().names().chain(K::computed_fields().iter().copied()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        K::is_computed(key) || K::registry().is_fixed(key) || self.flex.contains_key(key)
    }

    /// Fields assigned since the last synchronization.
    pub fn dirty_fields(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Forget pending changes without writing them.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Display form of `key` through its type.
    pub fn format_field(&self, key: &str) -> Result<String> {
        let value = self.get(key)?;
        Ok(K::registry().ty(key).format(&value))
    }

    /// Every key, computed ones included, mapped to its display form.
    pub fn formatted(&self) -> BTreeMap<String, String> {
        let registry = K::registry();
        self.keys(true)
            .into_iter()
            .filter_map(|key| {
                let value = self.value(&key)?;
                let text = registry.ty(&key).format(&value);
                Some((key, text))
            })
            .collect()
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    fn require_db(&self) -> Result<&Database> {
        self.db.as_ref().ok_or(DbError::NoDatabase { kind: K::TABLE })
    }

    /// The database and id this record is stored under. Checked before
    /// any SQL runs.
    fn check_db(&self) -> Result<(Database, i64)> {
        let db = self.require_db()?.clone();
        let id = self.id().ok_or(DbError::NoId { kind: K::TABLE })?;
        Ok((db, id))
    }

    /// Write dirty fields.
    ///
    /// With `fields`, only the listed fixed fields are written; other dirty
    /// fixed fields stay dirty. Dirty flexible fields are always written,
    /// and those no longer set are deleted. Does nothing when nothing
    /// relevant is dirty.
    pub fn store(&mut self, fields: Option<&[&str]>) -> Result<()> {
        let (db, id) = self.check_db()?;
        let registry = K::registry();

        let fixed: Vec<String> = self
            .dirty
            .iter()
            .filter(|k| registry.is_fixed(k) && k.as_str() != ID_FIELD)
            .filter(|k| fields.is_none_or(|f| f.contains(&k.as_str())))
            .cloned()
            .collect();
        let flex: Vec<String> =
            self.dirty.iter().filter(|k| !registry.is_fixed(k)).cloned().collect();
        if fixed.is_empty() && flex.is_empty() {
            return Ok(());
        }

        let tx = db.transaction()?;
        if !fixed.is_empty() {
            let assignments: Vec<String> =
                fixed.iter().map(|k| format!("{} = ?", quote_ident(k))).collect();
            let mut params: Vec<SqlValue> = fixed
                .iter()
                .map(|k| {
                    let ty = registry.ty(k);
                    ty.to_sql(&self.fixed.get(k.as_str()).cloned().unwrap_or_else(|| ty.null()))
                })
                .collect();
            params.push(SqlValue::Integer(id));
            tx.mutate(
                &format!(
                    "UPDATE {} SET {} WHERE id = ?",
                    quote_ident(K::TABLE),
                    assignments.join(", ")
                ),
                &params,
            )?;
        }

        let flex_table = quote_ident(K::FLEX_TABLE);
        for key in &flex {
            match self.flex.get(key.as_str()) {
                Some(value) => {
                    tx.mutate(
                        &format!(
                            "INSERT INTO {flex_table} (entity_id, key, value) VALUES (?, ?, ?)"
                        ),
                        &[
                            SqlValue::Integer(id),
                            SqlValue::Text(key.clone()),
                            registry.ty(key).to_sql(value),
                        ],
                    )?;
                }
                None => {
                    tx.mutate(
                        &format!("DELETE FROM {flex_table} WHERE entity_id = ? AND key = ?"),
                        &[SqlValue::Integer(id), SqlValue::Text(key.clone())],
                    )?;
                }
            }
        }
        let revision = tx.commit_revision()?;

        for key in fixed.iter().chain(&flex) {
            self.dirty.remove(key);
        }
        self.revision = Some(revision);
        Ok(())
    }

    /// Refresh from storage unless the record is clean and nothing was
    /// committed since it was last synchronized. Replaces every value and
    /// discards pending changes.
    pub fn load(&mut self) -> Result<()> {
        let (db, id) = self.check_db()?;
        if self.dirty.is_empty() && self.revision == Some(db.revision()) {
            return Ok(());
        }

        let stored = db.get::<K>(id)?.ok_or(DbError::NotFound { kind: K::TABLE, id })?;
        self.fixed = stored.fixed;
        self.flex = stored.flex;
        self.dirty.clear();
        self.revision = stored.revision;
        Ok(())
    }

    /// Insert this record as a new row: assigns an id and the creation
    /// time, then writes every field that has a value.
    ///
    /// Uses `db` when given (and keeps it), otherwise the database the
    /// record is already associated with.
    pub fn add(&mut self, db: Option<&Database>) -> Result<()> {
        if let Some(db) = db {
            self.db = Some(db.clone());
        }
        let db = self.require_db()?.clone();

        let revision = {
            let tx = db.transaction()?;
            let id = tx.mutate(&format!("INSERT INTO {} DEFAULT VALUES", quote_ident(K::TABLE)), &[])?;
            self.fixed.insert(ID_FIELD.to_string(), Value::Integer(id));
            self.set(ADDED_FIELD, unix_now())?;

            for key in self.keys(false) {
                if key != ID_FIELD && self.value(&key).is_some_and(|v| !v.is_null()) {
                    self.dirty.insert(key);
                }
            }
            self.store(None)?;
            tx.commit_revision()?
        };
        self.revision = Some(revision);
        Ok(())
    }

    /// Delete the row and all flexible attributes of this record.
    pub fn remove(&mut self) -> Result<()> {
        let (db, id) = self.check_db()?;
        let tx = db.transaction()?;
        tx.mutate(
            &format!("DELETE FROM {} WHERE id = ?", quote_ident(K::TABLE)),
            &[SqlValue::Integer(id)],
        )?;
        tx.mutate(
            &format!("DELETE FROM {} WHERE entity_id = ?", quote_ident(K::FLEX_TABLE)),
            &[SqlValue::Integer(id)],
        )?;
        tx.commit()
    }
}

impl<K: Kind> FieldLookup for Model<K> {
    fn lookup(&self, key: &str) -> Option<Value> {
        self.value(key)
    }
}

/// Decode the aggregated flexible attributes of a row. Values arrive as
/// text and are parsed by their declared types.
fn decode_flex_attrs<K: Kind>(value: &SqlValue) -> BTreeMap<String, Value> {
    let SqlValue::Text(json) = value else {
        return BTreeMap::new();
    };
    let object: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(json) {
        Ok(object) => object,
        Err(e) => {
            log::warn!("Ignoring undecodable attributes in {}: {e}", K::TABLE);
            return BTreeMap::new();
        }
    };

    let registry = K::registry();
    object
        .into_iter()
        .filter_map(|(key, raw)| {
            let text = match raw {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let value = registry.ty(&key).from_sql(SqlValue::Text(text));
            Some((key, value))
        })
        .collect()
}

fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or_default()
}
