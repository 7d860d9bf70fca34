//! Entity kinds: the static description of one table pair.
//!
//! Every concrete entity kind (a track, a release, ...) implements [`Kind`]
//! once. The field registry it returns is built a single time, typically in
//! a `LazyLock`, and shared by all models of that kind.

use std::collections::HashMap;

use tunedb_types::{Id, Type, Value, DEFAULT};

use crate::model::Model;
use crate::query::Query;
use crate::sort::Sort;

/// Name of the primary-key field every kind carries.
pub const ID_FIELD: &str = "id";

/// One fixed field: a named, typed table column.
#[derive(Debug)]
pub struct Field {
    name: &'static str,
    ty: Box<dyn Type>,
    always_dirty: bool,
}

impl Field {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ty(&self) -> &dyn Type {
        self.ty.as_ref()
    }

    /// Whether assigning this field marks it dirty even when the value is unchanged.
    pub fn always_dirty(&self) -> bool {
        self.always_dirty
    }
}

/// The fixed fields of a kind plus optional types for flexible and
/// computed field names.
#[derive(Debug)]
pub struct FieldRegistry {
    fixed: Vec<Field>,
    index: HashMap<&'static str, usize>,
    types: HashMap<&'static str, Box<dyn Type>>,
}

impl FieldRegistry {
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder::default()
    }

    /// Fixed fields in column order.
    pub fn fixed(&self) -> &[Field] {
        &self.fixed
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fixed[i])
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fixed.iter().map(|f| f.name)
    }

    /// The type of a field: its fixed type, else a declared flexible type,
    /// else [`DEFAULT`].
    pub fn ty(&self, name: &str) -> &dyn Type {
        if let Some(field) = self.field(name) {
            return field.ty();
        }
        match self.types.get(name) {
            Some(ty) => ty.as_ref(),
            None => &DEFAULT,
        }
    }
}

#[derive(Debug, Default)]
pub struct FieldRegistryBuilder {
    fixed: Vec<Field>,
    types: HashMap<&'static str, Box<dyn Type>>,
}

impl FieldRegistryBuilder {
    /// Add a fixed field. Re-adding a name replaces the earlier declaration.
    pub fn field(self, name: &'static str, ty: impl Type + 'static) -> Self {
        self.push(name, Box::new(ty), false)
    }

    /// Add a fixed field that is marked dirty on every assignment.
    pub fn always_dirty_field(self, name: &'static str, ty: impl Type + 'static) -> Self {
        self.push(name, Box::new(ty), true)
    }

    /// Declare the type of a flexible or computed field.
    pub fn flex_type(mut self, name: &'static str, ty: impl Type + 'static) -> Self {
        self.types.insert(name, Box::new(ty));
        self
    }

    fn push(mut self, name: &'static str, ty: Box<dyn Type>, always_dirty: bool) -> Self {
        let field = Field { name, ty, always_dirty };
        match self.fixed.iter().position(|f| f.name == name) {
            Some(i) => self.fixed[i] = field,
            None => self.fixed.push(field),
        }
        self
    }

    /// Finish the registry. A primary `id` field is prepended when missing.
    pub fn build(mut self) -> FieldRegistry {
        if !self.fixed.iter().any(|f| f.name == ID_FIELD) {
            self.fixed.insert(
                0,
                Field { name: ID_FIELD, ty: Box::new(Id::primary()), always_dirty: false },
            );
        }
        let index = self.fixed.iter().enumerate().map(|(i, f)| (f.name, i)).collect();
        FieldRegistry { fixed: self.fixed, index, types: self.types }
    }
}

/// Table names and fields of a kind, as needed for schema setup and SQL.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub table: &'static str,
    pub flex_table: &'static str,
    pub registry: &'static FieldRegistry,
}

/// The one related kind a kind may be joined against when a query names
/// fields the kind itself lacks (e.g. release-level fields of a track).
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub spec: TableSpec,
    /// Join condition, e.g. `items.album_id = albums.id`.
    pub on: &'static str,
}

impl Relation {
    pub fn to<R: Kind>(on: &'static str) -> Self {
        Self { spec: R::table_spec(), on }
    }
}

/// A persistable entity kind.
pub trait Kind: Sized + Send + Sync + 'static {
    /// Table holding the fixed fields.
    const TABLE: &'static str;
    /// Key/value table holding the flexible fields.
    const FLEX_TABLE: &'static str;

    fn registry() -> &'static FieldRegistry;

    /// Fields matched by unqualified search terms.
    fn search_fields() -> &'static [&'static str] {
        &[]
    }

    fn relation() -> Option<Relation> {
        None
    }

    /// Names of read-only fields produced by [`compute`](Kind::compute).
    fn computed_fields() -> &'static [&'static str] {
        &[]
    }

    /// Produce the value of a computed field, or `None` if `key` is not one.
    fn compute(model: &Model<Self>, key: &str) -> Option<Value> {
        let _ = (model, key);
        None
    }

    /// A sort registered under a name that is not a field.
    fn named_sort(name: &str, ascending: bool) -> Option<Box<dyn Sort>> {
        let _ = (name, ascending);
        None
    }

    /// A `name:pattern` predicate that does not relate to a field.
    fn named_query(name: &str, pattern: &str) -> Option<Box<dyn Query>> {
        let _ = (name, pattern);
        None
    }

    fn table_spec() -> TableSpec {
        TableSpec { table: Self::TABLE, flex_table: Self::FLEX_TABLE, registry: Self::registry() }
    }

    fn is_computed(key: &str) -> bool {
        Self::computed_fields().contains(&key)
    }
}
