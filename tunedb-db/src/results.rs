//! [`Results`]: the rows of one fetch, materialized into models on demand.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::database::Database;
use crate::kind::Kind;
use crate::model::Model;
use crate::sort::Sort;
use crate::transaction::Row;

/// The outcome of [`Database::fetch`].
///
/// Rows become models the first time they are reached and are cached, so
/// traversing the results again yields the same `Arc` handles. A pending
/// in-memory sort materializes every row before the first model is
/// returned; the sorted order is kept afterwards.
pub struct Results<K: Kind> {
    db: Database,
    rows: VecDeque<Row>,
    /// Database revision the rows were read at.
    revision: u64,
    row_count: usize,
    objects: Vec<Arc<Model<K>>>,
    sort: Option<Box<dyn Sort>>,
}

impl<K: Kind> fmt::Debug for Results<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("kind", &K::TABLE)
            .field("rows", &self.row_count)
            .field("revision", &self.revision)
            .field("materialized", &self.objects.len())
            .field("sort", &self.sort)
            .finish()
    }
}

impl<K: Kind> Results<K> {
    pub(crate) fn new(
        db: Database,
        rows: Vec<Row>,
        revision: u64,
        sort: Option<Box<dyn Sort>>,
    ) -> Self {
        let row_count = rows.len();
        Self { db, rows: rows.into(), revision, row_count, objects: Vec::new(), sort }
    }

    /// Number of rows, without materializing any.
    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Materialize one more row. Returns `false` when none are left.
    fn materialize_next(&mut self) -> bool {
        match self.rows.pop_front() {
            Some(row) => {
                self.objects.push(Arc::new(Model::from_row(&self.db, row, self.revision)));
                true
            }
            None => false,
        }
    }

    fn materialize_all(&mut self) {
        while self.materialize_next() {}
    }

    /// Run a pending in-memory sort, once.
    fn apply_sort(&mut self) {
        let Some(sort) = self.sort.take() else {
            return;
        };
        self.materialize_all();
        self.objects.sort_by(|a, b| sort.compare(a.as_ref(), b.as_ref()));
    }

    /// Iterate over shared handles to the models, in order.
    pub fn iter(&mut self) -> Iter<'_, K> {
        self.apply_sort();
        Iter { results: self, next: 0 }
    }

    /// The `n`th model, materializing rows up to it.
    pub fn get(&mut self, n: usize) -> Option<Arc<Model<K>>> {
        self.apply_sort();
        while self.objects.len() <= n {
            if !self.materialize_next() {
                return None;
            }
        }
        self.objects.get(n).cloned()
    }

    pub fn first(&mut self) -> Option<Arc<Model<K>>> {
        self.get(0)
    }

    /// Every model, fully materialized.
    pub fn materialized(&mut self) -> &[Arc<Model<K>>] {
        self.apply_sort();
        self.materialize_all();
        &self.objects
    }

    /// Owned models, in order.
    pub fn into_models(mut self) -> Vec<Model<K>> {
        self.apply_sort();
        self.materialize_all();
        self.objects.into_iter().map(Arc::unwrap_or_clone).collect()
    }
}

/// Iterator returned by [`Results::iter`].
pub struct Iter<'a, K: Kind> {
    results: &'a mut Results<K>,
    next: usize,
}

impl<K: Kind> Iterator for Iter<'_, K> {
    type Item = Arc<Model<K>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.results.objects.len() && !self.results.materialize_next() {
            return None;
        }
        let model = self.results.objects.get(self.next).cloned();
        self.next += 1;
        model
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.results.row_count.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl<K: Kind> IntoIterator for Results<K> {
    type Item = Model<K>;
    type IntoIter = std::vec::IntoIter<Model<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_models().into_iter()
    }
}
