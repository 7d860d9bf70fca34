//! Scoped, thread-confined access to the database.
//!
//! All SQL goes through a [`Transaction`]. Transactions nest: each thread
//! keeps a stack depth, and only the outermost (root) frame takes the
//! global write lock, opens the SQLite transaction and commits it.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use tunedb_types::SqlValue;

use crate::database::Database;
use crate::error::{DbError, Result};

/// Per-thread bookkeeping for the active logical transaction.
#[derive(Debug)]
pub(crate) struct TxState {
    pub(crate) depth: usize,
    pub(crate) mutated: bool,
    /// The connection the root frame began its SQLite transaction on.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

/// A fetched row: column names plus raw storage values.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let i = self.columns.iter().position(|c| c == column)?;
        self.values.get(i)
    }

    pub fn value(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_pairs(self) -> impl Iterator<Item = (String, SqlValue)> {
        let columns = self.columns;
        self.values
            .into_iter()
            .enumerate()
            .map(move |(i, v)| (columns[i].clone(), v))
    }
}

/// A transaction frame on the current thread.
///
/// Created by [`Database::transaction`]. The frame exits when it is
/// dropped or [committed](Transaction::commit); exiting the root frame
/// commits the SQLite transaction, bumps the database revision if anything
/// was written, and releases the write lock. There is no explicit
/// rollback; only a commit that fails is rolled back.
///
/// Frames must be exited on the thread that created them, which the type
/// enforces by not being `Send`.
pub struct Transaction<'db> {
    db: &'db Database,
    conn: Arc<Mutex<Connection>>,
    root: bool,
    exited: bool,
    _thread: PhantomData<*const ()>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn enter(db: &'db Database) -> Result<Self> {
        let (conn, root) = db.push_frame()?;
        if root {
            db.write_lock().acquire();
            if let Err(e) = conn.lock().execute_batch("BEGIN") {
                db.pop_frame();
                db.write_lock().release();
                return Err(e.into());
            }
        }
        Ok(Self { db, conn, root, exited: false, _thread: PhantomData })
    }

    /// Whether this frame is the outermost on its thread.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Run a statement and collect every row it returns.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        log::trace!("query: {sql} {params:?}");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get_ref(i).map(owned_value))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push(Row { columns: Arc::clone(&columns), values });
        }
        Ok(out)
    }

    /// Run a modifying statement. Returns the rowid of the last inserted row.
    pub fn mutate(&self, sql: &str, params: &[SqlValue]) -> Result<i64> {
        log::trace!("mutate: {sql} {params:?}");
        let conn = self.conn.lock();
        conn.execute(sql, params_from_iter(params.iter()))
            .map_err(map_access_error)?;
        self.db.mark_mutated();
        Ok(conn.last_insert_rowid())
    }

    /// Run several `;`-separated statements, typically schema DDL.
    /// Always counts as a write.
    pub fn script(&self, sql: &str) -> Result<()> {
        log::trace!("script: {sql}");
        self.db.mark_mutated();
        self.conn.lock().execute_batch(sql).map_err(map_access_error)
    }

    /// Exit this frame, returning any commit error of a root frame.
    pub fn commit(mut self) -> Result<()> {
        self.exit().map(|_| ())
    }

    /// Exit this frame and return the revision the data it read and wrote
    /// is current as of. A nested frame reports the revision from before
    /// its root commits, which is at worst one behind.
    pub fn commit_revision(mut self) -> Result<u64> {
        self.exit()
    }

    fn exit(&mut self) -> Result<u64> {
        if self.exited {
            return Ok(self.db.revision());
        }
        self.exited = true;

        let Some(mutated) = self.db.pop_frame() else {
            return Ok(self.db.revision());
        };

        let result = self.commit_root();
        let revision = if mutated && result.is_ok() {
            let revision = self.db.bump_revision();
            log::debug!("Committed {} at revision {}", self.db.path().display(), revision);
            revision
        } else {
            self.db.revision()
        };
        self.db.write_lock().release();
        result.map(|()| revision)
    }

    /// Commit the SQLite transaction. A failed commit is rolled back so the
    /// thread's connection can begin the next one.
    fn commit_root(&self) -> Result<()> {
        let conn = self.conn.lock();
        if conn.is_autocommit() {
            return Ok(());
        }
        let Err(e) = conn.execute_batch("COMMIT") else {
            return Ok(());
        };

        log::warn!("Commit on {} failed, rolling back: {e}", self.db.path().display());
        if !conn.is_autocommit() {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::error!("Rollback on {} failed: {rollback}", self.db.path().display());
                drop(conn);
                self.db.discard_connection();
            }
        }
        Err(map_access_error(e))
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.exit() {
            log::error!("Failed to commit transaction on {}: {e}", self.db.path().display());
        }
    }
}

/// Copy a column value out of the statement. SQLite does not validate the
/// encoding of stored text, so invalid UTF-8 is replaced rather than
/// rejected.
fn owned_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        other => other.into(),
    }
}

/// Surface the two SQLite failures that mean the file itself is gone or
/// unwritable as [`DbError::Inaccessible`].
fn map_access_error(e: rusqlite::Error) -> DbError {
    match &e {
        rusqlite::Error::SqliteFailure(err, msg)
            if matches!(err.code, ErrorCode::ReadOnly | ErrorCode::CannotOpen) =>
        {
            DbError::Inaccessible(msg.clone().unwrap_or_else(|| err.to_string()))
        }
        _ => e.into(),
    }
}
