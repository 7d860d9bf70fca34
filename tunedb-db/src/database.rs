//! The [`Database`] handle: schema setup, per-thread connections and
//! fetching models.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::config::DbConfig;
use crate::error::Result;
use crate::functions;
use crate::kind::{Kind, TableSpec, ID_FIELD};
use crate::lock::WriteLock;
use crate::model::Model;
use crate::query::{MatchQuery, Query, TrueQuery};
use crate::results::Results;
use crate::schema;
use crate::sort::Sort;
use crate::sql;
use crate::transaction::{Transaction, TxState};

/// Busy timeout handed to SQLite when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest busy timeout SQLite accepts (`i32::MAX` milliseconds).
pub const MAX_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// Configures and opens a [`Database`].
#[derive(Debug)]
pub struct DatabaseBuilder {
    path: PathBuf,
    timeout: Duration,
    tables: Vec<TableSpec>,
}

impl DatabaseBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), timeout: DEFAULT_TIMEOUT, tables: Vec::new() }
    }

    /// Start from the path and busy timeout of a loaded configuration.
    pub fn from_config(config: &DbConfig) -> Self {
        Self::new(config.path.clone()).timeout(config.timeout_duration())
    }

    /// How long SQLite waits on a lock held by another process, at most
    /// [`MAX_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    /// Register an entity kind; its tables are created or extended on open.
    pub fn register<K: Kind>(mut self) -> Self {
        let spec = K::table_spec();
        if !self.tables.iter().any(|t| t.table == spec.table) {
            self.tables.push(spec);
        }
        self
    }

    pub fn open(self) -> Result<Database> {
        let db = Database {
            inner: Arc::new(Inner {
                path: self.path,
                timeout: self.timeout,
                connections: Mutex::new(HashMap::new()),
                tx_stacks: Mutex::new(HashMap::new()),
                write_lock: WriteLock::default(),
                revision: AtomicU64::new(0),
                tables: self.tables,
            }),
        };

        for spec in &db.inner.tables {
            schema::make_table(&db, spec)?;
            schema::make_attribute_table(&db, spec)?;
        }
        Ok(db)
    }
}

struct Inner {
    path: PathBuf,
    timeout: Duration,
    /// One connection per thread, opened lazily.
    connections: Mutex<HashMap<ThreadId, Arc<Mutex<Connection>>>>,
    /// Transaction nesting per thread.
    tx_stacks: Mutex<HashMap<ThreadId, TxState>>,
    /// Serializes every root transaction across all threads.
    write_lock: WriteLock,
    /// Bumped once per committed root transaction that wrote anything.
    revision: AtomicU64,
    tables: Vec<TableSpec>,
}

/// A library database backed by one SQLite file.
///
/// Cloning is cheap and yields a handle to the same database: the
/// connection cache, locks and revision counter are shared. Each
/// independently opened `Database` has its own.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn builder(path: impl Into<PathBuf>) -> DatabaseBuilder {
        DatabaseBuilder::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// The current revision. It advances once for every committed root
    /// transaction that executed a write.
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same opened database.
    pub fn same_as(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Enter a transaction frame on the calling thread. Entering a root
    /// frame blocks until no other thread has a transaction open.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Transaction::enter(self)
    }

    /// Close every cached connection of every thread. The database stays
    /// usable; connections are reopened on demand.
    pub fn close(&self) {
        let mut connections = self.inner.connections.lock();
        log::debug!("Closing {} connection(s) to {}", connections.len(), self.inner.path.display());
        connections.clear();
    }

    /// Fetch the models of kind `K` matching `query` (everything when
    /// `None`), ordered by `sort`.
    ///
    /// A sort that cannot be expressed in SQL is applied in memory when the
    /// results are first iterated, after every row has been materialized.
    pub fn fetch<K: Kind>(
        &self,
        query: Option<&dyn Query>,
        sort: Option<Box<dyn Sort>>,
    ) -> Result<Results<K>> {
        let query = query.unwrap_or(&TrueQuery);
        let (statement, params) = sql::compile_fetch::<K>(query, sort.as_deref());

        let tx = self.transaction()?;
        let rows = tx.query(&statement, &params)?;
        let revision = tx.commit_revision()?;

        let slow_sort = sort.filter(|s| s.is_slow());
        Ok(Results::new(self.clone(), rows, revision, slow_sort))
    }

    /// Fetch every model of kind `K`.
    pub fn all<K: Kind>(&self) -> Result<Results<K>> {
        self.fetch(None, None)
    }

    /// Fetch one model by id.
    pub fn get<K: Kind>(&self, id: i64) -> Result<Option<Model<K>>> {
        let query = MatchQuery::new(ID_FIELD, id);
        let results = self.fetch::<K>(Some(&query), None)?;
        Ok(results.into_models().into_iter().next())
    }

    /// Column names of a table, empty if the table does not exist.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        schema::table_columns(self, table)
    }

    // ── Connection and frame bookkeeping ────────────────────────────────────

    fn connection(&self) -> Result<Arc<Mutex<Connection>>> {
        let thread = thread::current().id();
        let mut connections = self.inner.connections.lock();
        if let Some(conn) = connections.get(&thread) {
            return Ok(Arc::clone(conn));
        }
        let conn = Arc::new(Mutex::new(self.create_connection()?));
        connections.insert(thread, Arc::clone(&conn));
        Ok(conn)
    }

    fn create_connection(&self) -> Result<Connection> {
        log::debug!(
            "Opening connection to {} for {:?}",
            self.inner.path.display(),
            thread::current().id()
        );
        let conn = Connection::open(&self.inner.path)?;
        conn.busy_timeout(self.inner.timeout)?;
        functions::register(&conn)?;
        Ok(conn)
    }

    /// Forget the calling thread's connection; its next frame opens a new one.
    pub(crate) fn discard_connection(&self) {
        self.inner.connections.lock().remove(&thread::current().id());
    }

    /// Push a frame on the calling thread's stack. Returns the connection
    /// the frame must use and whether it is the root frame.
    pub(crate) fn push_frame(&self) -> Result<(Arc<Mutex<Connection>>, bool)> {
        let thread = thread::current().id();
        {
            let mut stacks = self.inner.tx_stacks.lock();
            if let Some(state) = stacks.get_mut(&thread) {
                state.depth += 1;
                return Ok((Arc::clone(&state.conn), false));
            }
        }

        let conn = self.connection()?;
        self.inner.tx_stacks.lock().insert(
            thread,
            TxState { depth: 1, mutated: false, conn: Arc::clone(&conn) },
        );
        Ok((conn, true))
    }

    /// Pop a frame. Returns `Some(mutated)` when the stack became empty.
    pub(crate) fn pop_frame(&self) -> Option<bool> {
        let thread = thread::current().id();
        let mut stacks = self.inner.tx_stacks.lock();
        let state = stacks.get_mut(&thread)?;
        state.depth -= 1;
        if state.depth > 0 {
            return None;
        }
        stacks.remove(&thread).map(|state| state.mutated)
    }

    pub(crate) fn mark_mutated(&self) {
        let thread = thread::current().id();
        if let Some(state) = self.inner.tx_stacks.lock().get_mut(&thread) {
            state.mutated = true;
        }
    }

    pub(crate) fn bump_revision(&self) -> u64 {
        self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn write_lock(&self) -> &WriteLock {
        &self.inner.write_lock
    }
}
