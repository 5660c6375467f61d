//! SQLite connection implementation.
//!
//! A [`SqliteConnection`] is the session: one engine handle guarded by a
//! mutex. Every execution path goes through [`SqliteInner::check_scope`], so
//! direct session calls and transaction-bound calls share one set of rules.

#![allow(clippy::result_large_err)] // Error type is defined in sqlkit-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::config::SqliteConfig;
use crate::error::{self, connection_error, transaction_error};
use crate::ffi;
use crate::result::{ExecResult, StatementKind};
use crate::rows::{Rows, Source};
use crate::statement::{Compiled, Statement};
use crate::transaction::{SqliteTransaction, TransactionBehavior};
use sqlkit_core::error::{ConnectionErrorKind, TransactionErrorKind};
use sqlkit_core::{Result, Row, Value};
use std::ffi::CString;
use std::fmt;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Which atomic unit an execution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Autocommit: the statement is its own transaction.
    Implicit,
    /// Inside the explicit transaction with this id.
    Transaction(u64),
}

/// Inner state of the SQLite connection, protected by a mutex.
pub(crate) struct SqliteInner {
    pub(crate) db: *mut ffi::sqlite3,
    active_tx: Option<u64>,
    next_tx_id: u64,
}

// SAFETY: the handle is only touched while the owning Mutex is held.
unsafe impl Send for SqliteInner {}

impl SqliteInner {
    /// Reject executions whose scope is not the session's current one.
    pub(crate) fn check_scope(&self, scope: Scope) -> Result<()> {
        match (scope, self.active_tx) {
            (Scope::Implicit, None) => Ok(()),
            (Scope::Implicit, Some(id)) => Err(transaction_error(
                TransactionErrorKind::SessionBusy,
                format!(
                    "transaction {} is open on this session; execute through it or finish it first",
                    id
                ),
            )),
            (Scope::Transaction(id), Some(active)) if id == active => {
                if self.is_autocommit() {
                    Err(transaction_error(
                        TransactionErrorKind::NotActive,
                        format!("transaction {} was rolled back by the engine", id),
                    ))
                } else {
                    Ok(())
                }
            }
            (Scope::Transaction(id), _) => Err(transaction_error(
                TransactionErrorKind::NotActive,
                format!("transaction {} is no longer active", id),
            )),
        }
    }

    pub(crate) fn is_autocommit(&self) -> bool {
        // SAFETY: db is open for as long as the inner state is reachable
        !self.db.is_null() && unsafe { ffi::sqlite3_get_autocommit(self.db) } != 0
    }

    /// Run a parameterless script through `sqlite3_exec`.
    pub(crate) fn exec_batch(&self, sql: &str) -> Result<()> {
        let c_sql =
            CString::new(sql).map_err(|_| error::syntax_error(sql, "SQL contains null byte"))?;

        // SAFETY: db is open and c_sql is NUL-terminated; no callback is used
        let rc = unsafe {
            ffi::sqlite3_exec(
                self.db,
                c_sql.as_ptr(),
                None,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(error::engine_error(self.db, Some(sql)));
        }
        Ok(())
    }

    /// Bind, step to completion and collect the change count.
    pub(crate) fn execute_compiled(
        &self,
        compiled: &mut Compiled,
        params: &[Value],
    ) -> Result<ExecResult> {
        let kind = compiled.kind();
        if kind == StatementKind::Transaction {
            return Err(transaction_error(
                TransactionErrorKind::ManualControl,
                format!(
                    "'{}' controls transactions; use begin/commit/rollback",
                    compiled.sql()
                ),
            ));
        }

        let start = Instant::now();
        compiled.bind(params)?;
        while compiled.step()? {}
        compiled.reset();

        // SAFETY: db is open
        let (changes, last_insert_rowid) = unsafe {
            (
                ffi::sqlite3_changes(self.db),
                ffi::sqlite3_last_insert_rowid(self.db),
            )
        };
        let rows_affected = kind
            .reports_changes()
            .then(|| u64::try_from(changes).unwrap_or(0));

        tracing::debug!(
            sql = compiled.sql(),
            kind = %kind,
            rows_affected,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "executed statement"
        );

        Ok(ExecResult::new(kind, rows_affected, last_insert_rowid))
    }
}

/// A connection to a SQLite database.
///
/// The connection is `Send + Sync` and serializes access internally. It is
/// also the implicit transaction scope: each direct [`execute`] or
/// [`query`] call commits on its own. While a [`SqliteTransaction`] is open,
/// direct calls are refused until the transaction finishes.
///
/// [`execute`]: SqliteConnection::execute
/// [`query`]: SqliteConnection::query
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    #[tracing::instrument(level = "debug", skip(config), fields(path = %config.path))]
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            connection_error(
                ConnectionErrorKind::InvalidPath,
                "invalid path: contains null byte",
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                let msg = ffi::errmsg(db);
                // SAFETY: the failed handle must still be released
                unsafe { ffi::sqlite3_close(db) };
                msg
            };

            return Err(connection_error(
                ConnectionErrorKind::Open,
                format!("failed to open database '{}': {}", config.path, msg),
            ));
        }

        if !config.busy_timeout.is_zero() {
            // SAFETY: db is valid
            unsafe { ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms()) };
        }

        tracing::debug!(path = %config.path, flags, "opened store");

        Ok(Self {
            inner: Mutex::new(SqliteInner {
                db,
                active_tx: None,
                next_tx_id: 1,
            }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database, creating it if it does not exist.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute one statement in its own implicit transaction.
    ///
    /// Trailing SQL after the first statement is rejected; use
    /// [`execute_batch`](Self::execute_batch) for scripts.
    #[tracing::instrument(level = "trace", skip(self, params))]
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.execute_scoped(Scope::Implicit, sql, params)
    }

    /// Execute a parameterless script of one or more statements.
    ///
    /// Unlike [`execute`](Self::execute) this does not inspect the
    /// statements, so it is the way to run `PRAGMA` setup or multi-statement
    /// DDL.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        inner.check_scope(Scope::Implicit)?;
        inner.exec_batch(sql)?;
        tracing::debug!(sql, "executed batch");
        Ok(())
    }

    /// Run a query and return a cursor over its rows.
    #[tracing::instrument(level = "trace", skip(self, params))]
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Rows<'_>> {
        self.query_scoped(Scope::Implicit, sql, params)
    }

    /// Run a query and return its first row, or [`Error::NoRows`].
    ///
    /// [`Error::NoRows`]: sqlkit_core::Error::NoRows
    pub fn query_row(&self, sql: &str, params: &[Value]) -> Result<Row> {
        self.query(sql, params)?.first_row()
    }

    /// Compile a reusable statement.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        let compiled = {
            let inner = self.lock();
            Compiled::prepare(inner.db, sql)?
        };
        Ok(Statement::new(self, compiled))
    }

    /// Begin a deferred transaction.
    pub fn begin(&self) -> Result<SqliteTransaction<'_>> {
        self.begin_with(TransactionBehavior::default())
    }

    /// Begin a transaction with explicit locking behavior.
    ///
    /// Only one transaction may be open at a time; nesting is refused.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn begin_with(&self, behavior: TransactionBehavior) -> Result<SqliteTransaction<'_>> {
        let mut inner = self.lock();
        if let Some(active) = inner.active_tx {
            return Err(transaction_error(
                TransactionErrorKind::NestedNotSupported,
                format!("transaction {} is already open; nesting is not supported", active),
            ));
        }
        if !inner.is_autocommit() {
            return Err(transaction_error(
                TransactionErrorKind::NestedNotSupported,
                "a transaction started outside begin() is already open",
            ));
        }

        inner.exec_batch(behavior.begin_sql())?;

        let id = inner.next_tx_id;
        inner.next_tx_id += 1;
        inner.active_tx = Some(id);
        tracing::debug!(tx = id, ?behavior, "began transaction");

        Ok(SqliteTransaction::new(self, id))
    }

    /// Rowid of the most recent successful insert.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Number of rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> u64 {
        let inner = self.lock();
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(inner.db) };
        u64::try_from(changes).unwrap_or(0)
    }

    /// Is the engine outside any transaction?
    pub fn is_autocommit(&self) -> bool {
        self.lock().is_autocommit()
    }

    /// Is a transaction from [`begin`](Self::begin) currently open?
    pub fn in_transaction(&self) -> bool {
        self.lock().active_tx.is_some()
    }

    /// Close the store, reporting any error from the engine.
    ///
    /// Dropping the connection also closes it, but silently.
    pub fn close(self) -> Result<()> {
        let db = {
            let mut inner = self.lock();
            std::mem::replace(&mut inner.db, ptr::null_mut())
        };
        if db.is_null() {
            return Ok(());
        }

        // SAFETY: db is open, and no statement can outlive the borrow of self
        let rc = unsafe { ffi::sqlite3_close(db) };
        if rc != ffi::SQLITE_OK {
            let msg = ffi::errmsg(db);
            // SAFETY: hand the handle to the engine to release once it can
            unsafe { ffi::sqlite3_close_v2(db) };
            return Err(connection_error(
                ConnectionErrorKind::Close,
                format!("failed to close database '{}': {}", self.path, msg),
            ));
        }

        tracing::debug!(path = %self.path, "closed store");
        Ok(())
    }

    pub(crate) fn execute_scoped(
        &self,
        scope: Scope,
        sql: &str,
        params: &[Value],
    ) -> Result<ExecResult> {
        let inner = self.lock();
        inner.check_scope(scope)?;
        let mut compiled = Compiled::prepare(inner.db, sql)?;
        inner.execute_compiled(&mut compiled, params)
    }

    pub(crate) fn execute_prepared(
        &self,
        scope: Scope,
        compiled: &mut Compiled,
        params: &[Value],
    ) -> Result<ExecResult> {
        let inner = self.lock();
        inner.check_scope(scope)?;
        inner.execute_compiled(compiled, params)
    }

    pub(crate) fn query_scoped(
        &self,
        scope: Scope,
        sql: &str,
        params: &[Value],
    ) -> Result<Rows<'_>> {
        let compiled = {
            let inner = self.lock();
            inner.check_scope(scope)?;
            let mut compiled = Compiled::prepare(inner.db, sql)?;
            compiled.bind(params)?;
            compiled
        };
        Ok(Rows::new(self, scope, Source::Owned(compiled)))
    }

    pub(crate) fn query_prepared<'a>(
        &'a self,
        scope: Scope,
        compiled: &'a mut Compiled,
        params: &[Value],
    ) -> Result<Rows<'a>> {
        {
            let inner = self.lock();
            inner.check_scope(scope)?;
            compiled.bind(params)?;
        }
        Ok(Rows::new(self, scope, Source::Borrowed(compiled)))
    }

    pub(crate) fn commit_transaction(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        if let Err(e) = inner.check_scope(Scope::Transaction(id)) {
            if inner.active_tx == Some(id) {
                inner.active_tx = None;
            }
            return Err(e);
        }

        let result = inner.exec_batch("COMMIT");
        if let Err(e) = &result {
            tracing::debug!(tx = id, error = %e, "commit failed, rolling back");
            if !inner.is_autocommit() {
                if let Err(rollback) = inner.exec_batch("ROLLBACK") {
                    tracing::warn!(tx = id, error = %rollback, "rollback after failed commit also failed");
                }
            }
        } else {
            tracing::debug!(tx = id, "committed transaction");
        }
        inner.active_tx = None;
        result
    }

    pub(crate) fn rollback_transaction(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        if inner.active_tx != Some(id) {
            return Err(transaction_error(
                TransactionErrorKind::NotActive,
                format!("transaction {} is no longer active", id),
            ));
        }

        // The engine may already have rolled back on its own (e.g. SQLITE_FULL)
        let result = if inner.is_autocommit() {
            Ok(())
        } else {
            inner.exec_batch("ROLLBACK")
        };
        inner.active_tx = None;
        tracing::debug!(tx = id, ok = result.is_ok(), "rolled back transaction");
        result
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("open", &!inner.db.is_null())
            .field("active_tx", &inner.active_tx)
            .finish()
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !inner.db.is_null() {
            // SAFETY: db is valid and nothing borrows the connection anymore
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
            inner.db = ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlkit_core::ErrorKind;
    use sqlkit_core::error::QueryErrorKind;
    use sqlkit_core::{Error, params};

    fn foo_conn() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
            .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(conn.is_autocommit());
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_open_rejects_nul_path() {
        let err = SqliteConnection::open_file("bad\0path").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OpenFailure);
    }

    #[test]
    fn test_execute_batch() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO test (name) VALUES ('Alice');",
        )
        .unwrap();
        assert_eq!(conn.changes(), 1);
        assert_eq!(conn.last_insert_rowid(), 1);
    }

    #[test]
    fn test_execute_reports_changes() {
        let conn = foo_conn();
        let res = conn
            .execute("insert into foo values(?, ?)", &params![42, "meaning of life"])
            .unwrap();
        assert_eq!(res.kind(), StatementKind::Insert);
        assert_eq!(res.rows_affected().unwrap(), 1);
        assert_eq!(res.last_insert_rowid(), conn.last_insert_rowid());
    }

    #[test]
    fn test_execute_rejects_trailing_statements() {
        let conn = foo_conn();
        let err = conn
            .execute("insert into foo values(1, 'a'); insert into foo values(2, 'b')", &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);

        let count: (i64,) = conn.query_row("select count(*) from foo", &[]).unwrap().scan().unwrap();
        assert_eq!(count, (0,));
    }

    #[test]
    fn test_execute_allows_trailing_semicolon_and_comment() {
        let conn = foo_conn();
        conn.execute("insert into foo values(1, 'a'); -- seed", &[])
            .unwrap();
    }

    #[test]
    fn test_empty_statement_is_syntax_error() {
        let conn = SqliteConnection::open_memory().unwrap();
        let err = conn.execute("   ", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn test_missing_table_is_not_found() {
        let conn = SqliteConnection::open_memory().unwrap();
        match conn.execute("insert into nope values(1)", &[]) {
            Err(Error::Query(q)) => assert_eq!(q.kind, QueryErrorKind::NotFound),
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn test_manual_transaction_control_rejected() {
        let conn = SqliteConnection::open_memory().unwrap();
        let err = conn.execute("BEGIN", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateError);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_begin_refuses_outside_transaction() {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch("BEGIN").unwrap();
        let err = conn.begin().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateError);
        conn.execute_batch("ROLLBACK").unwrap();
        conn.begin().unwrap().rollback().unwrap();
    }

    #[test]
    fn test_session_busy_while_transaction_open() {
        let conn = foo_conn();
        let tx = conn.begin().unwrap();
        assert!(conn.in_transaction());

        let err = conn.execute("insert into foo values(1, 'a')", &[]).unwrap_err();
        match err {
            Error::Transaction(t) => assert_eq!(t.kind, TransactionErrorKind::SessionBusy),
            other => panic!("expected transaction error, got {other:?}"),
        }
        assert!(conn.query("select * from foo", &[]).is_err());
        assert!(conn.execute_batch("select 1").is_err());

        tx.rollback().unwrap();
        assert!(!conn.in_transaction());
        conn.execute("insert into foo values(1, 'a')", &[]).unwrap();
    }

    #[test]
    fn test_close_reports_ok() {
        let conn = foo_conn();
        conn.close().unwrap();
    }

    #[test]
    fn test_debug_output() {
        let conn = SqliteConnection::open_memory().unwrap();
        let debug = format!("{conn:?}");
        assert!(debug.contains(":memory:"));
        assert!(debug.contains("open: true"));
    }
}
