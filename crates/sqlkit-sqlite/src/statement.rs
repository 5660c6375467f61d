//! Prepared statements.

#![allow(clippy::result_large_err)]
#![allow(clippy::borrow_as_ptr)]
#![allow(clippy::cast_possible_truncation)] // column indices come from a c_int count

use crate::connection::{Scope, SqliteConnection};
use crate::error::{self, state_error};
use crate::ffi;
use crate::result::{ExecResult, StatementKind};
use crate::rows::Rows;
use crate::transaction::SqliteTransaction;
use crate::types;
use sqlkit_core::error::{BindingError, BindingErrorKind, StateErrorKind};
use sqlkit_core::{ColumnInfo, Error, Result, Row, Value};
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::Arc;

/// A compiled SQLite statement.
///
/// Callers hold the connection lock around every method that touches the
/// engine. Dropping finalizes the handle.
#[derive(Debug)]
pub(crate) struct Compiled {
    raw: *mut ffi::sqlite3_stmt,
    sql: String,
    param_count: usize,
    columns: Arc<ColumnInfo>,
    kind: StatementKind,
}

impl Compiled {
    /// Compile exactly one statement.
    pub(crate) fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        if db.is_null() {
            return Err(error::code_error(ffi::SQLITE_ERROR, Some(sql)));
        }
        let c_sql =
            CString::new(sql).map_err(|_| error::syntax_error(sql, "SQL contains null byte"))?;

        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();

        // SAFETY: db is open, c_sql is NUL-terminated and the out-pointers are valid
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut raw, &mut tail) };
        if rc != ffi::SQLITE_OK {
            return Err(error::engine_error(db, Some(sql)));
        }
        if raw.is_null() {
            return Err(error::syntax_error(sql, "empty statement"));
        }

        // SAFETY: raw was just produced by a successful prepare
        let compiled = unsafe { Self::from_raw(raw, sql) };

        // SAFETY: tail points into c_sql, which is still alive
        if unsafe { has_trailing_statement(db, tail) } {
            return Err(error::syntax_error(
                sql,
                "multiple statements are not supported here; use execute_batch",
            ));
        }

        tracing::trace!(
            sql,
            kind = %compiled.kind,
            params = compiled.param_count,
            columns = compiled.columns.len(),
            "prepared statement"
        );
        Ok(compiled)
    }

    unsafe fn from_raw(raw: *mut ffi::sqlite3_stmt, sql: &str) -> Self {
        // SAFETY: raw is a valid prepared statement
        let (param_count, column_count, readonly) = unsafe {
            (
                ffi::sqlite3_bind_parameter_count(raw),
                ffi::sqlite3_column_count(raw),
                ffi::sqlite3_stmt_readonly(raw) != 0,
            )
        };

        let names = (0..column_count)
            .map(|i| {
                // SAFETY: i is below the column count
                unsafe { types::column_name(raw, i) }.unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        Self {
            raw,
            sql: sql.to_string(),
            param_count: usize::try_from(param_count).unwrap_or(0),
            columns: Arc::new(ColumnInfo::new(names)),
            kind: StatementKind::classify(sql, readonly),
        }
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn kind(&self) -> StatementKind {
        self.kind
    }

    pub(crate) fn columns(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Reset the statement and bind `params` left to right.
    pub(crate) fn bind(&mut self, params: &[Value]) -> Result<()> {
        self.reset();

        if params.len() != self.param_count {
            return Err(Error::Binding(BindingError {
                kind: BindingErrorKind::ParameterCount,
                expected: self.param_count,
                actual: params.len(),
                sql: Some(self.sql.clone()),
            }));
        }

        for (i, param) in params.iter().enumerate() {
            let index = (i + 1) as c_int;
            // SAFETY: raw is valid, index is 1-based and within param_count
            let rc = unsafe { types::bind_value(self.raw, index, param) };
            if rc != ffi::SQLITE_OK {
                let err = self.engine_error_or(rc);
                tracing::trace!(sql = %self.sql, index, "bind failed");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Advance one step. `Ok(true)` means a row is available.
    ///
    /// On failure the statement is reset before the error is returned.
    pub(crate) fn step(&mut self) -> Result<bool> {
        // SAFETY: raw is valid until finalize
        let rc = unsafe { ffi::sqlite3_step(self.raw) };
        match rc {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            _ => {
                let err = self.engine_error_or(rc);
                tracing::trace!(sql = %self.sql, rc, "step failed");
                self.reset();
                Err(err)
            }
        }
    }

    /// Copy the current row out of the engine.
    pub(crate) fn read_row(&self) -> Row {
        let values = (0..self.columns.len())
            .map(|i| {
                // SAFETY: the last step returned SQLITE_ROW and i is in range
                unsafe { types::read_column(self.raw, i as c_int) }
            })
            .collect();
        Row::with_columns(Arc::clone(&self.columns), values)
    }

    /// Rewind and drop all bindings so the statement can be reused.
    pub(crate) fn reset(&mut self) {
        // SAFETY: raw is valid until finalize. The codes returned here repeat
        // the last step's result, which has already been reported.
        unsafe {
            ffi::sqlite3_reset(self.raw);
            ffi::sqlite3_clear_bindings(self.raw);
        }
    }

    /// Release the engine handle, returning its result code.
    pub(crate) fn finalize(mut self) -> c_int {
        let raw = std::mem::replace(&mut self.raw, ptr::null_mut());
        // SAFETY: raw came from prepare and is finalized exactly once
        unsafe { ffi::sqlite3_finalize(raw) }
    }

    fn engine_error_or(&self, rc: c_int) -> Error {
        // SAFETY: raw is valid; the handle it reports is the owning connection
        let db = unsafe { ffi::sqlite3_db_handle(self.raw) };
        if db.is_null() {
            error::code_error(rc, Some(&self.sql))
        } else {
            error::engine_error(db, Some(&self.sql))
        }
    }
}

impl Drop for Compiled {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: raw came from prepare and has not been finalized
            unsafe { ffi::sqlite3_finalize(self.raw) };
        }
    }
}

/// Does anything other than whitespace and comments follow the first
/// statement?
///
/// # Safety
/// `tail` must be null or point into a live NUL-terminated string.
unsafe fn has_trailing_statement(db: *mut ffi::sqlite3, tail: *const c_char) -> bool {
    if tail.is_null() {
        return false;
    }
    // SAFETY: upheld by the caller
    let rest = unsafe { CStr::from_ptr(tail) }.to_bytes();
    if rest.iter().all(u8::is_ascii_whitespace) {
        return false;
    }

    let mut extra: *mut ffi::sqlite3_stmt = ptr::null_mut();
    // SAFETY: db is open and tail is NUL-terminated
    let rc = unsafe { ffi::sqlite3_prepare_v2(db, tail, -1, &mut extra, ptr::null_mut()) };
    if !extra.is_null() {
        // SAFETY: extra was just prepared and is not used again
        unsafe { ffi::sqlite3_finalize(extra) };
    }
    rc != ffi::SQLITE_OK || !extra.is_null()
}

/// A reusable compiled statement bound to a session.
///
/// Executing it directly runs in the session's implicit scope. To run it
/// inside a transaction, bind it with [`SqliteTransaction::stmt`].
pub struct Statement<'conn> {
    conn: &'conn SqliteConnection,
    compiled: Option<Compiled>,
    sql: String,
    param_count: usize,
    columns: Arc<ColumnInfo>,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn new(conn: &'conn SqliteConnection, compiled: Compiled) -> Self {
        Self {
            conn,
            sql: compiled.sql.clone(),
            param_count: compiled.param_count,
            columns: compiled.columns(),
            compiled: Some(compiled),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of positional parameter slots.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    pub fn is_closed(&self) -> bool {
        self.compiled.is_none()
    }

    pub(crate) fn connection(&self) -> &'conn SqliteConnection {
        self.conn
    }

    pub(crate) fn compiled_mut(&mut self) -> Result<&mut Compiled> {
        let sql = &self.sql;
        self.compiled.as_mut().ok_or_else(|| {
            state_error(
                StateErrorKind::StatementClosed,
                format!("statement is closed: {}", sql),
            )
        })
    }

    /// Execute with `params` bound left to right.
    pub fn execute(&mut self, params: &[Value]) -> Result<ExecResult> {
        let conn = self.conn;
        conn.execute_prepared(Scope::Implicit, self.compiled_mut()?, params)
    }

    /// Run as a query. The cursor borrows the statement until dropped.
    pub fn query(&mut self, params: &[Value]) -> Result<Rows<'_>> {
        let conn = self.conn;
        conn.query_prepared(Scope::Implicit, self.compiled_mut()?, params)
    }

    /// First row of the result, or [`Error::NoRows`].
    pub fn query_row(&mut self, params: &[Value]) -> Result<Row> {
        self.query(params)?.first_row()
    }

    /// Finalize the compiled statement. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(compiled) = self.compiled.take() {
            let _inner = self.conn.lock();
            let rc = compiled.finalize();
            if rc != ffi::SQLITE_OK {
                return Err(error::code_error(rc, Some(&self.sql)));
            }
            tracing::trace!(sql = %self.sql, "closed statement");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("param_count", &self.param_count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if let Some(compiled) = self.compiled.take() {
            let _inner = self.conn.lock();
            let rc = compiled.finalize();
            if rc != ffi::SQLITE_OK {
                tracing::warn!(sql = %self.sql, rc, "finalizing dropped statement failed");
            }
        }
    }
}

/// A prepared statement bound to a transaction.
///
/// Created by [`SqliteTransaction::stmt`]. It reuses the statement's compiled
/// form and runs every execution in the transaction's scope. The borrow ends
/// when this value is dropped, after which the statement is usable on its own
/// again.
#[derive(Debug)]
pub struct TxStatement<'tx> {
    tx: &'tx SqliteTransaction<'tx>,
    compiled: &'tx mut Compiled,
}

impl<'tx> TxStatement<'tx> {
    pub(crate) fn new(tx: &'tx SqliteTransaction<'tx>, compiled: &'tx mut Compiled) -> Self {
        Self { tx, compiled }
    }

    pub fn sql(&self) -> &str {
        self.compiled.sql()
    }

    pub fn execute(&mut self, params: &[Value]) -> Result<ExecResult> {
        self.tx
            .connection()
            .execute_prepared(self.tx.scope(), self.compiled, params)
    }

    pub fn query(&mut self, params: &[Value]) -> Result<Rows<'_>> {
        self.tx
            .connection()
            .query_prepared(self.tx.scope(), self.compiled, params)
    }

    pub fn query_row(&mut self, params: &[Value]) -> Result<Row> {
        self.query(params)?.first_row()
    }
}
