//! Explicit transactions.

#![allow(clippy::result_large_err)]

use crate::connection::{Scope, SqliteConnection};
use crate::error::transaction_error;
use crate::result::ExecResult;
use crate::rows::Rows;
use crate::statement::{Statement, TxStatement};
use sqlkit_core::error::TransactionErrorKind;
use sqlkit_core::{Result, Row, Value};
use std::ptr;

/// Locking behavior of `BEGIN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionBehavior {
    /// Locks are taken on first read or write.
    #[default]
    Deferred,
    /// A write lock is taken immediately.
    Immediate,
    /// An exclusive lock is taken immediately.
    Exclusive,
}

impl TransactionBehavior {
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// A SQLite transaction.
///
/// [`commit`](Self::commit) and [`rollback`](Self::rollback) consume the
/// transaction. Dropping it while still open rolls it back.
///
/// A finished transaction cannot be finished again:
///
/// ```compile_fail
/// use sqlkit_sqlite::SqliteConnection;
///
/// let conn = SqliteConnection::open_memory().unwrap();
/// let tx = conn.begin().unwrap();
/// tx.commit().unwrap();
/// tx.rollback().unwrap();
/// ```
///
/// and statements bound to it cannot outlive it:
///
/// ```compile_fail
/// use sqlkit_sqlite::{SqliteConnection, params};
///
/// let conn = SqliteConnection::open_memory().unwrap();
/// conn.execute("create table foo(id int PRIMARY KEY, name string)", &[]).unwrap();
/// let mut stmt = conn.prepare("insert into foo values(?, ?)").unwrap();
///
/// let tx = conn.begin().unwrap();
/// let mut bound = tx.stmt(&mut stmt).unwrap();
/// tx.commit().unwrap();
/// bound.execute(&params![999, "happening"]).unwrap();
/// ```
///
/// If the engine ends the transaction on its own (a trigger raising
/// `ROLLBACK`, a full disk), later calls through it fail with a
/// [`StateError`](sqlkit_core::ErrorKind::StateError).
#[derive(Debug)]
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    id: u64,
    finished: bool,
}

impl<'conn> SqliteTransaction<'conn> {
    pub(crate) fn new(conn: &'conn SqliteConnection, id: u64) -> Self {
        Self {
            conn,
            id,
            finished: false,
        }
    }

    /// Session-unique id of this transaction.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn scope(&self) -> Scope {
        Scope::Transaction(self.id)
    }

    pub(crate) fn connection(&self) -> &'conn SqliteConnection {
        self.conn
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.conn.execute_scoped(self.scope(), sql, params)
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Rows<'_>> {
        self.conn.query_scoped(self.scope(), sql, params)
    }

    pub fn query_row(&self, sql: &str, params: &[Value]) -> Result<Row> {
        self.query(sql, params)?.first_row()
    }

    /// Bind a session statement to this transaction without recompiling it.
    ///
    /// The statement must come from the same session and must not be closed.
    pub fn stmt<'tx>(&'tx self, stmt: &'tx mut Statement<'_>) -> Result<TxStatement<'tx>> {
        if !ptr::eq(stmt.connection(), self.conn) {
            return Err(transaction_error(
                TransactionErrorKind::ForeignStatement,
                format!(
                    "statement '{}' was prepared on a different session",
                    stmt.sql()
                ),
            ));
        }
        let compiled = stmt.compiled_mut()?;
        Ok(TxStatement::new(self, compiled))
    }

    /// Make the transaction's changes durable.
    ///
    /// If the commit fails the transaction is rolled back.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.commit_transaction(self.id)
    }

    /// Discard the transaction's changes.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.rollback_transaction(self.id)
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(tx = self.id, "transaction dropped while open, rolling back");
            if let Err(e) = self.conn.rollback_transaction(self.id) {
                tracing::warn!(tx = self.id, error = %e, "rollback of dropped transaction failed");
            }
        }
    }
}
