//! The sqlkit walkthrough.
//!
//! [`run`] drives one session through the whole client surface: implicit
//! execution, a rejected duplicate key, parameterized and prepared inserts,
//! a rolled-back and a committed transaction, and two ways of reading rows.
//! Every step logs through `tracing`; the returned [`DemoReport`] records
//! what was observed so callers (and tests) can check it.

#![allow(clippy::result_large_err)]

use sqlkit_core::{Error, Result};
use sqlkit_sqlite::{ExecResult, SqliteConnection, params};

const CREATE_FOO: &str = "create table foo(id int PRIMARY KEY, name string)";
const INSERT_FOO: &str = "insert into foo values(?, ?)";
const SELECT_FOO: &str = "select * from foo";

/// What the walkthrough observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    /// Rows affected by the first literal insert.
    pub inserted: u64,
    /// Rows affected by the `UPDATE`.
    pub updated: u64,
    /// Rows affected by the insert run inside the committed transaction.
    pub committed: u64,
    /// The first row returned by the prepared `select`.
    pub first_row: (i64, String),
    /// Every row of `foo`, in cursor order.
    pub rows: Vec<(i64, String)>,
}

/// Format a rows-affected progress line.
///
/// Statements that do not report a count render the count as 0 followed by
/// the reason.
pub fn rows_affected_line(label: &str, res: &ExecResult) -> String {
    match res.rows_affected() {
        Ok(n) => format!("{label} : rows affected: {n} <nil>"),
        Err(e) => format!("{label} : rows affected: 0 {e}"),
    }
}

fn log_rows_affected(label: &str, res: &ExecResult) {
    tracing::info!("{}", rows_affected_line(label, res));
}

/// Run the walkthrough on an open session whose store has no `foo` table.
pub fn run(conn: &SqliteConnection) -> Result<DemoReport> {
    conn.execute(CREATE_FOO, &[])?;

    let res = conn.execute("insert into foo values(42, 'meaning of life')", &[])?;
    log_rows_affected("After insert on db", &res);
    let inserted = res.rows_affected()?;

    match conn.execute("insert into foo values(42, 'meaning of life')", &[]) {
        Err(e) if e.is_constraint_violation() => {
            tracing::debug!(error = %e, "duplicate key rejected");
        }
        Err(e) => return Err(e),
        Ok(_) => {
            return Err(Error::Custom(
                "expected an error from the primary key conflict insert but got none".into(),
            ));
        }
    }

    conn.execute("insert into foo values(43, 'meaning of life')", &[])?;

    let res = conn.execute("UPDATE foo SET name='mol' WHERE name='meaning of life'", &[])?;
    log_rows_affected("After updating 2 rows", &res);
    let updated = res.rows_affected()?;

    conn.execute(INSERT_FOO, &params![31337, "so leet"])?;

    {
        let mut stmt = conn.prepare(INSERT_FOO)?;
        let res = stmt.execute(&params![12_345_678, "monotonic"])?;
        log_rows_affected("After insert on stmt", &res);
    }

    let tx = conn.begin()?;
    let mut stmt = conn.prepare(INSERT_FOO)?;
    tx.stmt(&mut stmt)?.execute(&params![666, "not happening"])?;
    tx.rollback()?;
    drop(stmt);

    let tx = conn.begin()?;
    let mut stmt = conn.prepare(INSERT_FOO)?;
    let res = tx.stmt(&mut stmt)?.execute(&params![999, "happening"])?;
    log_rows_affected("After insert on stmt in txn", &res);
    tx.commit()?;
    drop(stmt);
    let committed = res.rows_affected()?;

    let mut stmt = conn.prepare(SELECT_FOO)?;
    let first_row: (i64, String) = stmt.query_row(&[])?.scan()?;
    tracing::info!("Got first row: {}, {}", first_row.0, first_row.1);
    stmt.close()?;

    let mut rows = conn.query(SELECT_FOO, &[])?;
    let mut seen = Vec::new();
    while rows.next()? {
        let (id, name): (i64, String) = rows.scan()?;
        tracing::info!("Got row: {}, {}", id, name);
        seen.push((id, name));
    }
    rows.close()?;

    Ok(DemoReport {
        inserted,
        updated,
        committed,
        first_row,
        rows: seen,
    })
}
