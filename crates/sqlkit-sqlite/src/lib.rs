//! SQLite session layer for sqlkit.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate wraps libsqlite3 (bundled through `libsqlite3-sys`) in a small,
//! synchronous client API:
//!
//! - [`SqliteConnection`]: the session over one store
//! - [`Statement`]: a compiled, reusable template
//! - [`SqliteTransaction`] and [`TxStatement`]: explicit atomic scopes
//! - [`Rows`]: a lazy, forward-only cursor
//! - [`ExecResult`]: rows affected and last insert rowid
//!
//! # Example
//!
//! ```
//! use sqlkit_sqlite::{SqliteConnection, params};
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! conn.execute("create table foo(id int PRIMARY KEY, name string)", &[]).unwrap();
//!
//! let res = conn.execute("insert into foo values(?, ?)", &params![42, "meaning of life"]).unwrap();
//! assert_eq!(res.rows_affected().unwrap(), 1);
//!
//! let tx = conn.begin().unwrap();
//! let mut stmt = conn.prepare("insert into foo values(?, ?)").unwrap();
//! tx.stmt(&mut stmt).unwrap().execute(&params![999, "happening"]).unwrap();
//! tx.commit().unwrap();
//!
//! let (id, name): (i64, String) = conn
//!     .query_row("select id, name from foo where id = ?", &params![999])
//!     .unwrap()
//!     .scan()
//!     .unwrap();
//! assert_eq!((id, name.as_str()), (999, "happening"));
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i8`, `i16`, `i32`, `i64` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `String`, `&str` | TEXT |
//! | `Vec<u8>`, `&[u8]` | BLOB |
//! | `Option<T>` | NULL or T |
//! | `serde_json::Value` | TEXT |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is both `Send` and `Sync`, using internal mutex
//! synchronization to protect the underlying SQLite handle. Statements,
//! cursors and transactions borrow the connection and stay on the thread
//! that created them.

mod config;
mod connection;
mod error;
mod ffi;
mod result;
mod rows;
mod statement;
mod transaction;
mod types;

pub use config::{OpenFlags, SqliteConfig};
pub use connection::SqliteConnection;
pub use result::{ExecResult, StatementKind};
pub use rows::{MappedRows, Rows};
pub use statement::{Statement, TxStatement};
pub use transaction::{SqliteTransaction, TransactionBehavior};

pub use sqlkit_core::{Error, ErrorKind, FromRow, FromValue, Result, Row, Value, params};

/// The SQLite library version, e.g. "3.46.0".
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// The SQLite library version number, e.g. 3046000.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
