//! Forward-only row cursor.

#![allow(clippy::result_large_err)]

use crate::connection::{Scope, SqliteConnection};
use crate::error::{self, state_error};
use crate::ffi;
use crate::statement::Compiled;
use sqlkit_core::error::StateErrorKind;
use sqlkit_core::{ColumnInfo, Error, FromRow, Result, Row};
use std::marker::PhantomData;
use std::sync::Arc;

/// Where the cursor's compiled statement lives.
#[derive(Debug)]
pub(crate) enum Source<'a> {
    /// Compiled for this query alone; finalized on release.
    Owned(Compiled),
    /// Borrowed from a prepared statement; reset on release.
    Borrowed(&'a mut Compiled),
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Fresh,
    OnRow,
    Exhausted,
    Closed,
}

/// A lazy, forward-only cursor over query results.
///
/// ```
/// use sqlkit_sqlite::SqliteConnection;
///
/// let conn = SqliteConnection::open_memory().unwrap();
/// let mut rows = conn.query("select 1, 'one' union all select 2, 'two'", &[]).unwrap();
/// while rows.next().unwrap() {
///     let (id, name): (i64, String) = rows.scan().unwrap();
///     println!("{id}: {name}");
/// }
/// ```
///
/// The engine-side statement is released as soon as the cursor is exhausted,
/// fails, is closed, or is dropped, whichever comes first.
#[derive(Debug)]
pub struct Rows<'a> {
    conn: &'a SqliteConnection,
    scope: Scope,
    source: Source<'a>,
    columns: Arc<ColumnInfo>,
    state: CursorState,
    current: Option<Row>,
}

impl<'a> Rows<'a> {
    pub(crate) fn new(conn: &'a SqliteConnection, scope: Scope, source: Source<'a>) -> Self {
        let columns = match &source {
            Source::Owned(compiled) => compiled.columns(),
            Source::Borrowed(compiled) => compiled.columns(),
            Source::Released => Arc::new(ColumnInfo::default()),
        };
        Self {
            conn,
            scope,
            source,
            columns,
            state: CursorState::Fresh,
            current: None,
        }
    }

    /// Advance to the next row.
    ///
    /// Returns `Ok(false)` once the rows are exhausted, and keeps doing so on
    /// later calls. An engine error closes the cursor.
    pub fn next(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Exhausted => return Ok(false),
            CursorState::Closed => return Err(closed()),
            CursorState::Fresh | CursorState::OnRow => {}
        }

        let stepped = {
            let inner = self.conn.lock();
            inner.check_scope(self.scope)?;
            let compiled = match &mut self.source {
                Source::Owned(compiled) => compiled,
                Source::Borrowed(compiled) => &mut **compiled,
                Source::Released => return Err(closed()),
            };
            compiled
                .step()
                .map(|has_row| has_row.then(|| compiled.read_row()))
        };

        match stepped {
            Ok(Some(row)) => {
                self.current = Some(row);
                self.state = CursorState::OnRow;
                Ok(true)
            }
            Ok(None) => {
                self.current = None;
                self.state = CursorState::Exhausted;
                self.release_logged();
                Ok(false)
            }
            Err(e) => {
                self.current = None;
                self.state = CursorState::Closed;
                self.release_logged();
                Err(e)
            }
        }
    }

    /// Decode the current row positionally into `T`.
    pub fn scan<T: FromRow>(&self) -> Result<T> {
        match self.state {
            CursorState::Fresh => Err(state_error(
                StateErrorKind::CursorNotStarted,
                "scan called before next",
            )),
            CursorState::OnRow => self.current.as_ref().ok_or(Error::NoRows)?.scan(),
            CursorState::Exhausted => Err(Error::NoRows),
            CursorState::Closed => Err(closed()),
        }
    }

    /// The current row, if the cursor is positioned on one.
    pub fn row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    /// Release the cursor. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.current = None;
        self.state = CursorState::Closed;
        self.release()
    }

    /// Turn the cursor into an iterator of decoded rows.
    pub fn mapped<T: FromRow>(self) -> MappedRows<'a, T> {
        MappedRows {
            rows: self,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Take the first row and release the rest.
    pub(crate) fn first_row(mut self) -> Result<Row> {
        if self.next()? {
            self.current.take().ok_or(Error::NoRows)
        } else {
            Err(Error::NoRows)
        }
    }

    fn release(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.source, Source::Released) {
            Source::Owned(compiled) => {
                let sql = compiled.sql().to_string();
                let _inner = self.conn.lock();
                let rc = compiled.finalize();
                if rc != ffi::SQLITE_OK {
                    return Err(error::code_error(rc, Some(&sql)));
                }
            }
            Source::Borrowed(compiled) => {
                let _inner = self.conn.lock();
                compiled.reset();
            }
            Source::Released => {}
        }
        Ok(())
    }

    fn release_logged(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "releasing cursor failed");
        }
    }
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        self.release_logged();
    }
}

fn closed() -> Error {
    state_error(StateErrorKind::CursorClosed, "cursor is closed")
}

/// Iterator adapter returned by [`Rows::mapped`].
///
/// Yields one decoded row per step and stops after the first error.
#[derive(Debug)]
pub struct MappedRows<'a, T> {
    rows: Rows<'a>,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromRow> Iterator for MappedRows<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.rows.next() {
            Ok(true) => self.rows.scan(),
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

impl<T: FromRow> std::iter::FusedIterator for MappedRows<'_, T> {}
