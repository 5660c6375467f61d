//! Translation of SQLite result codes into [`sqlkit_core::Error`].

use crate::ffi;
use sqlkit_core::Error;
use sqlkit_core::error::{
    ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, StateError, StateErrorKind,
    TransactionError, TransactionErrorKind,
};
use std::ffi::c_int;

// Extended constraint codes: SQLITE_CONSTRAINT | (n << 8)
const CONSTRAINT_CHECK: c_int = ffi::SQLITE_CONSTRAINT | (1 << 8);
const CONSTRAINT_FOREIGNKEY: c_int = ffi::SQLITE_CONSTRAINT | (3 << 8);
const CONSTRAINT_NOTNULL: c_int = ffi::SQLITE_CONSTRAINT | (5 << 8);
const CONSTRAINT_PRIMARYKEY: c_int = ffi::SQLITE_CONSTRAINT | (6 << 8);
const CONSTRAINT_UNIQUE: c_int = ffi::SQLITE_CONSTRAINT | (8 << 8);

/// Build an error from the last failure recorded on `db`.
pub(crate) fn engine_error(db: *mut ffi::sqlite3, sql: Option<&str>) -> Error {
    let code = if db.is_null() {
        ffi::SQLITE_ERROR
    } else {
        // SAFETY: db is an open handle
        unsafe { ffi::sqlite3_extended_errcode(db) }
    };
    query_error(code, ffi::errmsg(db), sql)
}

/// Build an error from a bare result code, when the handle's message is not
/// about this failure.
pub(crate) fn code_error(code: c_int, sql: Option<&str>) -> Error {
    query_error(code, ffi::error_string(code).to_string(), sql)
}

pub(crate) fn query_error(code: c_int, message: String, sql: Option<&str>) -> Error {
    Error::Query(QueryError {
        kind: classify(code, &message),
        sql: sql.map(str::to_string),
        sqlstate: sqlstate(code).map(str::to_string),
        code: Some(code),
        message,
        source: None,
    })
}

pub(crate) fn syntax_error(sql: &str, message: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        sqlstate: None,
        code: None,
        message: message.into(),
        source: None,
    })
}

pub(crate) fn connection_error(kind: ConnectionErrorKind, message: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: message.into(),
        source: None,
    })
}

pub(crate) fn state_error(kind: StateErrorKind, message: impl Into<String>) -> Error {
    Error::State(StateError {
        kind,
        message: message.into(),
    })
}

pub(crate) fn transaction_error(kind: TransactionErrorKind, message: impl Into<String>) -> Error {
    Error::Transaction(TransactionError {
        kind,
        message: message.into(),
    })
}

/// Map a (possibly extended) result code to a query error kind.
///
/// `SQLITE_ERROR` is a catch-all, so the message decides between syntax,
/// missing objects and everything else.
pub(crate) fn classify(code: c_int, message: &str) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_READONLY => QueryErrorKind::ReadOnly,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        ffi::SQLITE_ERROR if is_syntax_message(message) => QueryErrorKind::Syntax,
        ffi::SQLITE_ERROR if is_missing_object(message) => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}

fn is_syntax_message(message: &str) -> bool {
    message.contains("syntax error")
        || message.contains("incomplete input")
        || message.contains("unrecognized token")
}

fn is_missing_object(message: &str) -> bool {
    message.starts_with("no such table") || message.starts_with("no such column")
}

/// SQLSTATE class for constraint failures, derived from the extended code.
pub(crate) fn sqlstate(code: c_int) -> Option<&'static str> {
    match code {
        CONSTRAINT_PRIMARYKEY | CONSTRAINT_UNIQUE => Some("23505"),
        CONSTRAINT_FOREIGNKEY => Some("23503"),
        CONSTRAINT_NOTNULL => Some("23502"),
        CONSTRAINT_CHECK => Some("23514"),
        c if c & 0xff == ffi::SQLITE_CONSTRAINT => Some("23000"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlkit_core::ErrorKind;

    #[test]
    fn test_classify_primary_codes() {
        assert_eq!(
            classify(CONSTRAINT_PRIMARYKEY, "UNIQUE constraint failed: foo.id"),
            QueryErrorKind::Constraint
        );
        assert_eq!(classify(ffi::SQLITE_BUSY, "database is locked"), QueryErrorKind::Busy);
        assert_eq!(
            classify(ffi::SQLITE_READONLY, "attempt to write a readonly database"),
            QueryErrorKind::ReadOnly
        );
        assert_eq!(
            classify(ffi::SQLITE_ERROR, r#"near "selec": syntax error"#),
            QueryErrorKind::Syntax
        );
        assert_eq!(
            classify(ffi::SQLITE_ERROR, "no such table: bar"),
            QueryErrorKind::NotFound
        );
        assert_eq!(
            classify(ffi::SQLITE_ERROR, "table foo already exists"),
            QueryErrorKind::Database
        );
    }

    #[test]
    fn test_sqlstate_from_extended_code() {
        assert_eq!(sqlstate(CONSTRAINT_PRIMARYKEY), Some("23505"));
        assert_eq!(sqlstate(CONSTRAINT_UNIQUE), Some("23505"));
        assert_eq!(sqlstate(CONSTRAINT_FOREIGNKEY), Some("23503"));
        assert_eq!(sqlstate(CONSTRAINT_NOTNULL), Some("23502"));
        assert_eq!(sqlstate(CONSTRAINT_CHECK), Some("23514"));
        assert_eq!(sqlstate(ffi::SQLITE_CONSTRAINT), Some("23000"));
        assert_eq!(sqlstate(ffi::SQLITE_BUSY), None);
    }

    #[test]
    fn test_code_error_kind() {
        let err = code_error(CONSTRAINT_PRIMARYKEY, Some("insert into foo values(42, 'x')"));
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(err.sqlstate(), Some("23505"));
        assert_eq!(err.sql(), Some("insert into foo values(42, 'x')"));
    }
}
