//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL).
//! Booleans bind as INTEGER 0/1 and JSON documents bind as TEXT; on the way
//! back every value comes out as one of the five classes.

use crate::ffi;
use sqlkit_core::Value;
use std::ffi::{CStr, c_int};

/// Bind a Value to a prepared statement parameter.
///
/// Returns the SQLite result code; `SQLITE_TOOBIG` when a text or blob
/// length does not fit the engine's length type.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub(crate) unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: upheld by the caller for every arm
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Text(s) => bind_text(stmt, index, s),
            Value::Bytes(b) => bind_blob(stmt, index, b),
            Value::Json(json) => bind_text(stmt, index, &json.to_string()),
        }
    }
}

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let Ok(len) = c_int::try_from(text.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the buffer before returning
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            text.as_ptr().cast(),
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

unsafe fn bind_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int, bytes: &[u8]) -> c_int {
    if bytes.is_empty() {
        // SAFETY: stmt and index are valid per the caller
        return unsafe { ffi::sqlite3_bind_zeroblob(stmt, index, 0) };
    }
    let Ok(len) = c_int::try_from(bytes.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the buffer before returning
    unsafe {
        ffi::sqlite3_bind_blob(
            stmt,
            index,
            bytes.as_ptr().cast(),
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Read a column value from a result row.
///
/// Integers that fit in 32 bits come back as [`Value::Int`], wider ones as
/// [`Value::BigInt`]. TEXT that is not valid UTF-8 comes back as
/// [`Value::Bytes`] rather than being repaired.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub(crate) unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: upheld by the caller; pointers returned by the column accessors
    // stay valid until the next step/reset, and we copy out of them at once
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_NULL => Value::Null,

            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                i32::try_from(v).map_or(Value::BigInt(v), Value::Int)
            }

            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),

            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, index)).unwrap_or(0);
                if ptr.is_null() {
                    Value::Null
                } else {
                    // Invalid UTF-8 is handed back untouched as bytes
                    let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec();
                    String::from_utf8(bytes)
                        .map_or_else(|e| Value::Bytes(e.into_bytes()), Value::Text)
                }
            }

            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, index)).unwrap_or(0);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    Value::Bytes(std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec())
                }
            }

            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub(crate) unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: upheld by the caller
    let ptr = unsafe { ffi::sqlite3_column_name(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: SQLite returns a NUL-terminated UTF-8 name
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .ok()
            .map(String::from)
    }
}
