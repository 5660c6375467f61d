//! Low-level access to libsqlite3.
//!
//! The raw declarations come from `libsqlite3-sys`; this module narrows them
//! to what the driver uses and adds a few safe helpers for reading engine
//! strings.

use std::ffi::{CStr, c_int};

pub(crate) use libsqlite3_sys::{
    SQLITE_AUTH, SQLITE_BLOB, SQLITE_BUSY, SQLITE_CONSTRAINT, SQLITE_DONE, SQLITE_ERROR,
    SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_INTERRUPT, SQLITE_LOCKED, SQLITE_NULL, SQLITE_OK,
    SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_NOMUTEX, SQLITE_OPEN_PRIVATECACHE,
    SQLITE_OPEN_READONLY, SQLITE_OPEN_READWRITE, SQLITE_OPEN_SHAREDCACHE, SQLITE_OPEN_URI,
    SQLITE_PERM, SQLITE_READONLY, SQLITE_ROW, SQLITE_TEXT, SQLITE_TOOBIG, SQLITE_TRANSIENT,
    sqlite3, sqlite3_bind_blob, sqlite3_bind_double, sqlite3_bind_int, sqlite3_bind_int64,
    sqlite3_bind_null, sqlite3_bind_parameter_count, sqlite3_bind_text, sqlite3_bind_zeroblob,
    sqlite3_busy_timeout, sqlite3_changes, sqlite3_clear_bindings, sqlite3_close,
    sqlite3_column_blob, sqlite3_column_bytes, sqlite3_column_count,
    sqlite3_column_double, sqlite3_column_int64, sqlite3_column_name, sqlite3_column_text,
    sqlite3_column_type, sqlite3_db_handle, sqlite3_errmsg, sqlite3_exec,
    sqlite3_extended_errcode, sqlite3_finalize, sqlite3_get_autocommit,
    sqlite3_last_insert_rowid, sqlite3_open_v2, sqlite3_prepare_v2, sqlite3_reset, sqlite3_step,
    sqlite3_stmt, sqlite3_stmt_readonly,
};

// `libsqlite3-sys` omits `sqlite3_close_v2` from its generated bindings; the
// symbol is still exported by the bundled library, so declare it here.
unsafe extern "C" {
    pub(crate) fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = libsqlite3_sys::sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Get the SQLite library version as a number.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { libsqlite3_sys::sqlite3_libversion_number() }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string for every code
    unsafe {
        let ptr = libsqlite3_sys::sqlite3_errstr(code);
        if ptr.is_null() {
            return "unknown error";
        }
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}

/// Read the most recent error message recorded on a handle.
pub(crate) fn errmsg(db: *mut sqlite3) -> String {
    if db.is_null() {
        return "connection is closed".to_string();
    }
    // SAFETY: db is an open handle; the message stays valid until the next
    // call on it, and we copy it out immediately
    unsafe {
        let ptr = sqlite3_errmsg(db);
        if ptr.is_null() {
            return "unknown error".to_string();
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
