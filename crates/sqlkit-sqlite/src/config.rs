//! Connection configuration.

use crate::ffi;
use std::ffi::c_int;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// How long a statement waits on a locked store before failing with
    /// a busy error. Zero disables waiting.
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SqliteConfig {
    /// Config for a file-based database, created if missing.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Config for a private in-memory database.
    pub fn memory() -> Self {
        Self::file(":memory:")
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:" || self.path.is_empty()
    }

    pub(crate) fn busy_timeout_ms(&self) -> c_int {
        c_int::try_from(self.busy_timeout.as_millis()).unwrap_or(c_int::MAX)
    }
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Interpret the path as a `file:` URI.
    pub uri: bool,
    /// Multi-thread mode: the engine does no locking of its own.
    pub no_mutex: bool,
    /// Serialized mode.
    pub full_mutex: bool,
    pub shared_cache: bool,
    pub private_cache: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Read-write access to an existing database.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Read-write access, creating the database if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    pub fn with_uri(mut self) -> Self {
        self.uri = true;
        self
    }

    pub(crate) fn to_sqlite_flags(self) -> c_int {
        let pairs = [
            (self.read_only, ffi::SQLITE_OPEN_READONLY),
            (self.read_write, ffi::SQLITE_OPEN_READWRITE),
            (self.create, ffi::SQLITE_OPEN_CREATE),
            (self.uri, ffi::SQLITE_OPEN_URI),
            (self.no_mutex, ffi::SQLITE_OPEN_NOMUTEX),
            (self.full_mutex, ffi::SQLITE_OPEN_FULLMUTEX),
            (self.shared_cache, ffi::SQLITE_OPEN_SHAREDCACHE),
            (self.private_cache, ffi::SQLITE_OPEN_PRIVATECACHE),
        ];
        let mut flags = pairs
            .iter()
            .filter(|(set, _)| *set)
            .fold(0, |acc, (_, flag)| acc | flag);

        // No access mode given: read-write, create if missing
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        let config = SqliteConfig::default();
        assert!(config.is_memory());
        assert_eq!(config.flags, OpenFlags::create_read_write());
        assert_eq!(config.busy_timeout, DEFAULT_BUSY_TIMEOUT);
    }

    #[test]
    fn test_builder() {
        let config = SqliteConfig::file("test.db")
            .flags(OpenFlags::read_only())
            .busy_timeout(Duration::from_millis(250));
        assert!(!config.is_memory());
        assert_eq!(config.path, "test.db");
        assert_eq!(config.busy_timeout_ms(), 250);
    }

    #[test]
    fn test_busy_timeout_saturates() {
        let config = SqliteConfig::memory().busy_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(config.busy_timeout_ms(), c_int::MAX);
    }

    #[test]
    fn test_flag_bits() {
        assert_eq!(
            OpenFlags::create_read_write().to_sqlite_flags(),
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        );
        assert_eq!(
            OpenFlags::read_only().to_sqlite_flags(),
            ffi::SQLITE_OPEN_READONLY
        );
        assert_eq!(
            OpenFlags::default().to_sqlite_flags(),
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        );
        assert_ne!(
            OpenFlags::read_write().with_uri().to_sqlite_flags() & ffi::SQLITE_OPEN_URI,
            0
        );
    }
}
