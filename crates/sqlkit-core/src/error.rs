//! Error types for sqlkit operations.

use std::fmt;

/// The primary error type for all sqlkit operations.
#[derive(Debug)]
pub enum Error {
    /// Opening or closing the backing store failed
    Connection(ConnectionError),
    /// The engine rejected or failed a statement
    Query(QueryError),
    /// A column value could not be decoded into the requested type
    Type(TypeError),
    /// Parameter or column count did not match the statement
    Binding(BindingError),
    /// Transaction scope misuse (nested begin, inactive scope, ...)
    Transaction(TransactionError),
    /// Operation on a closed or not-yet-positioned handle
    State(StateError),
    /// A single-row read matched nothing
    NoRows,
    /// The engine does not report the requested information
    Unsupported(String),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

/// Coarse classification of an [`Error`].
///
/// Callers that only need to decide how to react (retry, report, treat as
/// expected) match on this instead of the detailed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The store could not be opened or closed
    OpenFailure,
    /// Malformed SQL text
    SyntaxError,
    /// A declared data rule would be broken (primary key, unique, ...)
    ConstraintViolation,
    /// A single-row read or scan found no row
    NoRows,
    /// Operation on a closed or terminal statement, cursor or transaction
    StateError,
    /// Parameter/column count or type mismatch
    BindingMismatch,
    /// Anything else reported by the engine or the OS
    Other,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The store identifier was not usable (interior NUL, bad URI)
    InvalidPath,
    /// The engine refused to open the store
    Open,
    /// The engine refused to close the store
    Close,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    /// SQLSTATE-style class for constraint failures (e.g. "23505")
    pub sqlstate: Option<String>,
    /// Engine-specific (extended) result code
    pub code: Option<i32>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (primary key, unique, foreign key, ...)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Store opened read-only
    ReadOnly,
    /// Data too large for the engine
    DataTruncation,
    /// Store is locked by another handle
    Busy,
    /// Interrupted
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub index: Option<usize>,
}

#[derive(Debug)]
pub struct BindingError {
    pub kind: BindingErrorKind,
    pub expected: usize,
    pub actual: usize,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingErrorKind {
    /// Number of parameters differs from the statement's slots
    ParameterCount,
    /// Number of scan targets differs from the row's columns
    ColumnCount,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already open on this session
    NestedNotSupported,
    /// The transaction this scope belongs to is no longer active
    NotActive,
    /// Direct session execution attempted while a transaction is open
    SessionBusy,
    /// Transaction control statements must go through begin/commit/rollback
    ManualControl,
    /// A statement from another session was bound to this transaction
    ForeignStatement,
}

#[derive(Debug)]
pub struct StateError {
    pub kind: StateErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    /// The prepared statement was closed
    StatementClosed,
    /// The cursor was closed
    CursorClosed,
    /// `scan` called before the first `next`
    CursorNotStarted,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::OpenFailure,
            Error::Query(q) => match q.kind {
                QueryErrorKind::Syntax => ErrorKind::SyntaxError,
                QueryErrorKind::Constraint => ErrorKind::ConstraintViolation,
                _ => ErrorKind::Other,
            },
            Error::Type(_) | Error::Binding(_) => ErrorKind::BindingMismatch,
            Error::Transaction(_) | Error::State(_) => ErrorKind::StateError,
            Error::NoRows => ErrorKind::NoRows,
            Error::Unsupported(_) | Error::Io(_) | Error::Custom(_) => ErrorKind::Other,
        }
    }

    /// Is this a constraint violation (duplicate key, failed check, ...)?
    pub fn is_constraint_violation(&self) -> bool {
        self.kind() == ErrorKind::ConstraintViolation
    }

    /// Did a single-row read find nothing?
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Error::NoRows)
    }

    /// Is this a retryable error (store locked by another handle)?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind == QueryErrorKind::Busy)
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Binding(b) => b.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Is this a unique (or primary key) constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Binding(e) => write!(f, "Binding error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::State(e) => write!(f, "State error: {}", e.message),
            Error::NoRows => write!(f, "no rows in result set"),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.column, self.index) {
            (Some(col), _) => write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            ),
            (None, Some(index)) => write!(
                f,
                "expected {} for column {}, found {}",
                self.expected, index, self.actual
            ),
            (None, None) => write!(f, "expected {}, found {}", self.expected, self.actual),
        }
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BindingErrorKind::ParameterCount => write!(
                f,
                "statement expects {} parameter(s), got {}",
                self.expected, self.actual
            ),
            BindingErrorKind::ColumnCount => write!(
                f,
                "row has {} column(s), scan expects {}",
                self.actual, self.expected
            ),
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<BindingError> for Error {
    fn from(err: BindingError) -> Self {
        Error::Binding(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        Error::State(err)
    }
}

/// Result type alias for sqlkit operations.
pub type Result<T> = std::result::Result<T, Error>;
