//! Outcome of a non-query execution.

use sqlkit_core::{Error, Result};
use std::fmt;

/// Coarse classification of a statement by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// SELECT, VALUES, or a read-only WITH
    Select,
    /// INSERT or REPLACE
    Insert,
    Update,
    Delete,
    /// CREATE, DROP, ALTER
    Ddl,
    /// BEGIN, COMMIT, END, ROLLBACK, SAVEPOINT, RELEASE
    Transaction,
    /// PRAGMA, VACUUM, ATTACH, ...
    Other,
}

impl StatementKind {
    /// Classify `sql`. `readonly` is the engine's verdict for the compiled
    /// statement and disambiguates common table expressions.
    pub fn classify(sql: &str, readonly: bool) -> Self {
        match leading_keyword(sql).as_str() {
            "SELECT" | "VALUES" => StatementKind::Select,
            "INSERT" | "REPLACE" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CREATE" | "DROP" | "ALTER" => StatementKind::Ddl,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementKind::Transaction
            }
            "WITH" if readonly => StatementKind::Select,
            "WITH" => match keyword_after_cte(sql).as_str() {
                "INSERT" | "REPLACE" => StatementKind::Insert,
                "UPDATE" => StatementKind::Update,
                "DELETE" => StatementKind::Delete,
                _ => StatementKind::Other,
            },
            _ => StatementKind::Other,
        }
    }

    /// Does the engine report a meaningful change count for this kind?
    pub fn reports_changes(self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Ddl => "ddl",
            StatementKind::Transaction => "transaction",
            StatementKind::Other => "other",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First keyword of `sql`, uppercased, skipping whitespace, comments and
/// opening parentheses.
fn leading_keyword(sql: &str) -> String {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |i| &after[i + 1..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |i| &after[i + 2..]);
        } else if let Some(after) = rest.strip_prefix('(') {
            rest = after;
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// First statement keyword after the common table expressions of a `WITH`.
///
/// Scans words outside parentheses, quotes and comments, so CTE bodies are
/// skipped whatever they contain.
fn keyword_after_cte(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut depth = 0_usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |n| i + n);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                continue;
            }
            quote @ (b'\'' | b'"' | b'`') => {
                i = sql[i + 1..]
                    .find(char::from(quote))
                    .map_or(bytes.len(), |n| i + 1 + n);
            }
            b'[' => {
                i = sql[i + 1..].find(']').map_or(bytes.len(), |n| i + 1 + n);
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            c if depth == 0 && c.is_ascii_alphabetic() => {
                let end = sql[i..]
                    .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                    .map_or(bytes.len(), |n| i + n);
                let word = sql[i..end].to_ascii_uppercase();
                if matches!(
                    word.as_str(),
                    "SELECT" | "VALUES" | "INSERT" | "REPLACE" | "UPDATE" | "DELETE"
                ) {
                    return word;
                }
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    String::new()
}

/// What a non-query execution changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    kind: StatementKind,
    rows_affected: Option<u64>,
    last_insert_rowid: i64,
}

impl ExecResult {
    pub(crate) fn new(kind: StatementKind, rows_affected: Option<u64>, last_insert_rowid: i64) -> Self {
        Self {
            kind,
            rows_affected,
            last_insert_rowid,
        }
    }

    /// Number of rows inserted, updated or deleted.
    ///
    /// Only data-modifying statements carry a count. For DDL, PRAGMA and the
    /// like the engine's counter still holds the previous statement's value,
    /// so asking is an [`Error::Unsupported`] rather than a stale number.
    pub fn rows_affected(&self) -> Result<u64> {
        self.rows_affected.ok_or_else(|| {
            Error::Unsupported(format!(
                "rows affected is not reported for {} statements",
                self.kind
            ))
        })
    }

    /// Rowid of the most recent successful insert on the session.
    pub fn last_insert_rowid(&self) -> i64 {
        self.last_insert_rowid
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}
