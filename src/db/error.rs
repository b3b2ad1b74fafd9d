use std::error::Error;
use std::fmt;

#[derive(Debug)]
#[non_exhaustive]
pub struct DbError {
    pub kind: DbErrorKind,
}

impl DbError {
    pub fn is_locked(&self) -> bool {
        matches!(self.kind, DbErrorKind::Locked)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DbError: {}", self.kind)
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug)]
pub enum DbErrorKind {
    /// The exclusive migration lock is already held, possibly by this driver.
    Locked,
    /// Unlock was called without holding the lock.
    NotLocked,
    /// The connection URL lacks a database name to derive the lock key from.
    MissingDatabaseName,
    /// A migration script failed. Carries the offending script and, when the
    /// server reported a position, the line/column within it.
    Script {
        query: String,
        line: Option<u64>,
        column: Option<u64>,
        source: sqlx::Error,
    },
    Sqlx(sqlx::Error),
    Utf8(std::str::Utf8Error),
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    UnknownScheme(String),
    /// Failure injected by the stub driver.
    Stub(String),
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "the migration lock is already held"),
            Self::NotLocked => write!(f, "the migration lock is not held"),
            Self::MissingDatabaseName => write!(f, "no database name in the connection URL"),
            Self::Script { query, line: Some(line), column: Some(column), source } => {
                write!(
                    f,
                    "migration failed at line {line}, column {column}: {source} (in '{}')",
                    excerpt(query)
                )
            }
            Self::Script { query, source, .. } => {
                write!(f, "migration failed: {source} (in '{}')", excerpt(query))
            }
            Self::Sqlx(source) => write!(f, "database error: {source}"),
            Self::Utf8(source) => write!(f, "migration body is not valid UTF-8: {source}"),
            Self::InvalidUrl { url, source } => write!(f, "invalid database URL '{url}': {source}"),
            Self::UnknownScheme(scheme) => write!(f, "unknown database scheme: '{scheme}'"),
            Self::Stub(message) => write!(f, "stub failure: {message}"),
        }
    }
}

impl Error for DbErrorKind {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Script { source, .. } => Some(source),
            Self::Sqlx(source) => Some(source),
            Self::Utf8(source) => Some(source),
            Self::InvalidUrl { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        DbError {
            kind: DbErrorKind::Sqlx(error),
        }
    }
}

/// First line of a script, shortened for log output.
fn excerpt(query: &str) -> String {
    let first_line = query.lines().next().unwrap_or("");
    if first_line.chars().count() > 80 {
        let cut: String = first_line.chars().take(80).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}

/// 1-based line and column of a byte offset, tolerating LF and CRLF endings
/// and arbitrary byte content.
pub fn line_col_at(input: &[u8], offset: usize) -> (u64, u64) {
    let offset = offset.min(input.len());
    let mut line: u64 = 1;
    let mut line_start = 0usize;
    for (i, byte) in input[..offset].iter().enumerate() {
        if *byte == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    (line, (offset - line_start) as u64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_map_to_lines_and_columns() {
        let input = b"CREATE TABLE t (\n  id BIGINT\n);\n";
        assert_eq!(line_col_at(input, 0), (1, 1));
        assert_eq!(line_col_at(input, 7), (1, 8));
        assert_eq!(line_col_at(input, 17), (2, 1));
        assert_eq!(line_col_at(input, 19), (2, 3));
        assert_eq!(line_col_at(input, 29), (3, 1));
    }

    #[test]
    fn crlf_endings_still_advance_lines() {
        let input = b"a\r\nbb\r\nc";
        assert_eq!(line_col_at(input, 3), (2, 1));
        assert_eq!(line_col_at(input, 4), (2, 2));
        assert_eq!(line_col_at(input, 7), (3, 1));
    }

    #[test]
    fn offsets_past_the_end_are_clamped() {
        let input = b"one\ntwo";
        assert_eq!(line_col_at(input, 999), (2, 4));
    }

    #[test]
    fn arbitrary_bytes_do_not_panic() {
        let input = [0xff, 0xfe, b'\n', 0x00, 0x80];
        assert_eq!(line_col_at(&input, 4), (2, 2));
    }

    #[test]
    fn excerpt_takes_the_first_line_only() {
        assert_eq!(excerpt("DROP TABLE a;\nDROP TABLE b;"), "DROP TABLE a;");
    }
}
