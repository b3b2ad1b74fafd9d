use crate::db::{DbError, DbErrorKind};
use crate::migration::Direction;
use crate::source::SourceError;

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub struct MigrateError {
    pub kind: MigrateErrorKind,
}

impl MigrateError {
    /// An empty plan is reported through the error channel but callers are
    /// free to treat it as success.
    pub fn is_no_change(&self) -> bool {
        matches!(self.kind, MigrateErrorKind::NoChange)
    }
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MigrateError: {}", self.kind)
    }
}

impl Error for MigrateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug)]
pub enum MigrateErrorKind {
    /// The computed plan was empty.
    NoChange,
    /// The ledger carries `dirty = true`; only `force` and `drop` may proceed.
    DirtyDatabase { version: i64 },
    /// Another migrator holds the database lock (or this one already does).
    Locked,
    /// Unlock was requested without holding the lock.
    NotLocked,
    /// The traversal needs an artifact the source does not provide.
    MissingDirection { version: i64, direction: Direction },
    /// A user-supplied version is outside the permitted range.
    InvalidVersion(i64),
    /// Command-line misuse that never reached the engine.
    Usage(String),
    Source(SourceError),
    Database(DbError),
}

impl fmt::Display for MigrateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChange => write!(f, "no change"),
            Self::DirtyDatabase { version } => write!(
                f,
                "database is dirty at version {version}: fix the failed migration, then force the version"
            ),
            Self::Locked => write!(f, "another migration process holds the database lock"),
            Self::NotLocked => write!(f, "cannot release a lock that is not held"),
            Self::MissingDirection { version, direction } => {
                write!(f, "no {direction} migration available for version {version}")
            }
            Self::InvalidVersion(version) => write!(f, "invalid version: {version}"),
            Self::Usage(message) => write!(f, "{message}"),
            Self::Source(error) => write!(f, "{}", error.kind),
            Self::Database(error) => write!(f, "{}", error.kind),
        }
    }
}

impl Error for MigrateErrorKind {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(source) => Some(source),
            Self::Database(source) => Some(source),
            _ => None,
        }
    }
}

impl From<SourceError> for MigrateError {
    fn from(error: SourceError) -> Self {
        MigrateError {
            kind: MigrateErrorKind::Source(error),
        }
    }
}

impl From<DbError> for MigrateError {
    fn from(error: DbError) -> Self {
        let kind = match error.kind {
            DbErrorKind::Locked => MigrateErrorKind::Locked,
            DbErrorKind::NotLocked => MigrateErrorKind::NotLocked,
            _ => MigrateErrorKind::Database(error),
        };
        MigrateError { kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceErrorKind;

    #[test]
    fn display_formats_the_semantic_kinds() {
        let cases: Vec<(MigrateErrorKind, &str)> = vec![
            (MigrateErrorKind::NoChange, "no change"),
            (
                MigrateErrorKind::DirtyDatabase { version: 3 },
                "dirty at version 3",
            ),
            (MigrateErrorKind::Locked, "holds the database lock"),
            (
                MigrateErrorKind::MissingDirection {
                    version: 4,
                    direction: Direction::Down,
                },
                "no down migration available for version 4",
            ),
            (MigrateErrorKind::InvalidVersion(-7), "invalid version: -7"),
        ];

        for (kind, expect) in cases {
            let text = kind.to_string();
            assert!(text.contains(expect), "expected `{expect}` in `{text}`");
        }
    }

    #[test]
    fn lock_kinds_are_lifted_out_of_database_errors() {
        let locked: MigrateError = DbError {
            kind: DbErrorKind::Locked,
        }
        .into();
        assert!(matches!(locked.kind, MigrateErrorKind::Locked));

        let not_locked: MigrateError = DbError {
            kind: DbErrorKind::NotLocked,
        }
        .into();
        assert!(matches!(not_locked.kind, MigrateErrorKind::NotLocked));
    }

    #[test]
    fn from_conversions_wrap_the_lower_layers() {
        let source: MigrateError = SourceError {
            kind: SourceErrorKind::Empty,
        }
        .into();
        assert!(matches!(source.kind, MigrateErrorKind::Source(_)));
    }
}
