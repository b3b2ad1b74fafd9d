use crate::migration::Direction;

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
#[non_exhaustive]
pub struct SourceError {
    pub kind: SourceErrorKind,
}

impl SourceError {
    /// "Not exist" conditions are part of the source contract: the migrator
    /// walks the index by probing until one of these comes back.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Empty | SourceErrorKind::NotFound { .. }
        )
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceError: {}", self.kind)
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug)]
pub enum SourceErrorKind {
    /// The source holds no migrations at all.
    Empty,
    /// No artifact at (or beyond) the requested version. `direction` is set
    /// for body reads and unset for index navigation.
    NotFound {
        version: i64,
        direction: Option<Direction>,
    },
    /// Two artifacts claim the same (version, direction) pair.
    Duplicate {
        version: i64,
        direction: Direction,
        name: String,
    },
    InvalidDirectory(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A staged body reader failed while being drained.
    Read {
        version: i64,
        direction: Direction,
        source: std::io::Error,
    },
    UnknownScheme(String),
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "source contains no migrations"),
            Self::NotFound { version, direction: Some(direction) } => {
                write!(f, "no {direction} migration for version {version}")
            }
            Self::NotFound { version, direction: None } => {
                write!(f, "no migration beyond version {version}")
            }
            Self::Duplicate { version, direction, name } => {
                write!(f, "duplicate {direction} migration for version {version}: '{name}'")
            }
            Self::InvalidDirectory(path) => {
                write!(f, "directory does not exist or is not a directory: '{path:?}'")
            }
            Self::Io { path, .. } => write!(f, "failed to read from '{path:?}'"),
            Self::Read { version, direction, .. } => {
                write!(f, "failed to read the {direction} migration body for version {version}")
            }
            Self::UnknownScheme(scheme) => write!(f, "unknown source scheme: '{scheme}'"),
        }
    }
}

impl Error for SourceErrorKind {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}
