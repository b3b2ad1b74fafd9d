mod error;
mod file;
pub mod index;
mod memory;

pub use error::{SourceError, SourceErrorKind};
pub use file::FileSource;
pub use index::{Artifact, VersionIndex, parse_filename};
pub use memory::MemorySource;

use crate::urlparse;

use std::io::Read;
use std::path::Path;

/// A migration body handed out by a source. The caller owns the reader and
/// closes it by dropping.
pub struct ScriptBody {
    pub identifier: String,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for ScriptBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBody")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// The source driver contract: an ordered, lazy catalog of up/down bodies.
///
/// Navigation ("not exist" is distinguishable via
/// [`SourceError::is_not_found`]) plus on-demand body reads.
pub trait Source {
    fn first(&self) -> Result<i64, SourceError>;
    fn prev(&self, version: i64) -> Result<i64, SourceError>;
    fn next(&self, version: i64) -> Result<i64, SourceError>;
    fn read_up(&self, version: i64) -> Result<ScriptBody, SourceError>;
    fn read_down(&self, version: i64) -> Result<ScriptBody, SourceError>;
    fn close(&self) -> Result<(), SourceError>;
}

#[derive(Debug)]
pub enum SourceBackend {
    File(FileSource),
    Memory(MemorySource),
}

impl SourceBackend {
    /// Selects a driver by URL scheme.
    pub fn open(url: &str) -> Result<Self, SourceError> {
        let scheme = urlparse::scheme_of(url).unwrap_or("");
        match scheme {
            "file" => {
                let path = urlparse::opaque_of(url).unwrap_or("");
                Ok(SourceBackend::File(FileSource::open(Path::new(path))?))
            }
            "memory" => Ok(SourceBackend::Memory(MemorySource::new())),
            other => Err(SourceError {
                kind: SourceErrorKind::UnknownScheme(other.to_string()),
            }),
        }
    }

    /// Sorted list of the URL schemes this build understands.
    pub fn schemes() -> &'static [&'static str] {
        &["file", "memory"]
    }

    pub fn first(&self) -> Result<i64, SourceError> {
        match self {
            SourceBackend::File(source) => source.first(),
            SourceBackend::Memory(source) => source.first(),
        }
    }

    pub fn prev(&self, version: i64) -> Result<i64, SourceError> {
        match self {
            SourceBackend::File(source) => source.prev(version),
            SourceBackend::Memory(source) => source.prev(version),
        }
    }

    pub fn next(&self, version: i64) -> Result<i64, SourceError> {
        match self {
            SourceBackend::File(source) => source.next(version),
            SourceBackend::Memory(source) => source.next(version),
        }
    }

    pub fn read_up(&self, version: i64) -> Result<ScriptBody, SourceError> {
        match self {
            SourceBackend::File(source) => source.read_up(version),
            SourceBackend::Memory(source) => source.read_up(version),
        }
    }

    pub fn read_down(&self, version: i64) -> Result<ScriptBody, SourceError> {
        match self {
            SourceBackend::File(source) => source.read_down(version),
            SourceBackend::Memory(source) => source.read_down(version),
        }
    }

    pub fn close(&self) -> Result<(), SourceError> {
        match self {
            SourceBackend::File(source) => source.close(),
            SourceBackend::Memory(source) => source.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scheme_is_rejected() {
        let err = SourceBackend::open("s3://bucket/migrations").unwrap_err();
        assert!(matches!(err.kind, SourceErrorKind::UnknownScheme(s) if s == "s3"));
    }

    #[test]
    fn file_urls_dispatch_to_the_file_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1_init.up.sql"), "SELECT 1").unwrap();

        let url = format!("file://{}", dir.path().display());
        let source = SourceBackend::open(&url).unwrap();
        assert_eq!(source.first().unwrap(), 1);
    }

    #[test]
    fn memory_urls_start_empty() {
        let source = SourceBackend::open("memory://").unwrap();
        assert!(source.first().unwrap_err().is_not_found());
    }

    #[test]
    fn schemes_are_sorted_for_help_text() {
        let schemes = SourceBackend::schemes();
        let mut sorted = schemes.to_vec();
        sorted.sort_unstable();
        assert_eq!(schemes, sorted.as_slice());
    }
}
