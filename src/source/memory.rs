use crate::migration::Direction;
use crate::source::index::{Artifact, VersionIndex};
use crate::source::{ScriptBody, Source, SourceError, SourceErrorKind};

use std::collections::BTreeMap;
use std::io::Cursor;

/// Migration source held entirely in memory. Populated programmatically;
/// backs the engine test suite and embedded migration sets.
#[derive(Debug, Default)]
pub struct MemorySource {
    index: VersionIndex,
    bodies: BTreeMap<(i64, Direction), Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a version with optional up and down bodies. A version with
    /// neither body is not registered.
    pub fn add(
        &mut self,
        version: i64,
        identifier: &str,
        up: Option<&str>,
        down: Option<&str>,
    ) -> Result<(), SourceError> {
        if let Some(body) = up {
            self.add_artifact(version, identifier, Direction::Up, body.as_bytes())?;
        }
        if let Some(body) = down {
            self.add_artifact(version, identifier, Direction::Down, body.as_bytes())?;
        }
        Ok(())
    }

    fn add_artifact(
        &mut self,
        version: i64,
        identifier: &str,
        direction: Direction,
        body: &[u8],
    ) -> Result<(), SourceError> {
        let artifact = Artifact {
            version,
            identifier: identifier.to_string(),
            direction,
            locator: String::new(),
        };
        if !self.index.append(artifact) {
            return Err(SourceError {
                kind: SourceErrorKind::Duplicate {
                    version,
                    direction,
                    name: identifier.to_string(),
                },
            });
        }
        self.bodies.insert((version, direction), body.to_vec());
        Ok(())
    }

    fn read(&self, version: i64, direction: Direction) -> Result<ScriptBody, SourceError> {
        let artifact = match direction {
            Direction::Up => self.index.up(version),
            Direction::Down => self.index.down(version),
        };
        let artifact = artifact.ok_or(SourceError {
            kind: SourceErrorKind::NotFound {
                version,
                direction: Some(direction),
            },
        })?;

        let body = self
            .bodies
            .get(&(version, direction))
            .cloned()
            .unwrap_or_default();

        Ok(ScriptBody {
            identifier: artifact.identifier.clone(),
            reader: Box::new(Cursor::new(body)),
        })
    }
}

impl Source for MemorySource {
    fn first(&self) -> Result<i64, SourceError> {
        self.index.first().ok_or(SourceError {
            kind: SourceErrorKind::Empty,
        })
    }

    fn prev(&self, version: i64) -> Result<i64, SourceError> {
        self.index.prev(version).ok_or(SourceError {
            kind: SourceErrorKind::NotFound {
                version,
                direction: None,
            },
        })
    }

    fn next(&self, version: i64) -> Result<i64, SourceError> {
        self.index.next(version).ok_or(SourceError {
            kind: SourceErrorKind::NotFound {
                version,
                direction: None,
            },
        })
    }

    fn read_up(&self, version: i64) -> Result<ScriptBody, SourceError> {
        self.read(version, Direction::Up)
    }

    fn read_down(&self, version: i64) -> Result<ScriptBody, SourceError> {
        self.read(version, Direction::Down)
    }

    fn close(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn navigation_and_bodies() {
        let mut source = MemorySource::new();
        source.add(1, "a", Some("UP 1"), Some("DOWN 1")).unwrap();
        source.add(5, "b", Some("UP 5"), None).unwrap();

        assert_eq!(source.first().unwrap(), 1);
        assert_eq!(source.next(1).unwrap(), 5);
        assert_eq!(source.prev(5).unwrap(), 1);

        let mut body = source.read_up(5).unwrap();
        let mut buf = String::new();
        body.reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "UP 5");

        assert!(source.read_down(5).unwrap_err().is_not_found());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut source = MemorySource::new();
        source.add(2, "a", Some(""), None).unwrap();
        let err = source.add(2, "b", Some(""), None).unwrap_err();
        assert!(matches!(err.kind, SourceErrorKind::Duplicate { version: 2, .. }));
    }

    #[test]
    fn empty_source_reports_empty() {
        let source = MemorySource::new();
        assert!(matches!(
            source.first().unwrap_err().kind,
            SourceErrorKind::Empty
        ));
    }
}
