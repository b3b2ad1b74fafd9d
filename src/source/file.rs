use crate::migration::Direction;
use crate::source::index::{Artifact, VersionIndex, parse_filename};
use crate::source::{ScriptBody, Source, SourceError, SourceErrorKind};

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Migration source backed by a flat directory of
/// `<version>_<identifier>.(up|down).<ext>` scripts.
///
/// The directory is scanned once at open; bodies are opened lazily when the
/// returned reader is first polled.
#[derive(Debug)]
pub struct FileSource {
    directory: PathBuf,
    index: VersionIndex,
}

impl FileSource {
    pub fn open(directory: &Path) -> Result<Self, SourceError> {
        if !directory.is_dir() {
            return Err(SourceError {
                kind: SourceErrorKind::InvalidDirectory(directory.to_path_buf()),
            });
        }

        let mut index = VersionIndex::new();
        let entries = fs::read_dir(directory).map_err(|e| SourceError {
            kind: SourceErrorKind::Io {
                path: directory.to_path_buf(),
                source: e,
            },
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| SourceError {
                kind: SourceErrorKind::Io {
                    path: directory.to_path_buf(),
                    source: e,
                },
            })?;

            let path = entry.path();
            if path.is_dir() {
                tracing::debug!("Skipping directory: {:?}", path);
                continue;
            }

            let name = match path.file_name().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => {
                    tracing::debug!("Skipping non-UTF-8 file name: {:?}", path);
                    continue;
                }
            };

            let parsed = match parse_filename(&name) {
                Some(p) => p,
                None => {
                    tracing::debug!("Skipping '{}': not a migration file name", name);
                    continue;
                }
            };

            let artifact = Artifact {
                version: parsed.version,
                identifier: parsed.identifier,
                direction: parsed.direction,
                locator: path.to_string_lossy().into_owned(),
            };
            if !index.append(artifact) {
                return Err(SourceError {
                    kind: SourceErrorKind::Duplicate {
                        version: parsed.version,
                        direction: parsed.direction,
                        name,
                    },
                });
            }
        }

        Ok(FileSource { directory: directory.to_path_buf(), index })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn index(&self) -> &VersionIndex {
        &self.index
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

        Ok(ScriptBody {
            identifier: artifact.identifier.clone(),
            reader: Box::new(LazyFileReader::new(PathBuf::from(&artifact.locator))),
        })
    }
}

impl Source for FileSource {
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

/// Defers the `File::open` until the first read so that handing out a body
/// descriptor stays free of I/O.
struct LazyFileReader {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFileReader {
    fn new(path: PathBuf) -> Self {
        LazyFileReader { path, file: None }
    }
}

impl Read for LazyFileReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        self.file.as_mut().unwrap().read(buf)
    }
}
