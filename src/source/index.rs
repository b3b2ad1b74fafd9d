use crate::migration::Direction;

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::LazyLock;

/// `<version>_<identifier>.(up|down).<ext>`
static FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)_(.+)\.(up|down)\.(.+)$").unwrap());

/// A single up or down migration body as advertised by a source.
///
/// `locator` is opaque to everything but the owning source driver; the file
/// source stores the script path in it.
#[derive(Clone, Debug)]
pub struct Artifact {
    pub version: i64,
    pub identifier: String,
    pub direction: Direction,
    pub locator: String,
}

#[derive(Debug, Default)]
pub struct VersionIndex {
    versions: BTreeSet<i64>,
    up: BTreeMap<i64, Artifact>,
    down: BTreeMap<i64, Artifact>,
}

impl VersionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an artifact; returns false and leaves the index unchanged if
    /// the (version, direction) slot is already taken.
    pub fn append(&mut self, artifact: Artifact) -> bool {
        let slot = match artifact.direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        };
        if slot.contains_key(&artifact.version) {
            return false;
        }
        self.versions.insert(artifact.version);
        slot.insert(artifact.version, artifact);
        true
    }

    pub fn first(&self) -> Option<i64> {
        self.versions.iter().next().copied()
    }

    pub fn last(&self) -> Option<i64> {
        self.versions.iter().next_back().copied()
    }

    /// Largest version strictly below `version`.
    pub fn prev(&self, version: i64) -> Option<i64> {
        self.versions.range(..version).next_back().copied()
    }

    /// Smallest version strictly above `version`.
    pub fn next(&self, version: i64) -> Option<i64> {
        self.versions
            .range((Bound::Excluded(version), Bound::Unbounded))
            .next()
            .copied()
    }

    pub fn up(&self, version: i64) -> Option<&Artifact> {
        self.up.get(&version)
    }

    pub fn down(&self, version: i64) -> Option<&Artifact> {
        self.down.get(&version)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParsedName {
    pub version: i64,
    pub identifier: String,
    pub direction: Direction,
}

/// Default filename parser. Names that do not match the convention (or whose
/// version overflows an i64) yield `None` and are skipped by the scanners.
pub fn parse_filename(name: &str) -> Option<ParsedName> {
    let captures = FILE_PATTERN.captures(name)?;
    let version = captures[1].parse::<i64>().ok()?;
    let direction = match &captures[3] {
        "up" => Direction::Up,
        _ => Direction::Down,
    };
    Some(ParsedName {
        version,
        identifier: captures[2].to_string(),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(version: i64, direction: Direction) -> Artifact {
        Artifact {
            version,
            identifier: format!("m{version}"),
            direction,
            locator: String::new(),
        }
    }

    #[test]
    fn navigation_over_a_sparse_index() {
        let mut index = VersionIndex::new();
        for v in [1, 3, 4, 5, 7] {
            assert!(index.append(artifact(v, Direction::Up)));
            assert!(index.append(artifact(v, Direction::Down)));
        }

        assert_eq!(index.first(), Some(1));
        assert_eq!(index.last(), Some(7));
        assert_eq!(index.prev(4), Some(3));
        assert_eq!(index.prev(1), None);
        assert_eq!(index.next(5), Some(7));
        assert_eq!(index.next(7), None);
        assert_eq!(index.next(-1), Some(1));
        assert_eq!(index.next(2), Some(3));
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let mut index = VersionIndex::new();
        assert!(index.append(artifact(2, Direction::Up)));
        assert!(!index.append(artifact(2, Direction::Up)));
        // The opposite direction is a distinct slot.
        assert!(index.append(artifact(2, Direction::Down)));
    }

    #[test]
    fn up_and_down_lookups_are_independent() {
        let mut index = VersionIndex::new();
        index.append(artifact(9, Direction::Down));

        assert!(index.up(9).is_none());
        assert!(index.down(9).is_some());
        assert_eq!(index.first(), Some(9));
    }

    #[test]
    fn filenames_follow_the_default_convention() {
        let parsed = parse_filename("42_create_users.up.sql").unwrap();
        assert_eq!(parsed.version, 42);
        assert_eq!(parsed.identifier, "create_users");
        assert_eq!(parsed.direction, Direction::Up);

        let parsed = parse_filename("0001_seed.down.sql").unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.direction, Direction::Down);

        // Identifiers may themselves contain dots.
        let parsed = parse_filename("7_add.users.table.up.psql").unwrap();
        assert_eq!(parsed.identifier, "add.users.table");
    }

    #[test]
    fn non_matching_names_are_ignored() {
        for name in [
            "README.md",
            "create_users.up.sql",
            "1_missing_direction.sql",
            "1_bad.sideways.sql",
            "99999999999999999999999999_overflow.up.sql",
        ] {
            assert!(parse_filename(name).is_none(), "should have skipped {name}");
        }
    }
}
