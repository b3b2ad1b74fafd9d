use std::fmt;

/// Sentinel meaning "no migrations applied".
pub const NIL_VERSION: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Up => "Migrating",
            Self::Down => "Rolling back",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn short(&self) -> &'static str {
        match self {
            Self::Up => "u",
            Self::Down => "d",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// One step of a migration plan.
///
/// `source_version` is the ledger version before the step runs and
/// `target_version` is what gets persisted after the script succeeds.
/// The body stays empty until the prefetcher drains the source reader.
#[derive(Debug)]
pub struct Migration {
    pub source_version: i64,
    pub target_version: i64,
    pub identifier: String,
    pub direction: Direction,
    pub body: Option<Vec<u8>>,
}

impl Migration {
    pub fn new(
        source_version: i64,
        target_version: i64,
        identifier: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Migration {
            source_version,
            target_version,
            identifier: identifier.into(),
            direction,
            body: None,
        }
    }

    /// The version of the artifact that backs this step: the destination
    /// version when going up, the departed version when going down.
    pub fn artifact_version(&self) -> i64 {
        match self.direction {
            Direction::Up => self.target_version,
            Direction::Down => self.source_version,
        }
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}",
            self.artifact_version(),
            self.direction.short(),
            self.identifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_version_follows_direction() {
        let up = Migration::new(1, 3, "add_index", Direction::Up);
        assert_eq!(up.artifact_version(), 3);

        let down = Migration::new(3, 1, "add_index", Direction::Down);
        assert_eq!(down.artifact_version(), 3);
    }

    #[test]
    fn display_is_compact() {
        let up = Migration::new(NIL_VERSION, 1, "create_users", Direction::Up);
        assert_eq!(up.to_string(), "1/u create_users");

        let down = Migration::new(1, NIL_VERSION, "create_users", Direction::Down);
        assert_eq!(down.to_string(), "1/d create_users");
    }
}
