pub mod error;
mod postgres;
mod stub;

pub use error::{DbError, DbErrorKind};
pub use postgres::{DEFAULT_MIGRATIONS_TABLE, PostgresDriver};
pub use stub::{StubDriver, StubJournal};

use crate::urlparse;

/// The database driver contract.
///
/// `lock` is a single acquisition attempt; the migrator handles polling and
/// timeout. The same underlying connection must carry lock, run, set_version
/// and unlock for the whole traversal.
pub trait Database {
    async fn lock(&mut self) -> Result<(), DbError>;
    async fn unlock(&mut self) -> Result<(), DbError>;
    /// Executes one migration body.
    async fn run(&mut self, script: &[u8]) -> Result<(), DbError>;
    /// Replaces the single ledger row atomically. `(NIL_VERSION, false)`
    /// clears the ledger.
    async fn set_version(&mut self, version: i64, dirty: bool) -> Result<(), DbError>;
    /// Reads the ledger; `(NIL_VERSION, false)` when absent or empty.
    async fn version(&mut self) -> Result<(i64, bool), DbError>;
    /// Removes all user-visible state and recreates an empty ledger.
    async fn drop_all(&mut self) -> Result<(), DbError>;
    async fn close(self) -> Result<(), DbError>;
}

#[derive(Debug)]
pub enum DatabaseBackend {
    Postgres(PostgresDriver),
    Stub(StubDriver),
}

impl DatabaseBackend {
    /// Selects and connects a driver by URL scheme.
    pub async fn open(url: &str) -> Result<Self, DbError> {
        let scheme = urlparse::scheme_of(url).unwrap_or("");
        match scheme {
            "postgres" | "postgresql" => {
                Ok(DatabaseBackend::Postgres(PostgresDriver::open(url).await?))
            }
            "stub" => Ok(DatabaseBackend::Stub(StubDriver::new())),
            other => Err(DbError {
                kind: DbErrorKind::UnknownScheme(other.to_string()),
            }),
        }
    }

    /// Sorted list of the URL schemes this build understands.
    pub fn schemes() -> &'static [&'static str] {
        &["postgres", "postgresql", "stub"]
    }

    pub async fn lock(&mut self) -> Result<(), DbError> {
        match self {
            DatabaseBackend::Postgres(driver) => driver.lock().await,
            DatabaseBackend::Stub(driver) => driver.lock().await,
        }
    }

    pub async fn unlock(&mut self) -> Result<(), DbError> {
        match self {
            DatabaseBackend::Postgres(driver) => driver.unlock().await,
            DatabaseBackend::Stub(driver) => driver.unlock().await,
        }
    }

    pub async fn run(&mut self, script: &[u8]) -> Result<(), DbError> {
        match self {
            DatabaseBackend::Postgres(driver) => driver.run(script).await,
            DatabaseBackend::Stub(driver) => driver.run(script).await,
        }
    }

    pub async fn set_version(&mut self, version: i64, dirty: bool) -> Result<(), DbError> {
        match self {
            DatabaseBackend::Postgres(driver) => driver.set_version(version, dirty).await,
            DatabaseBackend::Stub(driver) => driver.set_version(version, dirty).await,
        }
    }

    pub async fn version(&mut self) -> Result<(i64, bool), DbError> {
        match self {
            DatabaseBackend::Postgres(driver) => driver.version().await,
            DatabaseBackend::Stub(driver) => driver.version().await,
        }
    }

    pub async fn drop_all(&mut self) -> Result<(), DbError> {
        match self {
            DatabaseBackend::Postgres(driver) => driver.drop_all().await,
            DatabaseBackend::Stub(driver) => driver.drop_all().await,
        }
    }

    pub async fn close(self) -> Result<(), DbError> {
        match self {
            DatabaseBackend::Postgres(driver) => driver.close().await,
            DatabaseBackend::Stub(driver) => driver.close().await,
        }
    }
}
