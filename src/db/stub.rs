use crate::db::{Database, DbError, DbErrorKind};
use crate::migration::NIL_VERSION;
use crate::migrator::GracefulStop;

use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct StubState {
    version: i64,
    dirty: bool,
    lock_taken: bool,
    executed: Vec<String>,
    ledger_writes: Vec<(i64, bool)>,
    drops: usize,
    fail_matching: Option<String>,
    stop_on: Option<(String, GracefulStop)>,
}

impl StubState {
    fn new() -> Self {
        StubState {
            version: NIL_VERSION,
            dirty: false,
            lock_taken: false,
            executed: Vec::new(),
            ledger_writes: Vec::new(),
            drops: 0,
            fail_matching: None,
            stop_on: None,
        }
    }
}

/// In-memory database driver for the engine test suite.
///
/// Executed bodies and every ledger write are journaled; drivers created via
/// [`StubDriver::sibling`] share one logical database, which makes lock
/// contention observable. It is stricter than the real drivers in one spot:
/// unlocking without holding reports `NotLocked`.
#[derive(Debug)]
pub struct StubDriver {
    state: Arc<Mutex<StubState>>,
    locked: bool,
}

impl StubDriver {
    pub fn new() -> Self {
        StubDriver {
            state: Arc::new(Mutex::new(StubState::new())),
            locked: false,
        }
    }

    /// A second driver onto the same logical database.
    pub fn sibling(&self) -> Self {
        StubDriver {
            state: Arc::clone(&self.state),
            locked: false,
        }
    }

    /// Handle for inspecting (and steering) the shared state after the
    /// driver has been moved into a migrator.
    pub fn journal(&self) -> StubJournal {
        StubJournal {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for StubDriver {
    async fn lock(&mut self) -> Result<(), DbError> {
        if self.locked {
            return Err(DbError {
                kind: DbErrorKind::Locked,
            });
        }
        let mut state = self.state.lock().unwrap();
        if state.lock_taken {
            return Err(DbError {
                kind: DbErrorKind::Locked,
            });
        }
        state.lock_taken = true;
        self.locked = true;
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), DbError> {
        if !self.locked {
            return Err(DbError {
                kind: DbErrorKind::NotLocked,
            });
        }
        self.state.lock().unwrap().lock_taken = false;
        self.locked = false;
        Ok(())
    }

    async fn run(&mut self, script: &[u8]) -> Result<(), DbError> {
        let body = String::from_utf8_lossy(script).into_owned();
        let mut state = self.state.lock().unwrap();

        if let Some(marker) = &state.fail_matching {
            if body.contains(marker.as_str()) {
                return Err(DbError {
                    kind: DbErrorKind::Stub(format!("script matched '{marker}'")),
                });
            }
        }
        if let Some((marker, stop)) = &state.stop_on {
            if body.contains(marker.as_str()) {
                stop.stop();
            }
        }

        state.executed.push(body);
        Ok(())
    }

    async fn set_version(&mut self, version: i64, dirty: bool) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        state.version = version;
        state.dirty = dirty;
        state.ledger_writes.push((version, dirty));
        Ok(())
    }

    async fn version(&mut self) -> Result<(i64, bool), DbError> {
        let state = self.state.lock().unwrap();
        Ok((state.version, state.dirty))
    }

    async fn drop_all(&mut self) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        state.version = NIL_VERSION;
        state.dirty = false;
        state.drops += 1;
        Ok(())
    }

    async fn close(self) -> Result<(), DbError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct StubJournal {
    state: Arc<Mutex<StubState>>,
}

impl StubJournal {
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn ledger(&self) -> (i64, bool) {
        let state = self.state.lock().unwrap();
        (state.version, state.dirty)
    }

    pub fn ledger_writes(&self) -> Vec<(i64, bool)> {
        self.state.lock().unwrap().ledger_writes.clone()
    }

    pub fn drops(&self) -> usize {
        self.state.lock().unwrap().drops
    }

    /// Makes `run` fail for any script containing `marker`. Clears the
    /// injection when `None`.
    pub fn fail_scripts_matching(&self, marker: Option<&str>) {
        self.state.lock().unwrap().fail_matching = marker.map(str::to_string);
    }

    /// Flips the given stop flag when a script containing `marker` runs.
    pub fn stop_on_script(&self, marker: &str, stop: GracefulStop) {
        self.state.lock().unwrap().stop_on = Some((marker.to_string(), stop));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_across_siblings() {
        let mut first = StubDriver::new();
        let mut second = first.sibling();

        first.lock().await.unwrap();
        assert!(second.lock().await.unwrap_err().is_locked());

        first.unlock().await.unwrap();
        second.lock().await.unwrap();
        second.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn double_lock_on_one_driver_is_refused() {
        let mut driver = StubDriver::new();
        driver.lock().await.unwrap();
        assert!(driver.lock().await.unwrap_err().is_locked());
    }

    #[tokio::test]
    async fn unlock_without_holding_is_an_error() {
        let mut driver = StubDriver::new();
        let err = driver.unlock().await.unwrap_err();
        assert!(matches!(err.kind, DbErrorKind::NotLocked));
    }

    #[tokio::test]
    async fn ledger_and_journal_track_writes() {
        let mut driver = StubDriver::new();
        let journal = driver.journal();

        assert_eq!(driver.version().await.unwrap(), (NIL_VERSION, false));

        driver.set_version(2, true).await.unwrap();
        driver.run(b"CREATE TABLE t").await.unwrap();
        driver.set_version(2, false).await.unwrap();

        assert_eq!(driver.version().await.unwrap(), (2, false));
        assert_eq!(journal.executed(), vec!["CREATE TABLE t".to_string()]);
        assert_eq!(journal.ledger_writes(), vec![(2, true), (2, false)]);
    }

    #[tokio::test]
    async fn injected_failures_match_script_bodies() {
        let mut driver = StubDriver::new();
        let journal = driver.journal();
        journal.fail_scripts_matching(Some("boom"));

        assert!(driver.run(b"SELECT 1").await.is_ok());
        assert!(driver.run(b"SELECT boom").await.is_err());

        journal.fail_scripts_matching(None);
        assert!(driver.run(b"SELECT boom").await.is_ok());
    }

    #[tokio::test]
    async fn drop_resets_the_ledger() {
        let mut driver = StubDriver::new();
        let journal = driver.journal();

        driver.set_version(9, false).await.unwrap();
        driver.drop_all().await.unwrap();

        assert_eq!(driver.version().await.unwrap(), (NIL_VERSION, false));
        assert_eq!(journal.drops(), 1);
    }
}
