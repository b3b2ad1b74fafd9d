use crate::db::DatabaseBackend;
use crate::error::{MigrateError, MigrateErrorKind};
use crate::migration::{Direction, Migration, NIL_VERSION};
use crate::source::{SourceBackend, SourceError, SourceErrorKind};

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const DEFAULT_PREFETCH: usize = 10;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared flag for stopping a run at the next version boundary.
///
/// The consumer checks it between migrations: the one currently executing
/// finishes both ledger writes, then the traversal ends cleanly.
#[derive(Clone, Debug, Default)]
pub struct GracefulStop {
    flag: Arc<AtomicBool>,
}

impl GracefulStop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// What a single engine command asks of the traversal.
enum Op {
    Up { limit: Option<usize> },
    Down { limit: Option<usize> },
    Goto { target: i64 },
}

/// The version-aware state machine driving migrations from a source into a
/// database, with a bounded prefetch pipeline in between.
pub struct Migrator {
    source: Arc<SourceBackend>,
    db: DatabaseBackend,
    prefetch: usize,
    lock_timeout: Duration,
    stop: GracefulStop,
}

impl Migrator {
    pub fn new(source: SourceBackend, db: DatabaseBackend) -> Self {
        Migrator {
            source: Arc::new(source),
            db,
            prefetch: DEFAULT_PREFETCH,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stop: GracefulStop::new(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn stop_handle(&self) -> GracefulStop {
        self.stop.clone()
    }

    /// Applies every up migration above the current version.
    pub async fn up(&mut self) -> Result<(), MigrateError> {
        self.run_op(Op::Up { limit: None }).await
    }

    /// Applies every down migration at or below the current version,
    /// finishing at `NIL_VERSION`.
    pub async fn down(&mut self) -> Result<(), MigrateError> {
        self.run_op(Op::Down { limit: None }).await
    }

    /// Applies up to `n` migrations: upward for positive `n`, downward for
    /// negative. Exhausting the source early still counts as success.
    pub async fn steps(&mut self, n: i64) -> Result<(), MigrateError> {
        if n == 0 {
            return Err(MigrateError {
                kind: MigrateErrorKind::NoChange,
            });
        }
        let limit = Some(n.unsigned_abs() as usize);
        if n > 0 {
            self.run_op(Op::Up { limit }).await
        } else {
            self.run_op(Op::Down { limit }).await
        }
    }

    /// Moves to the exact version `target`, inferring the direction.
    pub async fn migrate(&mut self, target: i64) -> Result<(), MigrateError> {
        if target < NIL_VERSION {
            return Err(MigrateError {
                kind: MigrateErrorKind::InvalidVersion(target),
            });
        }
        self.run_op(Op::Goto { target }).await
    }

    /// Writes `(target, dirty = false)` without running any script. The
    /// operator escape hatch: the target need not exist in the source.
    pub async fn force(&mut self, target: i64) -> Result<(), MigrateError> {
        if target < NIL_VERSION {
            return Err(MigrateError {
                kind: MigrateErrorKind::InvalidVersion(target),
            });
        }

        self.acquire_lock().await?;
        let outcome = self.db.set_version(target, false).await;
        let unlock = self.db.unlock().await;
        outcome?;
        unlock?;
        Ok(())
    }

    /// Drops all user-visible state; the ledger reads as `NIL_VERSION`
    /// afterwards.
    pub async fn drop_all(&mut self) -> Result<(), MigrateError> {
        self.acquire_lock().await?;
        let outcome = self.db.drop_all().await;
        let unlock = self.db.unlock().await;
        outcome?;
        unlock?;
        Ok(())
    }

    pub async fn version(&mut self) -> Result<(i64, bool), MigrateError> {
        Ok(self.db.version().await?)
    }

    /// Releases the source and the database connection.
    pub async fn close(self) -> Result<(), MigrateError> {
        self.source.close()?;
        self.db.close().await?;
        Ok(())
    }

    async fn run_op(&mut self, op: Op) -> Result<(), MigrateError> {
        self.acquire_lock().await?;
        let outcome = self.run_locked(op).await;
        let unlock = self.db.unlock().await;
        outcome?;
        unlock?;
        Ok(())
    }

    /// Polls the driver's single-shot lock with backoff until it is acquired
    /// or `lock_timeout` elapses.
    async fn acquire_lock(&mut self) -> Result<(), MigrateError> {
        let deadline = Instant::now() + self.lock_timeout;
        let mut backoff = Duration::from_millis(50);

        loop {
            match self.db.lock().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_locked() => {
                    if Instant::now() >= deadline {
                        return Err(MigrateError {
                            kind: MigrateErrorKind::Locked,
                        });
                    }
                    tokio::time::sleep(backoff.min(deadline - Instant::now())).await;
                    backoff = (backoff * 2).min(Duration::from_secs(1));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn run_locked(&mut self, op: Op) -> Result<(), MigrateError> {
        let (version, dirty) = self.db.version().await?;
        if dirty {
            return Err(MigrateError {
                kind: MigrateErrorKind::DirtyDatabase { version },
            });
        }

        let plan = match op {
            Op::Up { limit } => self.plan_up(version, None, limit)?,
            Op::Down { limit } => self.plan_down(version, NIL_VERSION, limit)?,
            Op::Goto { target } => {
                if target == version {
                    Vec::new()
                } else if target > version {
                    self.plan_up(version, Some(target), None)?
                } else {
                    self.plan_down(version, target, None)?
                }
            }
        };

        if plan.is_empty() {
            return Err(MigrateError {
                kind: MigrateErrorKind::NoChange,
            });
        }

        self.execute_plan(plan).await
    }

    /// Ascending walk from `from`, bounded by an optional inclusive ceiling
    /// and an optional step count.
    fn plan_up(
        &self,
        from: i64,
        ceiling: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<Migration>, MigrateError> {
        let mut plan = Vec::new();
        let mut current = from;

        while limit.is_none_or(|n| plan.len() < n) {
            let next = if current == NIL_VERSION {
                self.source.first()
            } else {
                self.source.next(current)
            };
            let next = match next {
                Ok(v) => v,
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e.into()),
            };
            if ceiling.is_some_and(|c| next > c) {
                break;
            }

            let identifier = self.probe(next, Direction::Up)?;
            plan.push(Migration::new(current, next, identifier, Direction::Up));
            current = next;
        }

        Ok(plan)
    }

    /// Descending walk from `from` towards `floor` (exclusive), each step
    /// landing on the predecessor version or `NIL_VERSION` below the first.
    fn plan_down(
        &self,
        from: i64,
        floor: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Migration>, MigrateError> {
        let mut plan = Vec::new();
        let mut current = from;

        while current != NIL_VERSION && current > floor && limit.is_none_or(|n| plan.len() < n) {
            let identifier = self.probe(current, Direction::Down)?;
            let target = match self.source.prev(current) {
                Ok(v) => v,
                Err(e) if e.is_not_found() => NIL_VERSION,
                Err(e) => return Err(e.into()),
            };
            plan.push(Migration::new(current, target, identifier, Direction::Down));
            current = target;
        }

        Ok(plan)
    }

    /// Confirms the artifact exists before anything executes and captures its
    /// identifier; the body reader is dropped unread, the prefetcher opens
    /// its own.
    fn probe(&self, version: i64, direction: Direction) -> Result<String, MigrateError> {
        let read = match direction {
            Direction::Up => self.source.read_up(version),
            Direction::Down => self.source.read_down(version),
        };
        match read {
            Ok(body) => Ok(body.identifier),
            Err(e) if e.is_not_found() => Err(MigrateError {
                kind: MigrateErrorKind::MissingDirection { version, direction },
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Streams the plan through a bounded channel: one producer staging
    /// bodies from the source, the consumer applying them in order.
    async fn execute_plan(&mut self, plan: Vec<Migration>) -> Result<(), MigrateError> {
        let total = plan.len();
        let (tx, mut rx) = mpsc::channel::<Result<Migration, SourceError>>(self.prefetch);
        let source = Arc::clone(&self.source);
        let stop = self.stop.clone();

        let producer = tokio::spawn(async move {
            for migration in plan {
                if stop.is_stopped() {
                    break;
                }
                let staged = stage(&source, migration);
                let failed = staged.is_err();
                if tx.send(staged).await.is_err() {
                    // Consumer went away; nothing left to feed.
                    break;
                }
                if failed {
                    break;
                }
            }
        });

        let mut outcome: Result<(), MigrateError> = Ok(());
        let mut applied = 0usize;

        while let Some(staged) = rx.recv().await {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested, halting at a clean version boundary");
                break;
            }
            let migration = match staged {
                Ok(m) => m,
                Err(e) => {
                    outcome = Err(e.into());
                    break;
                }
            };
            if let Err(e) = self.apply(&migration).await {
                outcome = Err(e);
                break;
            }
            applied += 1;
        }

        // Dropping the receiver unblocks a producer waiting on a full
        // channel; it observes the closed channel and exits.
        drop(rx);
        let _ = producer.await;

        outcome?;
        tracing::debug!("Applied {applied} of {total} planned migrations");
        Ok(())
    }

    /// One execution step: mark dirty, run the body, mark clean. A failed
    /// run leaves the ledger dirty so an operator has to intervene.
    async fn apply(&mut self, migration: &Migration) -> Result<(), MigrateError> {
        let started = Instant::now();
        tracing::debug!(
            "{} to version {}...",
            migration.direction.verb(),
            migration.target_version
        );

        self.db.set_version(migration.target_version, true).await?;
        let body = migration.body.as_deref().unwrap_or_default();
        self.db.run(body).await?;
        self.db.set_version(migration.target_version, false).await?;

        tracing::info!("{} ({:?})", migration, started.elapsed());
        Ok(())
    }
}

/// Producer half: opens the body reader and drains it into the record.
fn stage(source: &SourceBackend, mut migration: Migration) -> Result<Migration, SourceError> {
    let version = migration.artifact_version();
    let script = match migration.direction {
        Direction::Up => source.read_up(version),
        Direction::Down => source.read_down(version),
    }?;

    let mut reader = script.reader;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(|e| SourceError {
        kind: SourceErrorKind::Read {
            version,
            direction: migration.direction,
            source: e,
        },
    })?;

    migration.body = Some(buf);
    Ok(migration)
}
