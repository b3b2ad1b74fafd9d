use crate::cli::output::CommandOutput;
use crate::cli::{Cli, Commands, ux};
use crate::db::DatabaseBackend;
use crate::error::{MigrateError, MigrateErrorKind};
use crate::migrator::Migrator;
use crate::source::{FileSource, SourceBackend, SourceError, SourceErrorKind};
use crate::urlparse;

use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Runs one CLI invocation end to end. An empty plan is logged and reported
/// as success; everything else surfaces to the exit code.
pub async fn run(cli: Cli) -> Result<(), MigrateError> {
    let command = cli.command.to_string();
    let json = cli.json;

    let mut result = dispatch(cli).await;
    if result.as_ref().is_err_and(|e| e.is_no_change()) {
        tracing::info!("No change");
        result = Ok(None);
    }

    if json {
        let output = CommandOutput::from_result(&command, &result);
        println!(
            "{}",
            serde_json::to_string(&output).unwrap_or_else(|_| "{}".to_string())
        );
    }

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::error!("{e}");
            Err(e)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<Option<Value>, MigrateError> {
    let Cli {
        source,
        database,
        prefetch,
        lock_timeout,
        command,
        json,
        ..
    } = cli;

    match command {
        Commands::Create {
            name,
            ext,
            dir,
            seq,
            format,
            digits,
        } => create(&source, &name, &ext, dir.as_deref(), seq, &format, digits),
        command => {
            let src = SourceBackend::open(&source)?;
            let db = DatabaseBackend::open(&database).await?;
            let mut migrator = Migrator::new(src, db)
                .with_prefetch(prefetch)
                .with_lock_timeout(Duration::from_secs(lock_timeout));

            // First interrupt stops at a clean version boundary; a second one
            // is left untrapped and kills the process.
            let stop = migrator.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received; finishing the current migration first");
                    stop.stop();
                }
            });

            let data = match command {
                Commands::Up { n: None } => {
                    migrator.up().await?;
                    None
                }
                Commands::Up { n: Some(count) } => {
                    migrator.steps(count).await?;
                    None
                }
                Commands::Down { n, yes } => {
                    if n.is_none() && !yes && !ux::confirm("Apply every down migration?") {
                        tracing::info!("Aborted");
                        None
                    } else {
                        match n {
                            Some(count) => migrator.steps(-count).await?,
                            None => migrator.down().await?,
                        }
                        None
                    }
                }
                Commands::Goto { version } => {
                    migrator.migrate(version).await?;
                    None
                }
                Commands::Force { version } => {
                    migrator.force(version).await?;
                    None
                }
                Commands::Version {} => {
                    let (version, dirty) = migrator.version().await?;
                    if !json {
                        println!("{}", ux::format_version(version, dirty));
                    }
                    Some(json!({ "version": version, "dirty": dirty }))
                }
                Commands::Drop { yes } => {
                    if !yes && !ux::confirm("Drop everything in the target database?") {
                        tracing::info!("Aborted");
                        None
                    } else {
                        migrator.drop_all().await?;
                        None
                    }
                }
                Commands::Create { .. } => unreachable!("handled before connecting"),
            };

            migrator.close().await?;
            Ok(data)
        }
    }
}

/// Emits an empty up/down file pair into the migration directory, numbered
/// sequentially or by timestamp.
fn create(
    source_url: &str,
    name: &str,
    ext: &str,
    dir: Option<&str>,
    seq: bool,
    format: &str,
    digits: usize,
) -> Result<Option<Value>, MigrateError> {
    let directory = match dir {
        Some(d) => PathBuf::from(d),
        None if urlparse::scheme_of(source_url) == Some("file") => {
            PathBuf::from(urlparse::opaque_of(source_url).unwrap_or(""))
        }
        None => {
            return Err(MigrateError {
                kind: MigrateErrorKind::Usage(
                    "create needs --dir when the source is not file://".to_string(),
                ),
            });
        }
    };

    let version = if seq {
        let existing = FileSource::open(&directory)?;
        let next = existing.index().last().map_or(1, |v| v + 1);
        format!("{next:0digits$}")
    } else {
        chrono::Utc::now().format(format).to_string()
    };

    let up_path = directory.join(format!("{version}_{name}.up.{ext}"));
    let down_path = directory.join(format!("{version}_{name}.down.{ext}"));

    for path in [&up_path, &down_path] {
        if path.exists() {
            return Err(MigrateError {
                kind: MigrateErrorKind::Usage(format!(
                    "refusing to overwrite existing file: {}",
                    path.display()
                )),
            });
        }
    }
    for path in [&up_path, &down_path] {
        fs::write(path, b"").map_err(|source| {
            MigrateError {
                kind: MigrateErrorKind::Source(SourceError {
                    kind: SourceErrorKind::Io {
                        path: path.clone(),
                        source,
                    },
                }),
            }
        })?;
        tracing::info!("Created {}", path.display());
    }

    Ok(Some(json!({
        "version": version,
        "up": up_path.display().to_string(),
        "down": down_path.display().to_string(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_create_numbers_from_the_existing_set() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();

        create("memory://", "first", "sql", Some(dir_str), true, "", 6).unwrap();
        assert!(dir.path().join("000001_first.up.sql").exists());
        assert!(dir.path().join("000001_first.down.sql").exists());

        create("memory://", "second", "sql", Some(dir_str), true, "", 6).unwrap();
        assert!(dir.path().join("000002_second.up.sql").exists());
    }

    #[test]
    fn timestamp_create_uses_the_format_string() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();

        let data = create("memory://", "ts", "sql", Some(dir_str), false, "%Y", 6)
            .unwrap()
            .unwrap();
        let version = data["version"].as_str().unwrap().to_string();
        assert_eq!(version.len(), 4);
        assert!(dir.path().join(format!("{version}_ts.up.sql")).exists());
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();

        // A coarse timestamp format collides on the second call.
        create("memory://", "taken", "sql", Some(dir_str), false, "%Y", 6).unwrap();
        let err =
            create("memory://", "taken", "sql", Some(dir_str), false, "%Y", 6).unwrap_err();
        assert!(matches!(err.kind, MigrateErrorKind::Usage(_)));
    }

    #[test]
    fn create_without_a_directory_needs_a_file_source() {
        let err = create("memory://", "x", "sql", None, true, "", 6).unwrap_err();
        assert!(matches!(err.kind, MigrateErrorKind::Usage(_)));
    }
}
