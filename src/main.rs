use clap::Parser;
use stratum::cli::{self, commands, ux};

/// Entry point for the Stratum CLI tool.
///
/// This program manages database migrations by delegating to subcommands:
/// - `up` / `down`: Apply or revert migrations, all of them or a step count.
/// - `goto`: Migrate to an exact version in either direction.
/// - `force`: Overwrite the recorded version without running scripts.
/// - `version`: Print the current migration version.
/// - `drop`: Remove everything from the target database.
/// - `create`: Emit an empty up/down migration file pair.
///
/// The source and database are selected by URL (`--source`, `--database`);
/// everything after the scheme belongs to the matching driver.
#[tokio::main]
async fn main() {
    let args: cli::Cli = cli::Cli::parse();

    ux::setup_logging(args.verbose, args.quiet, args.json);

    if commands::run(args).await.is_err() {
        std::process::exit(1);
    }
}
