pub mod commands;
pub mod output;
pub mod ux;

pub use clap::{Parser, Subcommand};

use crate::migrator;

#[derive(Parser)]
#[command(
    name = "stratum",
    version,
    about = "Stratum applies ordered, versioned schema migrations from a pluggable source to a pluggable database."
)]
pub struct Cli {
    #[arg(
        long = "source",
        help = "Migration source URL, e.g. file://./migrations\n",
        env = "SOURCE_URL"
    )]
    pub source: String,

    #[arg(
        long = "database",
        help = "Database connection URL. Please follow your database's recommended format, e.g.:
    postgresql://<username>:<password>@<host>:<port>/<database>\n",
        env = "DATABASE_URL",
        hide_env_values = true
    )]
    pub database: String,

    #[arg(
        long,
        help = "Number of migration bodies to stage ahead of execution.",
        default_value_t = migrator::DEFAULT_PREFETCH,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub prefetch: usize,

    #[arg(
        long = "lock-timeout",
        help = "Seconds to keep retrying the database lock before giving up.",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub lock_timeout: u64,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Set level of verbosity. [default: INFO]\n\t-v: DEBUG\n\t-vv: TRACE\n--quiet takes precedence over --verbose."
    )]
    pub verbose: u8,

    #[arg(
        short,
        long,
        action = clap::ArgAction::SetTrue,
        help = "Disable all information logs (only ERROR level logs are shown).\n--quiet takes precedence over --verbose."
    )]
    pub quiet: bool,

    #[arg(
        long,
        action = clap::ArgAction::SetTrue,
        help = "Enable JSON output format. Human readable output is disabled when this flag is set."
    )]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply all up migrations, or only the next N.")]
    Up {
        #[arg(value_name = "N", value_parser = clap::value_parser!(i64).range(1..))]
        n: Option<i64>,
    },

    #[command(about = "Apply all down migrations, or only the next N.")]
    Down {
        #[arg(value_name = "N", value_parser = clap::value_parser!(i64).range(1..))]
        n: Option<i64>,

        #[arg(short, long, help = "Skip the confirmation prompt for a full rollback.")]
        yes: bool,
    },

    #[command(about = "Migrate to an exact version, up or down as needed.")]
    Goto {
        #[arg(value_name = "V", value_parser = clap::value_parser!(i64).range(0..))]
        version: i64,
    },

    #[command(about = "Set the ledger to a version and clear the dirty flag. No scripts run.")]
    Force {
        #[arg(value_name = "V", allow_hyphen_values = true)]
        version: i64,
    },

    #[command(about = "Print the current migration version.")]
    Version {},

    #[command(about = "Drop everything in the target database, then recreate an empty ledger.")]
    Drop {
        #[arg(short, long, help = "Skip the confirmation prompt.")]
        yes: bool,
    },

    #[command(about = "Create an empty up/down migration file pair.")]
    Create {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(long, default_value = "sql", help = "File extension for the pair.")]
        ext: String,

        #[arg(
            long,
            help = "Directory to create the files in. Defaults to the file:// source path."
        )]
        dir: Option<String>,

        #[arg(long, help = "Use a sequential version number instead of a timestamp.")]
        seq: bool,

        #[arg(
            long,
            default_value = "%Y%m%d%H%M%S",
            help = "chrono format string for timestamp versions."
        )]
        format: String,

        #[arg(long, default_value_t = 6, help = "Zero-padded width of sequential versions.")]
        digits: usize,
    },
}

impl std::fmt::Display for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Commands::Up { .. } => "up",
            Commands::Down { .. } => "down",
            Commands::Goto { .. } => "goto",
            Commands::Force { .. } => "force",
            Commands::Version { .. } => "version",
            Commands::Drop { .. } => "drop",
            Commands::Create { .. } => "create",
        };
        write!(f, "{name}")
    }
}
