use std::io::{self, BufRead, Write};

pub fn setup_logging(verbose: u8, quiet: bool, json: bool) {
    if json {
        // Mute all logging if JSON output is enabled so stdout stays machine-readable.
        tracing::subscriber::set_global_default(tracing::subscriber::NoSubscriber::default())
            .expect("Setting no-op subscriber failed");
        return;
    }

    let level = if quiet {
        tracing::Level::ERROR
    } else {
        match verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed!");
}

/// Asks the user before a destructive command goes ahead.
pub fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Human-readable rendering of a ledger reading.
pub fn format_version(version: i64, dirty: bool) -> String {
    if version == crate::migration::NIL_VERSION {
        "nil".to_string()
    } else if dirty {
        format!("{version} (dirty)")
    } else {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::NIL_VERSION;

    #[test]
    fn version_rendering_covers_the_three_states() {
        assert_eq!(format_version(NIL_VERSION, false), "nil");
        assert_eq!(format_version(12, false), "12");
        assert_eq!(format_version(12, true), "12 (dirty)");
    }
}
