//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays reserved for command results.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;
use crate::cli::LogFormat;

/// Picks the filter: explicit `--log-level`, then `RUST_LOG`, then a level
/// derived from `--verbose` / `--quiet`.
fn filter(cli: &Cli) -> EnvFilter {
    if let Some(directive) = &cli.log_level {
        return EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(cli)))
}

const fn default_level(cli: &Cli) -> &'static str {
    if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    }
}

/// Installs the global subscriber. Safe to call once per process.
pub fn init(cli: &Cli) {
    let registry = tracing_subscriber::registry().with(filter(cli));

    // An already installed subscriber is kept.
    let _ = match cli.log_format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_level_follows_verbosity() {
        let quiet = Cli::try_parse_from(["sandconv", "-q", "sweep"]).unwrap();
        assert_eq!(default_level(&quiet), "error");

        let verbose = Cli::try_parse_from(["sandconv", "-v", "sweep"]).unwrap();
        assert_eq!(default_level(&verbose), "debug");

        let plain = Cli::try_parse_from(["sandconv", "sweep"]).unwrap();
        assert_eq!(default_level(&plain), "info");
    }
}
