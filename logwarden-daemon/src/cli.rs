//! CLI argument definitions for logwarden-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Logwarden log classification and alerting daemon.
///
/// Reads log records, classifies them on a priority scheduler,
/// and evaluates alert rules against the resulting metrics.
#[derive(Parser, Debug)]
#[command(name = "logwarden-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logwarden.toml configuration file.
    ///
    /// When the file does not exist the built-in defaults are used.
    #[arg(short, long, default_value = "/etc/logwarden/logwarden.toml")]
    pub config: PathBuf,

    /// Log input to ingest: a file of JSON lines or plain text, or `-` for stdin.
    ///
    /// Without an input the daemon only evaluates alert rules.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = DaemonCli::parse_from(["logwarden-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/logwarden/logwarden.toml"));
        assert!(cli.input.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn overrides() {
        let cli = DaemonCli::parse_from([
            "logwarden-daemon",
            "-c",
            "./logwarden.toml",
            "--input",
            "-",
            "--log-format",
            "pretty",
            "--validate",
        ]);
        assert_eq!(cli.config, PathBuf::from("./logwarden.toml"));
        assert_eq!(cli.input, Some(PathBuf::from("-")));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert!(cli.validate);
    }
}
