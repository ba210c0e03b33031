//! Command-line interface handling for the zonevoice router.
//!
//! This module provides command-line argument parsing using the `clap`
//! builder API. Every flag overrides the matching configuration file value.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the ingress bind address
    pub bind_address: Option<String>,
    /// Optional override for the backend bridge URL
    pub backend_url: Option<String>,
    /// Optional override for the virtual server to route on
    pub server_id: Option<i32>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Whether to route against an in-memory backend instead of the bridge
    pub dry_run: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    ///
    /// Exits the process with a usage message on invalid input, like any
    /// clap-based binary.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            backend_url: matches.get_one::<String>("backend-url").cloned(),
            server_id: matches.get_one::<i32>("server-id").copied(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            dry_run: matches.get_flag("dry-run"),
        }
    }
}

fn command() -> Command {
    Command::new("zonevoice")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Moves players between voice channels as they move between game zones")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Location ingress bind address (e.g., 0.0.0.0:8765)"),
        )
        .arg(
            Arg::new("backend-url")
                .long("backend-url")
                .value_name("URL")
                .help("Voice backend bridge URL (e.g., ws://127.0.0.1:6502)"),
        )
        .arg(
            Arg::new("server-id")
                .long("server-id")
                .value_name("ID")
                .help("Virtual voice server to route on")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Use an in-memory voice backend seeded from the zone table")
                .action(clap::ArgAction::SetTrue),
        )
}
