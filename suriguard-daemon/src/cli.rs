//! CLI argument definitions for suriguard-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Suriguard network-flow anomaly detection daemon.
///
/// Tails a Suricata eve JSON log, scores each flow event with a
/// precomputed model, and persists detected anomalies for downstream
/// consumers (status API, dashboard).
#[derive(Parser, Debug)]
#[command(name = "suriguard-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to suriguard.toml configuration file.
    #[arg(short, long, default_value = "/etc/suriguard/suriguard.toml")]
    pub config: PathBuf,

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
