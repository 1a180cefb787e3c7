//! CLI argument parsing: the three verbs this driver exposes. Grounded on
//! the teacher's `clap`-derive style (subcommand enum + one args struct per
//! verb), trimmed from obtain/renew/daemon/info/account/serve down to the
//! verbs that make sense once renewal is config-driven rather than
//! invocation-driven.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "acmed")]
#[command(about = "ACME v2 renewal driver for a configured set of managed domains", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, short, long, default_value = "info")]
    pub log_level: String,

    /// Path to the TOML config file
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the renewal supervisor and status server until killed
    Run(RunArgs),

    /// Run exactly one supervisor tick, then exit
    Once,

    /// Print the current status view for every managed domain
    Status,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Override the configured tick interval, in seconds
    #[arg(long)]
    pub tick_interval_secs: Option<u64>,
}
