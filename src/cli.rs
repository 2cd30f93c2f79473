// =============================================================================
// CLI surface
// =============================================================================
//
// The minimum subcommands from spec §6, built with `clap` the way
// `guribe94-bog`'s workspace wires up its bot binaries (the teacher itself
// has no CLI parser — it's a single always-on server). Exit codes: 0
// success, 1 runtime error, 2 config error.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "scalper-engine", about = "Intraday options-scalping engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the JSON config file.
    #[arg(long, global = true, default_value = "config.json")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the engine using whichever broker mode the config selects.
    Start,
    /// Force paper-trading mode regardless of config.
    Paper,
    /// Force live-trading mode; requires broker credentials in the
    /// environment.
    Live,
    /// Print the current session's heartbeat and daily drawdown.
    Status,
    /// Print a report for one session.
    Report {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        latest: bool,
    },
    /// Export closed trades since a given date.
    Export {
        #[arg(long)]
        since: String,
    },
    /// Validate and print the effective configuration.
    Config,
    /// Print the engine version.
    Version,
}

/// Process exit codes per spec §6.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_RUNTIME_ERROR: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;
