//! Command-line interface for voxrelay
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Speech-to-speech translation relay
#[derive(Parser, Debug)]
#[command(
    name = "voxrelay",
    version,
    about = "Speech-to-speech translation relay with admission control"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon (foreground process for systemd)
    Daemon {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxrelay.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Submit an audio file for translation
    Submit {
        /// Audio file to translate ("-" reads stdin)
        file: PathBuf,

        /// Spoken language (default: auto-detect). Examples: auto, en, ja
        #[arg(long, value_name = "LANG")]
        source: Option<String>,

        /// Language to translate into (default: from config)
        #[arg(long, value_name = "LANG")]
        target: Option<String>,

        /// Wait for the result instead of returning a request id
        #[arg(long, short = 'w')]
        wait: bool,

        /// Write the translated audio here (with --wait)
        #[arg(long, short = 'o', value_name = "FILE", requires = "wait")]
        output: Option<PathBuf>,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxrelay.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Poll a submitted request
    Status {
        /// Request id printed by `submit`
        id: String,

        /// Write the translated audio here once completed
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxrelay.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Show queue depths, concurrency and latency
    Stats {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxrelay.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Stop the daemon
    Shutdown {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxrelay.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file, defaults and env overrides)
    Show,
    /// Print the configuration file path
    Path,
}
