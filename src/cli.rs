use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

/// The command line interface for dut keel.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Talk to a simulated device instead of the serial port
    #[arg(long)]
    pub mock: bool,

    /// Log debug output to stdout
    #[arg(short, long)]
    pub verbose: bool,

    /// Also log to daily rotated files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The level of logs shown on stdout.
    pub fn stdout_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    /// Where file logging should go, if anywhere.
    pub fn file_logging(&self) -> Option<(Level, PathBuf)> {
        self.log_dir.clone().map(|dir| (Level::DEBUG, dir))
    }
}

/// Commands available in the command line interface.
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),

    /// List the serial ports available on this machine.
    Ports,

    /// Power cycle the device and follow it until it is ready for commands.
    Boot,

    /// Run commands on the device and print their output.
    Run {
        /// Power cycle the device first
        #[arg(long)]
        boot: bool,

        /// The commands to run, in order
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// Print everything the device says, and report unexpected restarts.
    Watch,
}

/// Helpful examples for users.
#[derive(Subcommand, Clone, Debug)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,
}
