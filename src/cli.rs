//! Autoplant CLI
//!
//! Commands:
//! - `autoplant run` - Run the simulated plant
//! - `autoplant decode` - Parse one text message
//! - `autoplant config` - Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Three-tier manufacturing control simulation
#[derive(Parser, Debug)]
#[command(name = "autoplant")]
#[command(author, version, about = "Unit, site and global control of a simulated plant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the plant until Ctrl+C or the duration elapses
    Run {
        /// Configuration directory
        #[arg(short, long, default_value = "config", env = "AUTOPLANT_CONFIG_DIR")]
        config: PathBuf,
        /// Stop after this many seconds
        #[arg(short, long)]
        duration_secs: Option<u64>,
        /// Seed every random draw (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,
        /// Print supervisor and coordinator snapshots as JSON before exiting
        #[arg(long)]
        report: bool,
    },

    /// Parse one text message (e.g. "TASK:T1:5") and print its typed form
    Decode {
        text: String,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration directory
        #[arg(short, long, default_value = "config", env = "AUTOPLANT_CONFIG_DIR")]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments() {
        let cli = Cli::parse_from(["autoplant", "run", "--duration-secs", "30", "--seed", "7", "--report"]);
        match cli.command {
            Commands::Run {
                config,
                duration_secs,
                seed,
                report,
            } => {
                assert_eq!(config, PathBuf::from("config"));
                assert_eq!(duration_secs, Some(30));
                assert_eq!(seed, Some(7));
                assert!(report);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_takes_raw_text() {
        let cli = Cli::parse_from(["autoplant", "decode", "FAILURE:M2:ERROR_CODE:E500"]);
        assert!(matches!(cli.command, Commands::Decode { text } if text == "FAILURE:M2:ERROR_CODE:E500"));
    }
}
