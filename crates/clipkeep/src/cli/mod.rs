//! Command-line interface for clipkeep.
//!
//! This module provides the CLI structure for the `clipkeep` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BackendArg, ConfigCommand, DaemonCommand, ItemCommand, ListCommand, PruneCommand,
    RescanCommand, StatusCommand, ThreatsCommand,
};

/// clipkeep - Clipboard history with selection stabilization
///
/// Watches the clipboard, collapses drag-selection bursts into the final
/// selection, flags secrets, and keeps a deduplicated history.
#[derive(Debug, Parser)]
#[command(name = "clipkeep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture the clipboard in the foreground until interrupted
    Daemon(DaemonCommand),

    /// List history items
    List(ListCommand),

    /// Pin an item to the top of the history
    Pin(ItemCommand),

    /// Unpin an item
    Unpin(ItemCommand),

    /// Delete an item
    Delete(ItemCommand),

    /// Remove duplicate items left by older versions
    Dedupe,

    /// Remove empty and single-character items
    Prune(PruneCommand),

    /// Reclassify every text item
    Rescan(RescanCommand),

    /// Manage dismissed threats
    #[command(subcommand)]
    Threats(ThreatsCommand),

    /// Show history status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ThreatType;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "clipkeep");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        use crate::logging::Verbosity;

        assert_eq!(parse(&["clipkeep", "-q", "status"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["clipkeep", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["clipkeep", "-v", "status"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["clipkeep", "-vv", "status"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_daemon() {
        let cli = parse(&["clipkeep", "daemon", "--backend", "immediate"]);
        assert!(matches!(
            cli.command,
            Command::Daemon(DaemonCommand {
                backend: Some(BackendArg::Immediate)
            })
        ));
    }

    #[test]
    fn test_parse_list() {
        let cli = parse(&["clipkeep", "list", "--limit", "5", "--json"]);
        let Command::List(list) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(list.limit, 5);
        assert_eq!(list.offset, 0);
        assert!(list.json);
    }

    #[test]
    fn test_parse_item_commands() {
        assert!(matches!(
            parse(&["clipkeep", "pin", "7"]).command,
            Command::Pin(ItemCommand { id: 7 })
        ));
        assert!(matches!(
            parse(&["clipkeep", "unpin", "7"]).command,
            Command::Unpin(ItemCommand { id: 7 })
        ));
        assert!(matches!(
            parse(&["clipkeep", "delete", "3"]).command,
            Command::Delete(ItemCommand { id: 3 })
        ));
        assert!(Cli::try_parse_from(["clipkeep", "pin", "abc"]).is_err());
    }

    #[test]
    fn test_parse_maintenance() {
        assert!(matches!(parse(&["clipkeep", "dedupe"]).command, Command::Dedupe));
        let Command::Prune(prune) = parse(&["clipkeep", "prune", "--single-char"]).command else {
            panic!("expected prune");
        };
        assert_eq!(prune.targets(), (false, true));
        assert!(matches!(
            parse(&["clipkeep", "rescan", "--json"]).command,
            Command::Rescan(RescanCommand { json: true })
        ));
    }

    #[test]
    fn test_parse_threats() {
        let cli = parse(&["clipkeep", "threats", "list", "--type", "api_key"]);
        assert!(matches!(
            cli.command,
            Command::Threats(ThreatsCommand::List {
                threat_type: Some(ThreatType::ApiKey),
                json: false
            })
        ));
        assert!(Cli::try_parse_from(["clipkeep", "threats", "list", "--type", "bogus"]).is_err());

        let cli = parse(&["clipkeep", "threats", "cleanup", "--days", "7"]);
        assert!(matches!(
            cli.command,
            Command::Threats(ThreatsCommand::Cleanup { days: 7 })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["clipkeep", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
