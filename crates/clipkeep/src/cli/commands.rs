//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::config::BackendKind;
use crate::security::ThreatType;

/// Daemon command arguments.
#[derive(Debug, Args)]
pub struct DaemonCommand {
    /// Override the configured clipboard backend
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Maximum number of items to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Number of items to skip
    #[arg(short, long, default_value = "0")]
    pub offset: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Arguments for commands acting on one history item.
#[derive(Debug, Args)]
pub struct ItemCommand {
    /// The item id, as shown by `list`
    pub id: i64,
}

/// Prune command arguments.
///
/// Passing neither flag prunes both kinds.
#[derive(Debug, Args)]
pub struct PruneCommand {
    /// Remove empty and whitespace-only items
    #[arg(long)]
    pub empty: bool,

    /// Remove single-character items
    #[arg(long)]
    pub single_char: bool,
}

impl PruneCommand {
    /// The `(empty, single_char)` flags to prune with.
    #[must_use]
    pub fn targets(&self) -> (bool, bool) {
        if self.empty || self.single_char {
            (self.empty, self.single_char)
        } else {
            (true, true)
        }
    }
}

/// Rescan command arguments.
#[derive(Debug, Args)]
pub struct RescanCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Threat memory commands.
#[derive(Debug, Subcommand)]
pub enum ThreatsCommand {
    /// List dismissed threats
    List {
        /// Only show this threat type (e.g. `api_key`, `password`)
        #[arg(short = 't', long = "type")]
        threat_type: Option<ThreatType>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Forget a dismissed threat by hash
    Remove {
        /// The content hash, as shown by `threats list`
        hash: String,
    },

    /// Forget threats not seen for a number of days
    Cleanup {
        /// Age in days
        #[arg(short, long, default_value = "30")]
        days: u64,
    },

    /// Show threat memory statistics
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Classify text and remember it as dismissed
    Dismiss {
        /// The text to dismiss
        text: String,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Backend argument for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Watch-notified on Wayland, immediate reads elsewhere
    Auto,
    /// Read the clipboard on every tick
    Immediate,
    /// Use the clipboard watcher
    Watch,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => Self::Auto,
            BackendArg::Immediate => Self::Immediate,
            BackendArg::Watch => Self::Watch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_arg_conversion() {
        assert_eq!(BackendKind::from(BackendArg::Auto), BackendKind::Auto);
        assert_eq!(
            BackendKind::from(BackendArg::Immediate),
            BackendKind::Immediate
        );
        assert_eq!(BackendKind::from(BackendArg::Watch), BackendKind::Watch);
    }

    #[test]
    fn test_prune_targets_default_to_both() {
        let cmd = PruneCommand {
            empty: false,
            single_char: false,
        };
        assert_eq!(cmd.targets(), (true, true));
    }

    #[test]
    fn test_prune_targets_explicit() {
        let cmd = PruneCommand {
            empty: true,
            single_char: false,
        };
        assert_eq!(cmd.targets(), (true, false));

        let cmd = PruneCommand {
            empty: false,
            single_char: true,
        };
        assert_eq!(cmd.targets(), (false, true));
    }

    #[test]
    fn test_status_command_debug() {
        let cmd = StatusCommand { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("json"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
