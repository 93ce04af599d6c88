//! Command-line interface for entitlements.
//!
//! This module provides the CLI structure for the `entl` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, FeatureCommand, LimitCommand, ResetCommand, StatusCommand, TiersCommand,
    UpgradeCommand,
};

/// entl - Inspect and manage subscription entitlements
///
/// Reads and updates per-user subscription records, and answers which
/// features and limits apply to a user right now.
#[derive(Debug, Parser)]
#[command(name = "entl")]
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

    /// User whose subscription to act on
    #[arg(short, long, global = true, default_value = "default")]
    pub user: String,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the user's subscription and entitlements
    Status(StatusCommand),

    /// Record a confirmed premium upgrade
    Upgrade(UpgradeCommand),

    /// Cancel the user's subscription
    Cancel,

    /// Put the user back on a fresh free subscription
    Reset(ResetCommand),

    /// Check whether the user has a feature
    Feature(FeatureCommand),

    /// Check a usage limit for the user
    Limit(LimitCommand),

    /// List the available tiers
    Tiers(TiersCommand),

    /// List users with a stored subscription
    Users,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            user: "default".to_string(),
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "entl");
    }

    #[test]
    fn test_verbosity() {
        use crate::logging::Verbosity;

        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
        // Quiet wins over verbose
        assert_eq!(cli(2, true).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status_defaults_user() {
        let cli = Cli::try_parse_from(["entl", "status"]).unwrap();
        assert!(matches!(cli.command, Command::Status(StatusCommand { json: false })));
        assert_eq!(cli.user, "default");
    }

    #[test]
    fn test_parse_global_user_after_subcommand() {
        let cli = Cli::try_parse_from(["entl", "cancel", "--user", "alice"]).unwrap();
        assert!(matches!(cli.command, Command::Cancel));
        assert_eq!(cli.user, "alice");
    }

    #[test]
    fn test_parse_upgrade() {
        let cli = Cli::try_parse_from([
            "entl",
            "upgrade",
            "--customer-id",
            "cus_1",
            "--subscription-id",
            "sub_1",
        ])
        .unwrap();
        let Command::Upgrade(cmd) = cli.command else {
            panic!("expected upgrade");
        };
        assert_eq!(cmd.customer_id, "cus_1");
        assert_eq!(cmd.subscription_id.as_deref(), Some("sub_1"));
        assert!(cmd.payment_method.is_none());
    }

    #[test]
    fn test_parse_upgrade_requires_customer() {
        assert!(Cli::try_parse_from(["entl", "upgrade"]).is_err());
    }

    #[test]
    fn test_parse_limit_with_usage() {
        let cli = Cli::try_parse_from(["entl", "limit", "recordings", "--usage", "4"]).unwrap();
        let Command::Limit(cmd) = cli.command else {
            panic!("expected limit");
        };
        assert_eq!(cmd.name, "recordings");
        assert_eq!(cmd.usage, 4);
    }

    #[test]
    fn test_parse_feature() {
        let cli = Cli::try_parse_from(["entl", "feature", "cloudStorage", "--json"]).unwrap();
        let Command::Feature(cmd) = cli.command else {
            panic!("expected feature");
        };
        assert_eq!(cmd.name, "cloudStorage");
        assert!(cmd.json);
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["entl", "-c", "/custom/config.toml", "users"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["entl", "-vv", "tiers"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["entl", "-q", "tiers"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["entl", "config", "validate", "-f", "x.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }
}
