//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::payment::PaymentProof;

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Upgrade command arguments.
#[derive(Debug, Args)]
pub struct UpgradeCommand {
    /// Payment provider customer identifier
    #[arg(long)]
    pub customer_id: String,

    /// Payment provider subscription identifier
    #[arg(long)]
    pub subscription_id: Option<String>,

    /// Payment method label (defaults to the configured method)
    #[arg(long)]
    pub payment_method: Option<String>,
}

impl UpgradeCommand {
    /// The payment proof these arguments describe.
    #[must_use]
    pub fn proof(&self) -> PaymentProof {
        PaymentProof {
            customer_id: self.customer_id.clone(),
            subscription_id: self.subscription_id.clone(),
            payment_method: self.payment_method.clone(),
        }
    }
}

/// Reset command arguments.
#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Feature check arguments.
#[derive(Debug, Args)]
pub struct FeatureCommand {
    /// Feature name, e.g. `cloudStorage`
    pub name: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Limit check arguments.
#[derive(Debug, Args)]
pub struct LimitCommand {
    /// Limit name, e.g. `recordings`
    pub name: String,

    /// Items currently in use
    #[arg(long, default_value = "0")]
    pub usage: u64,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Tier listing arguments.
#[derive(Debug, Args)]
pub struct TiersCommand {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_command_proof() {
        let cmd = UpgradeCommand {
            customer_id: "cus_9".to_string(),
            subscription_id: Some("sub_9".to_string()),
            payment_method: None,
        };
        let proof = cmd.proof();
        assert_eq!(proof.customer_id, "cus_9");
        assert_eq!(proof.subscription_id.as_deref(), Some("sub_9"));
        assert!(proof.payment_method.is_none());
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
