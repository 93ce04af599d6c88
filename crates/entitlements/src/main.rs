//! `entl` - CLI for entitlements
//!
//! This binary provides the command-line interface for inspecting and
//! changing a user's subscription.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use entitlements::cli::{
    Cli, Command, ConfigCommand, FeatureCommand, LimitCommand, StatusCommand, TiersCommand,
    UpgradeCommand,
};
use entitlements::tier::{FREE, PREMIUM};
use entitlements::{
    init_logging, Config, EntitlementService, Feature, Limit, SubscriptionRecord, UserId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let Cli {
        config: config_path,
        user,
        command,
        ..
    } = cli;

    match command {
        // Neither of these needs the store, and `config` must work with a broken config file
        Command::Tiers(cmd) => handle_tiers(&cmd),
        Command::Config(cmd) => handle_config(config_path, &cmd),
        Command::Status(cmd) => {
            let (service, user) = open_service(config_path, user)?;
            handle_status(&service, &user, &cmd)
        }
        Command::Upgrade(cmd) => {
            let (service, user) = open_service(config_path, user)?;
            handle_upgrade(&service, &user, &cmd).await
        }
        Command::Cancel => {
            let (service, user) = open_service(config_path, user)?;
            let record = service.cancel(&user).await?;
            println!("Cancelled subscription for {user}.");
            print_period(&record);
            Ok(())
        }
        Command::Reset(cmd) => {
            if !cmd.yes {
                println!("This will put {user} back on a fresh free subscription.");
                println!("Use --yes to confirm.");
                return Ok(());
            }
            let (service, user) = open_service(config_path, user)?;
            service.reset(&user).await?;
            println!("Reset {user} to the free tier.");
            Ok(())
        }
        Command::Feature(cmd) => {
            let (service, user) = open_service(config_path, user)?;
            handle_feature(&service, &user, &cmd)
        }
        Command::Limit(cmd) => {
            let (service, user) = open_service(config_path, user)?;
            handle_limit(&service, &user, &cmd)
        }
        Command::Users => {
            let (service, _) = open_service(config_path, user)?;
            for user in service.users()? {
                println!("{user}");
            }
            Ok(())
        }
    }
}

fn open_service(
    config_path: Option<PathBuf>,
    user: String,
) -> anyhow::Result<(EntitlementService, UserId)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    let user = UserId::new(user)?;
    let service = EntitlementService::from_config(&config)
        .with_context(|| format!("failed to open {}", config.database_path().display()))?;
    Ok((service, user))
}

fn handle_status(
    service: &EntitlementService,
    user: &UserId,
    cmd: &StatusCommand,
) -> anyhow::Result<()> {
    let summary = service.summary(user);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let tier = summary.effective_tier.definition();
    println!("entl status");
    println!("-----------");
    println!("User:          {}", summary.user);
    println!("State:         {}", summary.state);
    println!("Tier:          {} ({}/month)", tier.name, tier.price_display());
    println!("Premium:       {}", if summary.effectively_premium { "yes" } else { "no" });
    print_period(&summary.record);
    if let Some(days) = summary.days_until_expiry {
        println!("Days left:     {days}");
    }
    if let Some(customer) = &summary.record.customer_id {
        println!("Customer:      {customer}");
    }
    Ok(())
}

async fn handle_upgrade(
    service: &EntitlementService,
    user: &UserId,
    cmd: &UpgradeCommand,
) -> anyhow::Result<()> {
    let record = match service.upgrade(user, &cmd.proof()).await {
        Ok(record) => record,
        Err(e) if e.is_retryable() => bail!("{e} (nothing was changed; try again)"),
        Err(e) => return Err(e.into()),
    };
    println!("Upgraded {user} to Premium.");
    print_period(&record);
    Ok(())
}

fn handle_feature(
    service: &EntitlementService,
    user: &UserId,
    cmd: &FeatureCommand,
) -> anyhow::Result<()> {
    let feature: Feature = cmd.name.parse()?;
    let gate = service.feature_gate(user, feature);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&gate)?);
    } else if gate.has_access {
        println!("{feature}: available");
    } else {
        println!("{feature}: not available");
        if let Some(message) = gate.message {
            println!("{message}");
        }
    }
    Ok(())
}

fn handle_limit(
    service: &EntitlementService,
    user: &UserId,
    cmd: &LimitCommand,
) -> anyhow::Result<()> {
    let limit: Limit = cmd.name.parse()?;
    let report = service.usage(user, limit, cmd.usage);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{limit}: {} of {} used", report.usage, report.value);
    match report.remaining {
        Some(remaining) => println!("Remaining:     {remaining}"),
        None => println!("Remaining:     unlimited"),
    }
    println!(
        "Can add more:  {}",
        if report.within_limit { "yes" } else { "no" }
    );
    Ok(())
}

fn handle_tiers(cmd: &TiersCommand) -> anyhow::Result<()> {
    let tiers = [&FREE, &PREMIUM];

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&tiers)?);
        return Ok(());
    }

    for tier in tiers {
        println!("[{}] {}/month", tier.name, tier.price_display());
        println!("  Languages:   {}", tier.languages.join(", "));
        for feature in Feature::ALL {
            println!("  {:<20} {}", feature.as_str(), tier.feature(feature));
        }
        for limit in Limit::ALL {
            println!("  {:<20} {}", limit.as_str(), tier.limit(limit));
        }
        println!();
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = &Config::load_from(config_path).context("failed to load configuration")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Subscription]");
                println!("  Period (days):      {}", config.subscription.period_days);
                println!("  Cancellation:       {:?}", config.subscription.cancellation);
                println!(
                    "  Provider timeout:   {}s",
                    config.subscription.provider_timeout_secs
                );
                println!(
                    "  Payment method:     {}",
                    config.subscription.default_payment_method
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .clone()
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::load_from(Some(path.clone()))
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn print_period(record: &SubscriptionRecord) {
    println!("Started:       {}", record.start_date.format("%Y-%m-%d %H:%M UTC"));
    if let Some(end) = record.end_date {
        println!("Ends:          {}", end.format("%Y-%m-%d %H:%M UTC"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_validate_reports_invalid_file_as_error() {
        let bad = config_file("[subscription]\nperiod_days = 0");
        let cmd = ConfigCommand::Validate { file: None };

        assert!(handle_config(Some(bad.path().to_path_buf()), &cmd).is_err());
    }

    #[test]
    fn test_validate_explicit_file_ignores_broken_global_config() {
        let bad = config_file("[subscription]\nperiod_days = 0");
        let good = config_file("[subscription]\nperiod_days = 7");
        let cmd = ConfigCommand::Validate {
            file: Some(good.path().to_path_buf()),
        };

        assert!(handle_config(Some(bad.path().to_path_buf()), &cmd).is_ok());
    }

    #[test]
    fn test_show_fails_on_broken_config() {
        let bad = config_file("[subscription]\nprovider_timeout_secs = 0");
        let cmd = ConfigCommand::Show { json: true };

        assert!(handle_config(Some(bad.path().to_path_buf()), &cmd).is_err());
    }
}
