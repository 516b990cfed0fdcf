use crate::app::App;
use crate::utils;
use anyhow::Context;
use colored::Colorize;
use mailstack_cloud::StatusReport;
use mailstack_cloud::provider::{DkimStatus, IdentityStatus};

fn dkim_label(status: DkimStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        DkimStatus::Success => label.green(),
        DkimStatus::Failed => label.red(),
        _ => label.yellow(),
    }
}

fn print_identity(identity: &IdentityStatus) {
    let verified = if identity.verified {
        "verified".green()
    } else {
        "unverified".yellow()
    };
    println!(
        "  {} ({}, DKIM {})",
        identity.name.cyan(),
        verified,
        dkim_label(identity.dkim_status)
    );
    if let Some(config_set) = &identity.config_set {
        println!("    configuration set: {}", config_set);
    }
    if let Some(mail_from) = &identity.mail_from_domain {
        println!("    MAIL FROM: {}", mail_from);
    }
}

fn print_report(report: &StatusReport) {
    let record = &report.record;

    println!("{}", "mailstack connection".bold());
    println!("  stack:       {}", record.stack_id.cyan());
    println!("  account:     {}", record.account_id);
    println!("  region:      {}", record.region);
    println!("  provider:    {}", record.provider.name());
    println!("  integration: {}", record.integration_level);
    println!("  preset:      {}", record.preset);
    if let Some(domain) = &record.domain {
        println!("  domain:      {}", domain);
    }
    println!(
        "  updated:     {}",
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    println!();
    println!("{}", "Features".bold());
    for (name, feature) in &record.features {
        let state = if feature.enabled {
            "on".green()
        } else {
            "off".dimmed()
        };
        match &feature.current_value {
            Some(value) => println!("  {:<16} {:<4} {} ({})", name.to_string(), state, feature.action, value),
            None => println!("  {:<16} {:<4} {}", name.to_string(), state, feature.action),
        }
    }

    let tracked: Vec<_> = record.identities.iter().filter(|i| i.is_restorable()).collect();
    if !tracked.is_empty() {
        println!();
        println!("{}", "Tracked identity changes".bold());
        for identity in tracked {
            println!(
                "  {} {} (was {})",
                identity.name,
                identity.action,
                identity.original_config_set.as_deref().unwrap_or("none")
            );
        }
    }

    println!();
    println!("{}", "Stack outputs".bold());
    match &report.outputs {
        Some(outputs) => {
            println!("  role:        {}", outputs.role_arn);
            if let Some(config_set) = outputs.config_set_name() {
                println!("  config set:  {}", config_set);
            }
            if let Some(history) = &outputs.history {
                println!("  history:     {}", history.table_name);
            }
            if let Some(edge) = &outputs.edge {
                let target = edge
                    .distribution_domain
                    .as_deref()
                    .unwrap_or("awaiting certificate validation");
                println!("  tracking:    {} → {}", edge.tracking_domain, target);
            }
            if let Some(archive) = &outputs.archive {
                println!("  archive:     {}", archive.archive_id);
            }
        }
        None => println!("  {}", "unavailable".yellow()),
    }
    if !record.outputs.incomplete_groups.is_empty() {
        let groups: Vec<String> = record
            .outputs
            .incomplete_groups
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "  incomplete:  {} (run `mailstack update` to retry)",
            groups.join(", ").yellow()
        );
    }
    if let Some(diagnostic) = &report.engine_error {
        utils::print_diagnostics(std::slice::from_ref(diagnostic));
    }

    if !report.identities.is_empty() {
        println!();
        println!("{}", "Identities".bold());
        for identity in &report.identities {
            print_identity(identity);
        }
    }
}

pub async fn handle(region: Option<String>, account: Option<String>) -> anyhow::Result<()> {
    let app = App::load(region, None).await?;

    let report = app
        .orchestrator
        .status(account.as_deref(), &app.region)
        .await
        .context("read connection status")?;

    print_report(&report);
    Ok(())
}
