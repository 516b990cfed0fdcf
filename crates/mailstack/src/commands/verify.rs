use crate::app::App;
use crate::progress::with_spinner;
use anyhow::Context;
use colored::{ColoredString, Colorize};
use mailstack_cloud::{OverallStatus, RecordStatus, VerifyReport};
use mailstack_cloud_cloudflare::DohResolver;

fn record_mark(status: RecordStatus) -> ColoredString {
    match status {
        RecordStatus::Verified => "✓".green(),
        RecordStatus::Incorrect => "✗".red(),
        RecordStatus::Missing => "?".yellow(),
    }
}

fn overall_label(status: OverallStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        OverallStatus::Verified => label.green().bold(),
        OverallStatus::Pending => label.yellow().bold(),
        OverallStatus::Failed => label.red().bold(),
    }
}

fn print_report(report: &VerifyReport) {
    println!("{} {}", "DNS for".bold(), report.domain.cyan().bold());

    for group in &report.groups {
        println!();
        println!(
            "{} {} ({})",
            record_mark(group.status),
            group.group.to_string().bold(),
            group.status
        );
        for check in &group.records {
            println!(
                "  {} {} {} {}",
                record_mark(check.status),
                check.record.record_type,
                check.record.name,
                check.record.value.dimmed()
            );
            if check.status == RecordStatus::Incorrect {
                for found in &check.found {
                    println!("      found: {}", found);
                }
            }
        }
    }

    println!();
    match &report.identity {
        Some(identity) => println!(
            "Identity: {} (DKIM {})",
            if identity.verified {
                "verified".green()
            } else {
                "not verified".yellow()
            },
            identity.dkim_status
        ),
        None => println!("Identity: {}", "not found in SES".yellow()),
    }
    println!("Overall: {}", overall_label(report.overall));
    if report.overall == OverallStatus::Pending {
        println!("DNS changes can take up to 72 hours to propagate; run verify again later.");
    }
}

pub async fn handle(region: Option<String>, domain: String) -> anyhow::Result<()> {
    let app = App::load(region, None).await?;
    let resolver = DohResolver::new(app.settings.doh_endpoint.clone());
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();

    let report = with_spinner(
        "Resolving records...",
        "Records resolved",
        app.orchestrator.verify(&resolver, &domain, &app.region),
    )
    .await
    .context("verify DNS records")?;

    print_report(&report);
    Ok(())
}
