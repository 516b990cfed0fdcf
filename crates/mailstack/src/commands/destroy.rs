use crate::app::App;
use crate::progress::with_spinner;
use crate::utils;
use anyhow::Context;
use colored::Colorize;
use mailstack_cloud::DestroyOutcome;
use mailstack_cloud::lifecycle::TeardownReport;

/// Teardown summary shared with `restore`
pub fn print_teardown(report: &TeardownReport) {
    for identity in &report.identities_reverted {
        println!("  ✓ {} restored", identity);
    }
    if report.mail_from_reverted {
        println!("  ✓ MAIL FROM restored");
    }
    if report.archive_removed {
        println!("  ✓ Archive unlinked and deleted");
    }
    if report.stack_removed {
        println!("  ✓ Stack removed");
    } else {
        println!("  ℹ Stack was already gone");
    }
    if report.record_deleted {
        println!("  ✓ Connection record deleted");
    }
    if !report.diagnostics.is_empty() {
        println!();
        println!("{}", "Left untouched:".yellow().bold());
        utils::print_diagnostics(&report.diagnostics);
    }
}

pub async fn handle(region: Option<String>, yes: bool) -> anyhow::Result<()> {
    let app = App::load(region, None).await?;

    let Some(record) = app
        .orchestrator
        .connection(&app.region)
        .await
        .context("look up connection")?
    else {
        println!("No mailstack connection in {}; nothing to destroy", app.region.cyan());
        return Ok(());
    };

    println!("{}", "Destroying mailstack...".red().bold());
    println!("Stack: {}", record.stack_id.cyan());
    println!("Account: {}", record.account_id);
    println!("Region: {}", record.region);
    let tracked = record.identities.iter().filter(|i| i.is_restorable()).count();
    if tracked > 0 {
        println!(
            "{} identities get their original configuration set back first",
            tracked
        );
    }

    println!();
    if !utils::confirm("Delete every resource this stack created?", yes)? {
        utils::print_cancelled();
        return Ok(());
    }

    let outcome = with_spinner(
        "Destroying stack...",
        "Teardown finished",
        app.orchestrator.destroy(&app.region),
    )
    .await
    .context("destroy stack")?;

    match outcome {
        DestroyOutcome::NothingToDestroy => {
            println!("Nothing to destroy");
        }
        DestroyOutcome::Destroyed(report) => {
            println!();
            print_teardown(&report);
            println!();
            println!("{}", "✓ Destroyed".green().bold());
        }
    }
    Ok(())
}
