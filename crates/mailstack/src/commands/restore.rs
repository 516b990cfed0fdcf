use crate::app::App;
use crate::commands::destroy::print_teardown;
use crate::progress::with_spinner;
use crate::utils;
use anyhow::Context;
use colored::Colorize;
use mailstack_cloud::RestoreOutcome;
use mailstack_cloud::record::IdentityAction;

fn display_set(set: Option<&str>) -> String {
    set.unwrap_or("(none)").to_string()
}

pub async fn handle(region: Option<String>, yes: bool) -> anyhow::Result<()> {
    let app = App::load(region, None).await?;

    let plan = app
        .orchestrator
        .restore_plan(&app.region)
        .await
        .context("read restore plan")?;
    if plan.is_empty() {
        println!("Nothing to restore for {}", plan.key.to_string().cyan());
        return Ok(());
    }

    println!("{}", "Restoring original settings...".yellow());
    println!("Connection: {}", plan.key.to_string().cyan());
    for identity in &plan.identities {
        let original = match identity.action {
            IdentityAction::Replaced => identity.original_config_set.as_deref(),
            _ => None,
        };
        println!(
            "  • {}: {} → {}",
            identity.name,
            display_set(identity.current_config_set.as_deref()),
            display_set(original).green()
        );
    }
    for (name, feature) in &plan.features {
        println!(
            "  • {}: {} → {}",
            name,
            display_set(feature.current_value.as_deref()),
            display_set(feature.original_value.as_deref()).green()
        );
    }
    println!("The stack is destroyed afterwards.");

    println!();
    if !utils::confirm("Restore these settings and destroy the stack?", yes)? {
        utils::print_cancelled();
        return Ok(());
    }

    let outcome = with_spinner(
        "Restoring...",
        "Restore finished",
        app.orchestrator.restore(&app.region),
    )
    .await
    .context("restore")?;

    match outcome {
        RestoreOutcome::NothingToRestore => println!("Nothing to restore"),
        RestoreOutcome::Restored(report) => {
            println!();
            print_teardown(&report.teardown);
            if report.mismatches.is_empty() {
                println!();
                println!("{}", "✓ Restored".green().bold());
            } else {
                println!();
                println!("{}", "⚠ Some identities did not end up on their original configuration set:".yellow().bold());
                for mismatch in &report.mismatches {
                    println!(
                        "  • {}: expected {}, found {}",
                        mismatch.identity,
                        display_set(mismatch.expected.as_deref()),
                        display_set(mismatch.actual.as_deref())
                    );
                }
            }
        }
    }
    Ok(())
}
