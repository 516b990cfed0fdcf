use crate::FeatureArgs;
use crate::app::App;
use crate::progress::with_spinner;
use crate::utils;
use anyhow::Context;
use colored::Colorize;
use mailstack_cloud::{FeatureFlags, IntegrationLevel, Preset, UpgradeRequest};

pub async fn handle_upgrade(
    region: Option<String>,
    external_id: Option<String>,
    enhanced: bool,
    preset: Option<String>,
    features: FeatureArgs,
    yes: bool,
) -> anyhow::Result<()> {
    let preset: Option<Preset> = preset
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("parse --preset")?;
    let requested = utils::parse_features(features).context("parse feature flags")?;

    let app = App::load(region, external_id).await?;
    let record = app.require_connection().await?;

    let level = enhanced.then_some(IntegrationLevel::Enhanced);
    let target = FeatureFlags::resolve(
        preset.unwrap_or(Preset::Custom),
        &record.enabled_flags().merge(&requested.flags),
    );
    target.check().context("check feature flags")?;

    println!("{}", "Upgrading mailstack...".yellow());
    println!("Stack: {}", record.stack_id.cyan());
    match level {
        Some(level) if level != record.integration_level => {
            println!("Integration: {} → {}", record.integration_level, level.to_string().cyan())
        }
        _ => println!("Integration: {}", record.integration_level),
    }
    if let Some(preset) = preset {
        println!("Preset: {} → {}", record.preset, preset.to_string().cyan());
    }

    let current = utils::describe_flags(&record.enabled_flags());
    let added: Vec<String> = utils::describe_flags(&target)
        .into_iter()
        .filter(|f| !current.contains(f))
        .collect();
    if added.is_empty() && level.is_none() && requested.domain.is_none() {
        println!("{}", "Nothing new requested; re-applying the recorded configuration".dimmed());
    }
    for feature in &added {
        println!("  + {}", feature.green());
    }
    if let Some(domain) = &requested.domain {
        println!("Domain: {}", domain.cyan());
    }

    println!();
    if !utils::confirm("Apply these changes?", yes)? {
        utils::print_cancelled();
        return Ok(());
    }

    let request = UpgradeRequest {
        region: app.region.clone(),
        level,
        preset,
        flags: requested.flags,
        domain: requested.domain,
        attach: requested.attach,
    };
    let report = with_spinner(
        "Updating stack (this can take several minutes)...",
        "Stack updated",
        app.orchestrator.upgrade(request),
    )
    .await
    .context("upgrade stack")?;

    utils::print_deploy_report(&report);
    Ok(())
}

pub async fn handle_update(
    region: Option<String>,
    external_id: Option<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let app = App::load(region, external_id).await?;
    let record = app.require_connection().await?;

    println!("{}", "Re-applying the recorded configuration...".yellow());
    println!("Stack: {}", record.stack_id.cyan());
    for feature in utils::describe_flags(&record.enabled_flags()) {
        println!("  • {}", feature);
    }

    println!();
    if !utils::confirm("Re-apply the stack?", yes)? {
        utils::print_cancelled();
        return Ok(());
    }

    let report = with_spinner(
        "Updating stack...",
        "Stack updated",
        app.orchestrator.update(&app.region),
    )
    .await
    .context("update stack")?;

    utils::print_deploy_report(&report);
    Ok(())
}
