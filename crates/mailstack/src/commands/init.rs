use crate::app::App;
use crate::progress::with_spinner;
use crate::utils;
use crate::{FeatureArgs, ProviderArgs};
use anyhow::Context;
use colored::Colorize;
use mailstack_cloud::{DeployRequest, FeatureFlags, HostingProvider, Preset, StackError};

fn parse_provider(args: &ProviderArgs) -> Result<HostingProvider, StackError> {
    HostingProvider::parse(
        &args.provider,
        args.vercel_team.as_deref(),
        args.vercel_project.as_deref(),
    )
}

/// Fail early when the key already has a record
async fn ensure_no_connection(app: &App) -> anyhow::Result<()> {
    let existing = app
        .orchestrator
        .connection(&app.region)
        .await
        .context("look up existing connection")?;
    if let Some(record) = existing {
        return Err(StackError::ConnectionExists {
            account_id: record.account_id,
            region: record.region,
        })
        .context("check for an existing connection");
    }
    Ok(())
}

fn print_provider(provider: &HostingProvider) {
    match provider {
        HostingProvider::Vercel {
            team_slug,
            project_name,
        } => println!(
            "Provider: {} (team {}, project {})",
            "vercel".cyan(),
            team_slug,
            project_name
        ),
        other => println!("Provider: {}", other.name().cyan()),
    }
}

pub async fn handle_init(
    region: Option<String>,
    external_id: Option<String>,
    provider: ProviderArgs,
    preset: String,
    features: FeatureArgs,
    yes: bool,
) -> anyhow::Result<()> {
    let provider = parse_provider(&provider).context("parse --provider")?;
    let preset: Preset = preset.parse().context("parse --preset")?;
    let requested = utils::parse_features(features).context("parse feature flags")?;
    if requested.flags.mail_from.is_some() && requested.domain.is_none() {
        return Err(StackError::InvalidConfig(
            "--mail-from requires --domain".to_string(),
        ))
        .context("parse feature flags");
    }
    let resolved = FeatureFlags::resolve(preset, &requested.flags);
    resolved.check().context("check feature flags")?;

    let app = App::load(region, external_id).await?;

    println!("{}", "Deploying mailstack...".yellow());
    print_provider(&provider);
    println!("Region: {}", app.region.cyan());
    println!("Preset: {}", preset.to_string().cyan());
    if let Some(domain) = &requested.domain {
        println!("Domain: {}", domain.cyan());
    }
    let described = utils::describe_flags(&resolved);
    if described.is_empty() {
        println!("Features: {}", "none".dimmed());
    } else {
        println!("Features:");
        for feature in &described {
            println!("  • {}", feature);
        }
    }

    ensure_no_connection(&app).await?;

    println!();
    if !utils::confirm("Create these resources in your AWS account?", yes)? {
        utils::print_cancelled();
        return Ok(());
    }

    let mut request = DeployRequest::init(app.region.clone(), provider, preset);
    request.flags = requested.flags;
    request.domain = requested.domain;
    if let Some(attach) = requested.attach {
        request.attach = attach;
    }

    let report = with_spinner(
        "Deploying stack (this can take several minutes)...",
        "Stack deployed",
        app.orchestrator.init(request),
    )
    .await
    .context("deploy stack")?;

    utils::print_deploy_report(&report);
    Ok(())
}

pub async fn handle_connect(
    region: Option<String>,
    external_id: Option<String>,
    provider: ProviderArgs,
    yes: bool,
) -> anyhow::Result<()> {
    let provider = parse_provider(&provider).context("parse --provider")?;

    let app = App::load(region, external_id).await?;

    println!("{}", "Connecting the mailstack dashboard...".yellow());
    print_provider(&provider);
    println!("Region: {}", app.region.cyan());
    println!("A read-only role is created; no sending resources are deployed.");

    ensure_no_connection(&app).await?;

    println!();
    if !utils::confirm("Create the dashboard role?", yes)? {
        utils::print_cancelled();
        return Ok(());
    }

    let request = DeployRequest::connect(app.region.clone(), provider);
    let report = with_spinner("Deploying role...", "Role deployed", app.orchestrator.init(request))
        .await
        .context("deploy dashboard role")?;

    utils::print_deploy_report(&report);
    println!();
    println!(
        "Run {} later to deploy the sending stack",
        "mailstack upgrade --enhanced".cyan()
    );
    Ok(())
}
