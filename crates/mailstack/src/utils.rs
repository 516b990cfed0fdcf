use crate::FeatureArgs;
use colored::Colorize;
use inquire::{Confirm, InquireError};
use mailstack_cloud::{
    ArchiveRetention, AttachPolicy, BrokerError, DeployReport, Diagnostic, DnsOutcome, DnsRecord,
    FeatureFlags, StackError,
};

/// Features and options parsed from the command line
#[derive(Debug, Default)]
pub struct RequestedFeatures {
    pub flags: FeatureFlags,
    pub domain: Option<String>,
    pub attach: Option<AttachPolicy>,
}

/// Validate feature flags before anything talks to AWS
pub fn parse_features(args: FeatureArgs) -> Result<RequestedFeatures, StackError> {
    let archiving = args
        .archive
        .as_deref()
        .map(str::parse::<ArchiveRetention>)
        .transpose()?;
    let attach = args
        .attach
        .as_deref()
        .map(str::parse::<AttachPolicy>)
        .transpose()?;

    if let Some(tracking) = &args.tracking_domain {
        if let Some(domain) = &args.domain {
            if !tracking.ends_with(&format!(".{}", domain)) {
                tracing::warn!("Tracking domain {} is outside {}", tracking, domain);
            }
        }
    }

    Ok(RequestedFeatures {
        flags: FeatureFlags {
            config_set: args.config_set,
            event_tracking: args.event_tracking,
            tracking_domain: args.tracking_domain,
            https_tracking: args.https_tracking,
            archiving,
            mail_from: args.mail_from,
        },
        domain: args.domain.map(|d| d.trim_end_matches('.').to_ascii_lowercase()),
        attach,
    })
}

/// One entry per enabled feature, for confirmation prompts
pub fn describe_flags(flags: &FeatureFlags) -> Vec<String> {
    let mut features = Vec::new();
    if flags.config_set {
        features.push("configuration set".to_string());
    }
    if flags.event_tracking {
        features.push("event tracking".to_string());
    }
    if let Some(domain) = &flags.tracking_domain {
        let scheme = if flags.https_tracking { "https" } else { "http" };
        features.push(format!("tracking domain {}://{}", scheme, domain));
    }
    if let Some(retention) = flags.archiving {
        features.push(format!("email archiving ({})", retention));
    }
    if let Some(mail_from) = &flags.mail_from {
        features.push(format!("MAIL FROM {}", mail_from));
    }
    features
}

/// Ask before mutating; `--yes` skips the prompt
///
/// Without a terminal the command is refused rather than assumed.
pub fn confirm(message: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }

    match Confirm::new(message).with_default(false).prompt() {
        Ok(answer) => Ok(answer),
        Err(InquireError::NotTTY) => {
            println!("To run non-interactively, pass the --yes option");
            Err(StackError::Cancelled.into())
        }
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn print_cancelled() {
    println!("{}", "Cancelled; nothing was changed".yellow());
}

/// The stack error behind an anyhow chain, if any
pub fn stack_error(error: &anyhow::Error) -> Option<&StackError> {
    error.chain().find_map(|cause| {
        cause
            .downcast_ref::<StackError>()
            .or_else(|| cause.downcast_ref::<BrokerError>().map(BrokerError::inner))
    })
}

/// Failing step, cause, code, suggestion and docs pointer on stderr
pub fn print_error(error: &anyhow::Error) {
    let mut causes = error.chain();
    if let Some(step) = causes.next() {
        eprintln!("{} {}", "✗".red().bold(), step.to_string().red().bold());
    }
    for cause in causes {
        eprintln!("  {}", cause);
    }

    if let Some(stack) = stack_error(error) {
        eprintln!("  code: {}", stack.code().yellow());
        if let Some(suggestion) = stack.suggestion() {
            eprintln!("  hint: {}", suggestion);
        }
        if let Some(url) = stack.docs_url() {
            eprintln!("  docs: {}", url.cyan());
        }
    }
}

pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        println!("  {} {}", "⚠".yellow(), diagnostic);
        if let Some(suggestion) = &diagnostic.suggestion {
            println!("    hint: {}", suggestion);
        }
    }
}

pub fn print_records(records: &[DnsRecord]) {
    for record in records {
        println!(
            "  {:<6} {:<44} {}",
            record.record_type.to_string().cyan(),
            record.name,
            record.value
        );
    }
}

/// Outcome of init / connect / upgrade / update
pub fn print_deploy_report(report: &DeployReport) {
    let record = &report.record;

    println!();
    if report.is_partial() {
        println!("{}", "⚠ Deployed with problems".yellow().bold());
    } else {
        println!("{}", "✓ Deployed".green().bold());
    }
    println!("  stack:       {}", record.stack_id.cyan());
    println!("  account:     {}", record.account_id);
    println!("  region:      {}", record.region);
    println!("  integration: {}", record.integration_level);
    println!("  preset:      {}", record.preset);
    println!("  plan:        {}", report.summary);

    if !report.applied.is_empty() {
        let applied: Vec<String> = report.applied.iter().map(ToString::to_string).collect();
        println!("  applied:     {}", applied.join(", ").green());
    }
    if !report.skipped.is_empty() {
        let skipped: Vec<String> = report.skipped.iter().map(ToString::to_string).collect();
        println!("  skipped:     {}", skipped.join(", ").yellow());
    }

    if let Some(role_arn) = &record.outputs.role_arn {
        println!("  role:        {}", role_arn);
    }
    if let Some(config_set) = &record.outputs.config_set_name {
        println!("  config set:  {}", config_set);
    }
    if let Some(table) = &record.outputs.history_table_name {
        println!("  history:     {}", table);
    }
    if let Some(archive) = &record.outputs.archive {
        let linked = if archive.linked { "linked" } else { "not linked" };
        println!(
            "  archive:     {} ({}, {})",
            archive.archive_id, archive.retention, linked
        );
    }

    let attached: Vec<&str> = record
        .identities
        .iter()
        .filter(|i| i.is_restorable())
        .map(|i| i.name.as_str())
        .collect();
    if !attached.is_empty() {
        println!("  attached to: {}", attached.join(", "));
    }

    match &report.dns {
        Some(DnsOutcome::Applied { zone, records }) => {
            println!();
            println!(
                "{}",
                format!("DNS records written to zone {} ({}):", zone, records.len()).bold()
            );
            print_records(records);
        }
        Some(DnsOutcome::Manual { records }) => {
            println!();
            println!(
                "{}",
                "No writable DNS zone found; publish these records with your DNS provider:".bold()
            );
            print_records(records);
            println!("Then check them with `mailstack verify --domain <domain>`");
        }
        None => {}
    }

    if !report.diagnostics.is_empty() {
        println!();
        println!("{}", "Problems:".yellow().bold());
        print_diagnostics(&report.diagnostics);
        println!("Fix the cause and run `mailstack update` to retry the failed groups");
    }
}
