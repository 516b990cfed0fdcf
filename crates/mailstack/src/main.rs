mod app;
mod commands;
mod progress;
mod utils;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mailstack")]
#[command(version)]
#[command(about = "Email sending infrastructure in your own AWS account", long_about = None)]
struct Cli {
    /// AWS region (falls back to MAILSTACK_REGION, settings.json, then the AWS profile)
    #[arg(long, global = true)]
    region: Option<String>,

    /// External id the console account presents when assuming the stack role
    #[arg(long, global = true, env = "MAILSTACK_EXTERNAL_ID")]
    external_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the application runs and how it authenticates
#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    /// Hosting provider (vercel, aws, railway, other)
    #[arg(long, env = "MAILSTACK_PROVIDER")]
    pub provider: String,
    /// Vercel team slug (vercel provider)
    #[arg(long, env = "VERCEL_TEAM")]
    pub vercel_team: Option<String>,
    /// Vercel project name (vercel provider)
    #[arg(long, env = "VERCEL_PROJECT")]
    pub vercel_project: Option<String>,
}

/// Optional features, merged over the preset
#[derive(Args, Debug, Clone, Default)]
pub struct FeatureArgs {
    /// Sending domain to verify and configure
    #[arg(long)]
    pub domain: Option<String>,
    /// Create a configuration set
    #[arg(long)]
    pub config_set: bool,
    /// Record send/delivery/bounce/... events in a history table
    #[arg(long)]
    pub event_tracking: bool,
    /// Custom open/click tracking domain (e.g. track.example.com)
    #[arg(long)]
    pub tracking_domain: Option<String>,
    /// Serve the tracking domain over HTTPS through a CDN distribution
    #[arg(long)]
    pub https_tracking: bool,
    /// Archive sent mail with this retention (3m, 6m, 1y, ... 10y, permanent)
    #[arg(long, value_name = "RETENTION")]
    pub archive: Option<String>,
    /// Custom MAIL FROM subdomain (e.g. mail)
    #[arg(long, value_name = "SUBDOMAIN")]
    pub mail_from: Option<String>,
    /// Which existing identities get the new configuration set (none, unset, all)
    #[arg(long)]
    pub attach: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the full sending stack
    Init {
        #[command(flatten)]
        provider: ProviderArgs,
        /// Feature preset (starter, production, enterprise, custom)
        #[arg(long, default_value = "production")]
        preset: String,
        #[command(flatten)]
        features: FeatureArgs,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Deploy a read-only role for the dashboard
    Connect {
        #[command(flatten)]
        provider: ProviderArgs,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Add features or move a dashboard-only connection to the full stack
    Upgrade {
        /// Switch to the enhanced integration level
        #[arg(long)]
        enhanced: bool,
        /// New feature preset
        #[arg(long)]
        preset: Option<String>,
        #[command(flatten)]
        features: FeatureArgs,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Re-apply the recorded configuration
    Update {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Put back the identity settings mailstack changed, then destroy the stack
    Restore {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Remove the stack and its connection record
    Destroy {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the recorded connection and live identity status
    Status {
        /// Account id (skips the credentials lookup)
        #[arg(long)]
        account: Option<String>,
    },
    /// Check the DNS records of a sending domain
    Verify {
        /// Domain to check
        #[arg(long)]
        domain: String,
    },
    /// Sending statistics read through brokered role credentials
    Stats {
        /// Role to assume (defaults to the recorded stack role)
        #[arg(long)]
        role_arn: Option<String>,
        /// Time window in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout is for the operator; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run(cli).await {
        utils::print_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let region = cli.region;
    let external_id = cli.external_id;

    match cli.command {
        Commands::Init {
            provider,
            preset,
            features,
            yes,
        } => {
            commands::init::handle_init(region, external_id, provider, preset, features, yes).await?;
        }
        Commands::Connect { provider, yes } => {
            commands::init::handle_connect(region, external_id, provider, yes).await?;
        }
        Commands::Upgrade {
            enhanced,
            preset,
            features,
            yes,
        } => {
            commands::upgrade::handle_upgrade(region, external_id, enhanced, preset, features, yes).await?;
        }
        Commands::Update { yes } => {
            commands::upgrade::handle_update(region, external_id, yes).await?;
        }
        Commands::Restore { yes } => {
            commands::restore::handle(region, yes).await?;
        }
        Commands::Destroy { yes } => {
            commands::destroy::handle(region, yes).await?;
        }
        Commands::Status { account } => {
            commands::status::handle(region, account).await?;
        }
        Commands::Verify { domain } => {
            commands::verify::handle(region, domain).await?;
        }
        Commands::Stats { role_arn, hours } => {
            commands::stats::handle(region, role_arn, external_id, hours).await?;
        }
    }

    Ok(())
}
