use anyhow::Context;
use mailstack_cloud::{
    AccountApi, ConnectionKey, ConnectionRecord, ConsoleAccess, DnsZoneApi, LifecycleOptions,
    MetadataStore, Orchestrator, StackError,
};
use mailstack_cloud_aws::AwsContext;
use mailstack_cloud_cloudflare::{CloudflareDns, DnsConfig};
use mailstack_config::Settings;
use mailstack_pulumi::{PulumiCli, PulumiEngine};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command needs, wired from settings and the AWS environment
pub struct App {
    pub settings: Settings,
    pub aws: AwsContext,
    pub region: String,
    pub orchestrator: Orchestrator,
    account: Arc<dyn AccountApi>,
}

/// Settings and the region, without touching AWS
pub fn load_settings(region: Option<String>) -> anyhow::Result<(PathBuf, Settings, Option<String>)> {
    let config_dir = mailstack_config::get_config_dir().context("resolve config directory")?;
    let settings = Settings::load_from(&config_dir).context("load settings")?;
    let region = region
        .filter(|r| !r.is_empty())
        .or_else(|| settings.default_region.clone());
    tracing::debug!("Config directory: {}", config_dir.display());
    Ok((config_dir, settings, region))
}

impl App {
    pub async fn load(region: Option<String>, external_id: Option<String>) -> anyhow::Result<Self> {
        let (config_dir, settings, region) = load_settings(region)?;

        let aws = AwsContext::load(region.as_deref()).await;
        let region = region
            .or_else(|| aws.region().map(str::to_string))
            .ok_or_else(|| {
                StackError::InvalidConfig(
                    "no region given; pass --region, set MAILSTACK_REGION or configure an AWS profile region"
                        .to_string(),
                )
            })?;

        let mut extra_zones: Vec<Arc<dyn DnsZoneApi>> = Vec::new();
        if let Some(config) = DnsConfig::from_env_opt() {
            tracing::debug!("Cloudflare zone {} available for DNS writes", config.zone_id);
            extra_zones.push(Arc::new(CloudflareDns::new(config)));
        }
        let cloud = mailstack_cloud_aws::cloud_apis(&aws, extra_zones);
        let account = cloud.account.clone();

        let cli = PulumiCli::new(
            settings.pulumi_bin.clone(),
            mailstack_config::pulumi_state_dir(&config_dir),
        );
        let engine = PulumiEngine::new(cli, mailstack_config::stacks_dir(&config_dir));
        let store = MetadataStore::new(mailstack_config::connections_dir(&config_dir));
        let options = LifecycleOptions {
            function_artifact: settings.function_artifact.clone(),
            console_access: console_access(settings.console_account_id.as_deref(), external_id),
            kms_key_arn: settings.archive_kms_key_arn.clone(),
        };

        let orchestrator = Orchestrator::new(Arc::new(engine), cloud, store, options);

        Ok(Self {
            settings,
            aws,
            region,
            orchestrator,
            account,
        })
    }

    /// The record for the ambient account, or `STACK_NOT_FOUND`
    pub async fn require_connection(&self) -> anyhow::Result<ConnectionRecord> {
        let account_id = self
            .account
            .caller_account()
            .await
            .context("resolve AWS account")?;
        let key = ConnectionKey::new(account_id, &self.region);
        let record = self
            .orchestrator
            .store()
            .require(&key)
            .await
            .context("load connection record")?;
        Ok(record)
    }
}

/// Console access needs both halves; one without the other is ignored
fn console_access(account_id: Option<&str>, external_id: Option<String>) -> Option<ConsoleAccess> {
    match (account_id, external_id) {
        (Some(account_id), Some(external_id)) if !external_id.is_empty() => Some(ConsoleAccess {
            account_id: account_id.to_string(),
            external_id,
        }),
        (Some(_), None) => {
            tracing::debug!("consoleAccountId is set without an external id; no console access");
            None
        }
        (None, Some(_)) => {
            tracing::warn!("--external-id given without consoleAccountId in settings.json; ignored");
            None
        }
        _ => None,
    }
}
