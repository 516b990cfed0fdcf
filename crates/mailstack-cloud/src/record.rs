//! Connection records
//!
//! A [`ConnectionRecord`] is the durable description of one mailstack
//! deployment in one (account, region). It records what was created and,
//! more importantly, what pre-existing configuration was modified so that
//! `restore` can put it back exactly.

use crate::archive::ArchiveRetention;
use crate::error::{Result, StackError};
use crate::graph::ResourceGroup;
use crate::planner::{FeatureFlags, Preset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const RECORD_VERSION: u32 = 1;

/// Identifies a connection record: one per (account, region)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    pub account_id: String,
    pub region: String,
}

impl ConnectionKey {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }

    /// Name of the provisioning-engine stack backing this connection
    pub fn stack_id(&self) -> String {
        format!("mailstack-{}-{}", self.account_id, self.region)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.region)
    }
}

/// Where the application that sends email is hosted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HostingProvider {
    /// Federated identity through Vercel's OIDC issuer
    Vercel {
        #[serde(rename = "teamSlug")]
        team_slug: String,
        #[serde(rename = "projectName")]
        project_name: String,
    },
    /// Compute running in the same AWS account
    Aws,
    Railway,
    Other,
}

impl HostingProvider {
    /// Parse a provider name given on the command line
    pub fn parse(
        name: &str,
        vercel_team: Option<&str>,
        vercel_project: Option<&str>,
    ) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "vercel" => match (vercel_team, vercel_project) {
                (Some(team), Some(project)) if !team.is_empty() && !project.is_empty() => {
                    Ok(HostingProvider::Vercel {
                        team_slug: team.to_string(),
                        project_name: project.to_string(),
                    })
                }
                _ => Err(StackError::InvalidConfig(
                    "the vercel provider requires --vercel-team and --vercel-project".to_string(),
                )),
            },
            "aws" => Ok(HostingProvider::Aws),
            "railway" => Ok(HostingProvider::Railway),
            "other" => Ok(HostingProvider::Other),
            other => Err(StackError::InvalidConfig(format!(
                "unknown provider '{}' (expected vercel, aws, railway or other)",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostingProvider::Vercel { .. } => "vercel",
            HostingProvider::Aws => "aws",
            HostingProvider::Railway => "railway",
            HostingProvider::Other => "other",
        }
    }
}

/// How deeply mailstack integrates with the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationLevel {
    /// Read-only role, no new sending resources
    DashboardOnly,
    /// Sending, history and event wiring
    Enhanced,
}

impl fmt::Display for IntegrationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationLevel::DashboardOnly => write!(f, "dashboard-only"),
            IntegrationLevel::Enhanced => write!(f, "enhanced"),
        }
    }
}

/// Optional resource groups and identity-level settings tracked per record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureName {
    ConfigSet,
    EventTracking,
    TrackingDomain,
    HttpsTracking,
    EmailArchiving,
    MailFrom,
}

impl FeatureName {
    pub const ALL: [FeatureName; 6] = [
        FeatureName::ConfigSet,
        FeatureName::EventTracking,
        FeatureName::TrackingDomain,
        FeatureName::HttpsTracking,
        FeatureName::EmailArchiving,
        FeatureName::MailFrom,
    ];
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureName::ConfigSet => "configSet",
            FeatureName::EventTracking => "eventTracking",
            FeatureName::TrackingDomain => "trackingDomain",
            FeatureName::HttpsTracking => "httpsTracking",
            FeatureName::EmailArchiving => "emailArchiving",
            FeatureName::MailFrom => "mailFrom",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureAction {
    DeployNew,
    Replace,
    Skip,
}

impl fmt::Display for FeatureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureAction::DeployNew => write!(f, "deploy-new"),
            FeatureAction::Replace => write!(f, "replace"),
            FeatureAction::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureState {
    pub enabled: bool,
    pub action: FeatureAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
}

impl FeatureState {
    pub fn skipped() -> Self {
        Self {
            enabled: false,
            action: FeatureAction::Skip,
            original_value: None,
            current_value: None,
        }
    }

    pub fn deployed(current: Option<String>) -> Self {
        Self {
            enabled: true,
            action: FeatureAction::DeployNew,
            original_value: None,
            current_value: current,
        }
    }

    pub fn replaced(original: impl Into<String>, current: impl Into<String>) -> Self {
        Self {
            enabled: true,
            action: FeatureAction::Replace,
            original_value: Some(original.into()),
            current_value: Some(current.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    Domain,
    Address,
}

impl IdentityType {
    /// Addresses contain an `@`; everything else is a domain
    pub fn of(name: &str) -> Self {
        if name.contains('@') {
            IdentityType::Address
        } else {
            IdentityType::Domain
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityAction {
    NoChange,
    Attached,
    Replaced,
}

impl fmt::Display for IdentityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityAction::NoChange => write!(f, "no-change"),
            IdentityAction::Attached => write!(f, "attached"),
            IdentityAction::Replaced => write!(f, "replaced"),
        }
    }
}

/// Configuration-set attachment of a pre-existing identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityState {
    pub name: String,
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    #[serde(default)]
    pub original_config_set: Option<String>,
    #[serde(default)]
    pub current_config_set: Option<String>,
    pub action: IdentityAction,
}

impl IdentityState {
    /// Whether restoring this identity changes anything
    pub fn is_restorable(&self) -> bool {
        matches!(
            self.action,
            IdentityAction::Attached | IdentityAction::Replaced
        )
    }
}

/// Archive bookkeeping; the archive lives outside the provisioning engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub archive_id: String,
    pub archive_arn: String,
    pub retention: ArchiveRetention,
    pub linked: bool,
}

/// Stack outputs persisted as derived fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedOutputs {
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_provider_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_set_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_arns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dkim_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveRecord>,
    /// Groups whose apply failed part-way; their resources stay in the stack
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub incomplete_groups: BTreeSet<ResourceGroup>,
}

/// Pre-existing resources the stack references instead of creating
///
/// Re-plans consult this rather than querying the account again, so a
/// resource the stack created is never mistaken for a foreign one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptedResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_provider_arn: Option<String>,
    #[serde(default)]
    pub domain_identity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_id: Option<String>,
}

/// Which pre-existing identities receive the new configuration set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachPolicy {
    None,
    /// Only identities without a configuration set
    #[default]
    Unset,
    /// Also replace foreign configuration sets
    All,
}

impl std::str::FromStr for AttachPolicy {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(AttachPolicy::None),
            "unset" => Ok(AttachPolicy::Unset),
            "all" => Ok(AttachPolicy::All),
            other => Err(StackError::InvalidConfig(format!(
                "unknown attach policy '{}' (expected none, unset or all)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub version: u32,
    pub account_id: String,
    pub region: String,
    pub provider: HostingProvider,
    pub integration_level: IntegrationLevel,
    pub preset: Preset,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stack_id: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub attach_policy: AttachPolicy,
    #[serde(default)]
    pub features: BTreeMap<FeatureName, FeatureState>,
    #[serde(default)]
    pub identities: Vec<IdentityState>,
    #[serde(default)]
    pub outputs: RecordedOutputs,
    #[serde(default)]
    pub adopted: AdoptedResources,
}

impl ConnectionRecord {
    pub fn new(
        key: &ConnectionKey,
        provider: HostingProvider,
        integration_level: IntegrationLevel,
        preset: Preset,
    ) -> Self {
        let now = Utc::now();
        Self {
            version: RECORD_VERSION,
            account_id: key.account_id.clone(),
            region: key.region.clone(),
            provider,
            integration_level,
            preset,
            created_at: now,
            updated_at: now,
            stack_id: key.stack_id(),
            domain: None,
            attach_policy: AttachPolicy::default(),
            features: FeatureName::ALL
                .iter()
                .map(|name| (*name, FeatureState::skipped()))
                .collect(),
            identities: Vec::new(),
            outputs: RecordedOutputs::default(),
            adopted: AdoptedResources::default(),
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(&self.account_id, &self.region)
    }

    pub fn feature(&self, name: FeatureName) -> Option<&FeatureState> {
        self.features.get(&name)
    }

    pub fn is_enabled(&self, name: FeatureName) -> bool {
        self.feature(name).is_some_and(|f| f.enabled)
    }

    pub fn set_feature(&mut self, name: FeatureName, state: FeatureState) {
        self.features.insert(name, state);
        self.updated_at = Utc::now();
    }

    pub fn identity(&self, name: &str) -> Option<&IdentityState> {
        self.identities.iter().find(|i| i.name == name)
    }

    /// Append identities that are not yet recorded; recorded ones stay as-is
    pub fn merge_identities(&mut self, incoming: Vec<IdentityState>) {
        for identity in incoming {
            if self.identity(&identity.name).is_none() {
                self.identities.push(identity);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Whether `restore` has anything to put back
    pub fn has_restorable_changes(&self) -> bool {
        self.features
            .values()
            .any(|f| f.action == FeatureAction::Replace)
            || self.identities.iter().any(IdentityState::is_restorable)
    }

    /// Flags describing what this record currently has deployed
    pub fn enabled_flags(&self) -> FeatureFlags {
        let value_of = |name: FeatureName| {
            self.feature(name)
                .filter(|f| f.enabled)
                .and_then(|f| f.current_value.clone())
        };
        FeatureFlags {
            config_set: self.is_enabled(FeatureName::ConfigSet),
            event_tracking: self.is_enabled(FeatureName::EventTracking),
            tracking_domain: value_of(FeatureName::TrackingDomain),
            https_tracking: self.is_enabled(FeatureName::HttpsTracking),
            archiving: if self.is_enabled(FeatureName::EmailArchiving) {
                self.outputs
                    .archive
                    .as_ref()
                    .map(|a| a.retention)
                    .or(Some(ArchiveRetention::default()))
            } else {
                None
            },
            mail_from: value_of(FeatureName::MailFrom),
        }
    }

    /// Features of groups left incomplete by an earlier apply
    ///
    /// Merged into the next plan so `update` retries them.
    pub fn incomplete_flags(&self) -> FeatureFlags {
        let incomplete = &self.outputs.incomplete_groups;
        FeatureFlags {
            event_tracking: incomplete.contains(&ResourceGroup::History),
            https_tracking: incomplete.contains(&ResourceGroup::Edge),
            ..Default::default()
        }
    }

    /// Check the record's internal invariants
    ///
    /// These cannot be violated through the state machine; a failure means
    /// the file was edited by hand or written by a buggy version.
    pub fn validate(&self) -> Result<()> {
        for (name, feature) in &self.features {
            if feature.action == FeatureAction::Replace && feature.original_value.is_none() {
                return Err(StackError::Invariant(format!(
                    "feature {} is marked replace without an original value",
                    name
                )));
            }
        }
        for identity in &self.identities {
            match identity.action {
                IdentityAction::Replaced if identity.original_config_set.is_none() => {
                    return Err(StackError::Invariant(format!(
                        "identity {} is marked replaced without an original configuration set",
                        identity.name
                    )));
                }
                IdentityAction::Attached if identity.original_config_set.is_some() => {
                    return Err(StackError::Invariant(format!(
                        "identity {} is marked attached but had a configuration set",
                        identity.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ConnectionRecord {
        ConnectionRecord::new(
            &ConnectionKey::new("123456789012", "us-east-1"),
            HostingProvider::Aws,
            IntegrationLevel::Enhanced,
            Preset::Starter,
        )
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(
            HostingProvider::parse("AWS", None, None).unwrap(),
            HostingProvider::Aws
        );
        assert!(matches!(
            HostingProvider::parse("vercel", Some("acme"), None),
            Err(StackError::InvalidConfig(_))
        ));
        assert!(matches!(
            HostingProvider::parse("heroku", None, None),
            Err(StackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_new_record_skips_everything() {
        let record = record();
        assert_eq!(record.stack_id, "mailstack-123456789012-us-east-1");
        assert!(FeatureName::ALL
            .iter()
            .all(|f| record.feature(*f).unwrap().action == FeatureAction::Skip));
        assert!(!record.has_restorable_changes());
    }

    #[test]
    fn test_feature_keys_serialize_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["features"]["configSet"]["action"], "skip");
        assert_eq!(json["integrationLevel"], "enhanced");
        assert_eq!(json["provider"]["kind"], "aws");
    }

    #[test]
    fn test_merge_identities_keeps_existing() {
        let mut record = record();
        record.identities.push(IdentityState {
            name: "example.com".into(),
            identity_type: IdentityType::Domain,
            original_config_set: Some("legacy".into()),
            current_config_set: Some("mailstack-email-tracking".into()),
            action: IdentityAction::Replaced,
        });

        record.merge_identities(vec![
            IdentityState {
                name: "example.com".into(),
                identity_type: IdentityType::Domain,
                original_config_set: Some("mailstack-email-tracking".into()),
                current_config_set: Some("mailstack-email-tracking".into()),
                action: IdentityAction::NoChange,
            },
            IdentityState {
                name: "ops@example.org".into(),
                identity_type: IdentityType::Address,
                original_config_set: None,
                current_config_set: Some("mailstack-email-tracking".into()),
                action: IdentityAction::Attached,
            },
        ]);

        assert_eq!(record.identities.len(), 2);
        assert_eq!(record.identities[0].action, IdentityAction::Replaced);
        assert_eq!(
            record.identities[0].original_config_set.as_deref(),
            Some("legacy")
        );
        assert!(record.has_restorable_changes());
    }

    #[test]
    fn test_validate_rejects_replace_without_original() {
        let mut record = record();
        record.features.insert(
            FeatureName::MailFrom,
            FeatureState {
                enabled: true,
                action: FeatureAction::Replace,
                original_value: None,
                current_value: Some("mail.example.com".into()),
            },
        );
        assert!(matches!(record.validate(), Err(StackError::Invariant(_))));
    }
}
