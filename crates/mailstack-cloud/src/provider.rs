//! Collaborator traits
//!
//! The orchestrator never talks to a cloud SDK or the provisioning engine
//! directly. Each external capability is a trait here; the AWS, Cloudflare
//! and Pulumi crates implement them and tests substitute in-memory fakes.

use crate::archive::ArchiveRetention;
use crate::credentials::Credential;
use crate::dns::{DnsRecord, RecordType};
use crate::error::Result;
use crate::graph::{FlatOutputs, ResourceGraph, ResourceGroup};
use crate::record::IdentityType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Declarative provisioning engine
///
/// Consumed as a black box: apply a graph to a named stack and read back
/// its outputs.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Engine name for logs (e.g., "pulumi")
    fn name(&self) -> &str;

    /// Converge the stack onto `graph`, returning its outputs
    async fn apply(&self, stack_id: &str, graph: &ResourceGraph) -> Result<FlatOutputs>;

    /// Converge only the nodes of the `targets` groups
    ///
    /// Other resources in the stack are neither updated nor deleted, so a
    /// group whose apply failed part-way keeps what it created.
    async fn apply_targeted(
        &self,
        stack_id: &str,
        graph: &ResourceGraph,
        targets: &BTreeSet<ResourceGroup>,
    ) -> Result<FlatOutputs>;

    /// Remove every resource in the stack and the stack itself
    ///
    /// Returns `StackError::StackNotFound` when there is no such stack.
    async fn destroy(&self, stack_id: &str) -> Result<()>;

    /// Last-known outputs of the stack
    async fn outputs(&self, stack_id: &str) -> Result<FlatOutputs>;
}

/// Account-level lookups
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Account id of the ambient credentials; fails when there are none
    async fn caller_account(&self) -> Result<String>;

    /// ARN of an existing OIDC identity provider for `issuer`
    /// (host and path, without scheme)
    async fn find_oidc_provider(&self, issuer: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DkimStatus {
    Pending,
    Success,
    Failed,
    TemporaryFailure,
    NotStarted,
}

impl fmt::Display for DkimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DkimStatus::Pending => "PENDING",
            DkimStatus::Success => "SUCCESS",
            DkimStatus::Failed => "FAILED",
            DkimStatus::TemporaryFailure => "TEMPORARY_FAILURE",
            DkimStatus::NotStarted => "NOT_STARTED",
        };
        f.write_str(s)
    }
}

/// Live state of one sending identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStatus {
    pub name: String,
    pub identity_type: IdentityType,
    pub verified: bool,
    pub dkim_status: DkimStatus,
    pub dkim_tokens: Vec<String>,
    pub config_set: Option<String>,
    pub mail_from_domain: Option<String>,
}

/// Email identities and their identity-level settings
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Names of all identities in the region
    async fn list_identities(&self) -> Result<Vec<String>>;

    /// Status of one identity, `None` when it does not exist
    async fn identity_status(&self, name: &str) -> Result<Option<IdentityStatus>>;

    /// Attach (or with `None` detach) the default configuration set
    async fn set_configuration_set(
        &self,
        identity: &str,
        config_set: Option<&str>,
    ) -> Result<()>;

    /// Set (or with `None` clear) the custom MAIL FROM domain
    async fn set_mail_from(&self, domain: &str, mail_from: Option<&str>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneProvider {
    Route53,
    Cloudflare,
}

impl fmt::Display for ZoneProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneProvider::Route53 => write!(f, "Route 53"),
            ZoneProvider::Cloudflare => write!(f, "Cloudflare"),
        }
    }
}

/// A DNS zone the orchestrator can write to
#[async_trait]
pub trait DnsZoneApi: Send + Sync {
    fn provider(&self) -> ZoneProvider;

    /// Id of the zone authoritative for `domain`, if this API controls one
    async fn zone_for(&self, domain: &str) -> Result<Option<String>>;

    /// Idempotently create or overwrite `records` in the zone
    async fn upsert_records(&self, zone_id: &str, records: &[DnsRecord]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingDistribution {
    pub id: String,
    pub domain_name: String,
}

/// Edge distribution lookups
#[async_trait]
pub trait DistributionApi: Send + Sync {
    async fn find_by_alias(&self, alias: &str) -> Result<Option<ExistingDistribution>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    pub id: String,
    pub arn: String,
}

/// Message archives and their configuration-set link
#[async_trait]
pub trait ArchiveApi: Send + Sync {
    async fn create_archive(
        &self,
        name: &str,
        retention: ArchiveRetention,
        kms_key_arn: Option<&str>,
    ) -> Result<ArchiveHandle>;

    async fn link_archive(&self, config_set: &str, archive_arn: &str) -> Result<()>;

    async fn unlink_archive(&self, config_set: &str) -> Result<()>;

    async fn delete_archive(&self, archive_id: &str) -> Result<()>;
}

/// Public DNS resolution used by `verify`
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Values published at `name`, normalized (no quotes, no trailing dot)
    async fn resolve(&self, name: &str, record_type: RecordType) -> Result<Vec<String>>;
}

/// Cross-account role assumption
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        external_id: Option<&str>,
        session_name: &str,
        duration: Duration,
    ) -> Result<Credential>;
}

/// Cloud APIs the lifecycle commands use
#[derive(Clone)]
pub struct CloudApis {
    pub account: Arc<dyn AccountApi>,
    pub identities: Arc<dyn IdentityApi>,
    pub distributions: Arc<dyn DistributionApi>,
    pub archives: Arc<dyn ArchiveApi>,
    /// Writable zones, tried in order
    pub zones: Vec<Arc<dyn DnsZoneApi>>,
}

/// A zone found to be authoritative for a domain
#[derive(Clone)]
pub struct ZoneControl {
    pub api: Arc<dyn DnsZoneApi>,
    pub zone_id: String,
}

impl ZoneControl {
    pub fn provider(&self) -> ZoneProvider {
        self.api.provider()
    }
}

impl fmt::Debug for ZoneControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneControl")
            .field("provider", &self.provider())
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

impl CloudApis {
    /// First writable zone authoritative for `domain`
    pub async fn zone_control(&self, domain: &str) -> Result<Option<ZoneControl>> {
        for api in &self.zones {
            if let Some(zone_id) = api.zone_for(domain).await? {
                tracing::debug!("{} controls {} (zone {})", api.provider(), domain, zone_id);
                return Ok(Some(ZoneControl {
                    api: Arc::clone(api),
                    zone_id,
                }));
            }
        }
        Ok(None)
    }
}
