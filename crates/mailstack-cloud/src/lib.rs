//! mailstack core
//!
//! Decides which AWS resources an email stack needs, applies them through
//! a provisioning engine, records what was created or changed so it can be
//! reversed exactly, and brokers short-lived credentials for the dashboard.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  mailstack CLI                  │
//! │     (init / upgrade / restore / destroy ...)    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                mailstack-cloud                  │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Lifecycle   │  │   Metadata   │             │
//! │  │ Orchestrator │──│    Store     │             │
//! │  └──────┬───────┘  └──────────────┘             │
//! │  ┌──────▼───────┐  ┌──────────────┐             │
//! │  │   Planner +  │  │  Credential  │             │
//! │  │   Builders   │  │    Broker    │             │
//! │  └──────────────┘  └──────────────┘             │
//! │      trait ProvisioningEngine / cloud APIs      │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐ ┌────────────┐
//! │    pulumi     │ │      aws      │ │ cloudflare │
//! └───────────────┘ └───────────────┘ └────────────┘
//! ```

pub mod archive;
pub mod builders;
pub mod credentials;
pub mod dns;
pub mod error;
pub mod events;
pub mod graph;
pub mod iam;
pub mod lifecycle;
pub mod planner;
pub mod provider;
pub mod record;
pub mod state;

// Re-exports
pub use archive::{ArchiveBinder, ArchiveRequest, ArchiveRetention};
pub use credentials::{BrokerConfig, BrokerError, Credential, CredentialBroker};
pub use dns::{DnsOutcome, DnsRecord, OverallStatus, RecordGroup, RecordStatus, VerifyReport};
pub use error::{Result, StackError};
pub use graph::{PlanSummary, ResourceGraph, ResourceGroup, ResourceKind, ResourceNode, StackOutputs};
pub use iam::ConsoleAccess;
pub use lifecycle::{
    DeployReport, DeployRequest, DestroyOutcome, Diagnostic, LifecycleOptions, Orchestrator,
    RestoreOutcome, RestorePlan, StatusReport, UpgradeRequest,
};
pub use planner::{FeatureFlags, PlanContext, Preset};
pub use provider::{
    AccountApi, ArchiveApi, CloudApis, DistributionApi, DnsResolver, DnsZoneApi, IdentityApi,
    ProvisioningEngine, RoleAssumer,
};
pub use record::{
    AttachPolicy, ConnectionKey, ConnectionRecord, FeatureName, HostingProvider, IntegrationLevel,
};
pub use state::{MetadataStore, StateLock};
