//! Resource group builders
//!
//! Each optional group has its own builder, chosen by the planner with a
//! plain conditional over the resolved feature flags.

mod archive;
mod edge;
mod role;
mod sending;
mod wireup;

pub use self::archive::ArchiveBuilder;
pub use self::edge::EdgeBuilder;
pub use self::role::CoreBuilder;
pub use self::sending::SendingBuilder;
pub use self::wireup::WireUpBuilder;

use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceGroup};
use crate::planner::{FeatureFlags, PlanContext};

/// Every physical resource mailstack creates starts with this
pub const RESOURCE_PREFIX: &str = "mailstack-";

/// Physical names of created resources
pub mod names {
    pub const ROLE: &str = "mailstack-email-role";
    pub const CONFIG_SET: &str = "mailstack-email-tracking";
    pub const EVENT_TOPIC: &str = "mailstack-email-events";
    pub const HISTORY_TABLE: &str = "mailstack-email-history";
    pub const EVENT_PROCESSOR: &str = "mailstack-email-event-processor";
    pub const EVENT_PROCESSOR_ROLE: &str = "mailstack-email-event-processor-role";
    pub const FIREWALL: &str = "mailstack-tracking-firewall";
    pub const ARCHIVE: &str = "mailstack-email-archive";
}

/// Logical node names inside the graph
pub mod nodes {
    pub const OIDC_PROVIDER: &str = "vercelOidcProvider";
    pub const ROLE: &str = "emailRole";
    pub const ROLE_POLICY: &str = "emailRolePolicy";
    pub const CONFIG_SET: &str = "configSet";
    pub const DOMAIN_IDENTITY: &str = "domainIdentity";
    pub const EVENT_TOPIC: &str = "eventTopic";
    pub const EVENT_DESTINATION: &str = "eventDestination";
    pub const HISTORY_TABLE: &str = "historyTable";
    pub const PROCESSOR_ROLE: &str = "processorRole";
    pub const PROCESSOR_ROLE_POLICY: &str = "processorRolePolicy";
    pub const PROCESSOR: &str = "processorFunction";
    pub const PROCESSOR_PERMISSION: &str = "processorPermission";
    pub const PROCESSOR_SUBSCRIPTION: &str = "processorSubscription";
    pub const US_EAST_1: &str = "usEast1";
    pub const CERTIFICATE: &str = "trackingCertificate";
    pub const VALIDATION_RECORD: &str = "certificateValidationRecord";
    pub const CERTIFICATE_VALIDATION: &str = "certificateValidation";
    pub const FIREWALL: &str = "trackingFirewall";
    pub const DISTRIBUTION: &str = "trackingDistribution";
    pub const ARCHIVE: &str = "emailArchive";
    pub const ARCHIVE_LINK: &str = "archiveLink";
}

/// Adds one resource group to a graph
pub trait GroupBuilder {
    fn group(&self) -> ResourceGroup;

    fn build(
        &self,
        ctx: &PlanContext,
        flags: &FeatureFlags,
        graph: &mut ResourceGraph,
    ) -> Result<()>;
}
