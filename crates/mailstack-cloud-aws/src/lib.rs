//! AWS implementations of the mailstack cloud collaborators
//!
//! | trait | service |
//! |---|---|
//! | `AccountApi` | STS, IAM |
//! | `IdentityApi` | SES v2 |
//! | `DnsZoneApi` | Route 53 |
//! | `DistributionApi` | CloudFront |
//! | `ArchiveApi` | Mail Manager, SES v2 |
//! | `RoleAssumer` | STS |
//!
//! Metrics for the dashboard path are read by [`SesMetricsReader`] with
//! brokered credentials.

pub mod account;
pub mod cloudfront;
pub mod context;
pub mod error;
pub mod identities;
pub mod mailmanager;
pub mod metrics;
pub mod route53;
pub mod sts;

pub use account::AwsAccount;
pub use cloudfront::CloudFrontDistributions;
pub use context::AwsContext;
pub use error::{AwsErrorKind, classify};
pub use identities::SesIdentities;
pub use mailmanager::MailManagerArchives;
pub use metrics::{SesMetrics, SesMetricsReader};
pub use route53::Route53Zones;
pub use sts::StsRoleAssumer;

use mailstack_cloud::{CloudApis, DnsZoneApi};
use std::sync::Arc;

/// Every AWS-backed collaborator, with Route 53 followed by `extra_zones`
/// as writable zones
pub fn cloud_apis(ctx: &AwsContext, extra_zones: Vec<Arc<dyn DnsZoneApi>>) -> CloudApis {
    let mut zones: Vec<Arc<dyn DnsZoneApi>> = vec![Arc::new(Route53Zones::new(ctx))];
    zones.extend(extra_zones);

    CloudApis {
        account: Arc::new(AwsAccount::new(ctx)),
        identities: Arc::new(SesIdentities::new(ctx)),
        distributions: Arc::new(CloudFrontDistributions::new(ctx)),
        archives: Arc::new(MailManagerArchives::new(ctx)),
        zones,
    }
}
