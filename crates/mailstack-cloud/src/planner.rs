//! Resource planner
//!
//! Turns an integration level, resolved feature flags and facts gathered
//! about the account into a [`ResourceGraph`]. Planning is pure: nothing
//! here talks to the cloud.

use crate::archive::ArchiveRetention;
use crate::builders::{
    ArchiveBuilder, CoreBuilder, EdgeBuilder, GroupBuilder, SendingBuilder, WireUpBuilder,
};
use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::iam::ConsoleAccess;
use crate::provider::ExistingDistribution;
use crate::record::{HostingProvider, IntegrationLevel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named bundles of optional features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Starter,
    Production,
    Enterprise,
    Custom,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Starter => write!(f, "starter"),
            Preset::Production => write!(f, "production"),
            Preset::Enterprise => write!(f, "enterprise"),
            Preset::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for Preset {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "starter" => Ok(Preset::Starter),
            "production" => Ok(Preset::Production),
            "enterprise" => Ok(Preset::Enterprise),
            "custom" => Ok(Preset::Custom),
            other => Err(StackError::InvalidConfig(format!(
                "unknown preset '{}' (expected starter, production, enterprise or custom)",
                other
            ))),
        }
    }
}

/// Optional features requested for a stack
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub config_set: bool,
    pub event_tracking: bool,
    pub tracking_domain: Option<String>,
    pub https_tracking: bool,
    pub archiving: Option<ArchiveRetention>,
    /// MAIL FROM subdomain label (or full domain)
    pub mail_from: Option<String>,
}

impl FeatureFlags {
    /// Flags a preset turns on by itself
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Starter | Preset::Custom => FeatureFlags::default(),
            Preset::Production => FeatureFlags {
                config_set: true,
                event_tracking: true,
                ..Default::default()
            },
            Preset::Enterprise => FeatureFlags {
                config_set: true,
                event_tracking: true,
                archiving: Some(ArchiveRetention::OneYear),
                ..Default::default()
            },
        }
    }

    /// Preset flags combined with explicitly requested ones
    pub fn resolve(preset: Preset, requested: &FeatureFlags) -> Self {
        let mut flags = FeatureFlags::from_preset(preset).merge(requested);
        if preset == Preset::Enterprise && flags.tracking_domain.is_some() {
            flags.https_tracking = true;
        }
        flags.with_dependencies()
    }

    /// Union of two flag sets; values in `other` win
    pub fn merge(mut self, other: &FeatureFlags) -> Self {
        self.config_set |= other.config_set;
        self.event_tracking |= other.event_tracking;
        self.https_tracking |= other.https_tracking;
        if other.tracking_domain.is_some() {
            self.tracking_domain = other.tracking_domain.clone();
        }
        if other.archiving.is_some() {
            self.archiving = other.archiving;
        }
        if other.mail_from.is_some() {
            self.mail_from = other.mail_from.clone();
        }
        self
    }

    /// Turn on the configuration set for every feature that hangs off it
    pub fn with_dependencies(mut self) -> Self {
        if self.event_tracking || self.tracking_domain.is_some() || self.archiving.is_some() {
            self.config_set = true;
        }
        self
    }

    /// Reject combinations that would plan a dependent without its dependency
    pub fn check(&self) -> Result<()> {
        let needs_config_set = [
            (self.event_tracking, "event tracking"),
            (self.tracking_domain.is_some(), "a tracking domain"),
            (self.archiving.is_some(), "email archiving"),
        ];
        if !self.config_set {
            if let Some((_, feature)) = needs_config_set.iter().find(|(on, _)| *on) {
                return Err(StackError::InvalidPlan(format!(
                    "{} requires a configuration set",
                    feature
                )));
            }
        }
        if self.https_tracking && self.tracking_domain.is_none() {
            return Err(StackError::InvalidPlan(
                "https tracking requires --tracking-domain".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether any optional feature is requested
    pub fn is_empty(&self) -> bool {
        *self == FeatureFlags::default()
    }
}

/// How the tracking certificate gets validated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CertificateValidation {
    /// Validation records are written into this Route 53 zone by the engine
    Automatic { zone_id: String },
    /// Records are handed back to the caller
    #[default]
    Manual,
}

/// Facts about the account the planner needs
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub account_id: String,
    pub region: String,
    pub provider: HostingProvider,
    pub domain: Option<String>,
    /// The domain is already a verified or pending identity owned by the user
    pub domain_identity_exists: bool,
    pub existing_oidc_provider: Option<String>,
    pub console_access: Option<ConsoleAccess>,
    pub function_artifact: Option<String>,
    pub existing_distribution: Option<ExistingDistribution>,
    pub validation: CertificateValidation,
    /// A certificate ARN from a previous apply is on record
    pub certificate_recorded: bool,
    pub kms_key_arn: Option<String>,
}

impl PlanContext {
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        provider: HostingProvider,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            provider,
            domain: None,
            domain_identity_exists: false,
            existing_oidc_provider: None,
            console_access: None,
            function_artifact: None,
            existing_distribution: None,
            validation: CertificateValidation::default(),
            certificate_recorded: false,
            kms_key_arn: None,
        }
    }
}

/// Build the resource graph for `level` and `flags`
pub fn plan(
    level: IntegrationLevel,
    flags: &FeatureFlags,
    ctx: &PlanContext,
) -> Result<ResourceGraph> {
    let flags = flags.clone().with_dependencies();
    flags.check()?;

    if level == IntegrationLevel::DashboardOnly && !flags.is_empty() {
        return Err(StackError::InvalidPlan(
            "dashboard-only connections cannot enable sending features; use init or upgrade"
                .to_string(),
        ));
    }

    let mut builders: Vec<Box<dyn GroupBuilder>> = vec![Box::new(CoreBuilder { level })];
    if level == IntegrationLevel::Enhanced {
        builders.push(Box::new(SendingBuilder));
        if flags.event_tracking {
            builders.push(Box::new(WireUpBuilder));
        }
        if flags.https_tracking {
            builders.push(Box::new(EdgeBuilder));
        }
        if flags.archiving.is_some() {
            builders.push(Box::new(ArchiveBuilder));
        }
    }

    let mut graph = ResourceGraph::new(&ctx.region);
    for builder in &builders {
        tracing::debug!("Planning {} group", builder.group());
        builder.build(ctx, &flags, &mut graph)?;
    }
    graph.validate()?;

    tracing::debug!("Planned {}", graph.summary());
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::nodes;
    use crate::graph::{ResourceGroup, ResourceKind, outputs};

    fn context() -> PlanContext {
        let mut ctx = PlanContext::new("123456789012", "eu-west-1", HostingProvider::Aws);
        ctx.domain = Some("example.com".into());
        ctx.function_artifact = Some("/tmp/event-processor.zip".into());
        ctx
    }

    fn names(graph: &ResourceGraph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_dashboard_only_plans_role() {
        let graph = plan(IntegrationLevel::DashboardOnly, &FeatureFlags::default(), &context())
            .unwrap();
        assert_eq!(names(&graph), vec![nodes::ROLE, nodes::ROLE_POLICY]);
        assert!(graph.outputs.contains_key(outputs::ROLE_ARN));
    }

    #[test]
    fn test_dashboard_only_rejects_features() {
        let flags = FeatureFlags::from_preset(Preset::Production);
        let err = plan(IntegrationLevel::DashboardOnly, &flags, &context()).unwrap_err();
        assert!(matches!(err, StackError::InvalidPlan(_)));
    }

    #[test]
    fn test_production_plans_in_dependency_order() {
        let flags = FeatureFlags::resolve(Preset::Production, &FeatureFlags::default());
        let graph = plan(IntegrationLevel::Enhanced, &flags, &context()).unwrap();
        let order = names(&graph);

        let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert!(position(nodes::ROLE) < position(nodes::CONFIG_SET));
        assert!(position(nodes::CONFIG_SET) < position(nodes::HISTORY_TABLE));
        assert!(position(nodes::HISTORY_TABLE) < position(nodes::PROCESSOR));
        assert!(position(nodes::PROCESSOR) < position(nodes::PROCESSOR_SUBSCRIPTION));
        assert_eq!(
            graph.groups().into_iter().collect::<Vec<_>>(),
            vec![ResourceGroup::Core, ResourceGroup::Sending, ResourceGroup::History]
        );
    }

    #[test]
    fn test_archive_always_comes_with_config_set() {
        let requested = FeatureFlags {
            archiving: Some(ArchiveRetention::ThreeMonths),
            ..Default::default()
        };
        let flags = FeatureFlags::resolve(Preset::Custom, &requested);
        let graph = plan(IntegrationLevel::Enhanced, &flags, &context()).unwrap();
        assert!(graph.contains_kind(ResourceKind::ArchiveLink));
        assert!(graph.contains_kind(ResourceKind::ConfigurationSet));

        // without dependency closure the flags are refused outright
        assert!(requested.check().is_err());
        let mut graph = ResourceGraph::new("eu-west-1");
        assert!(ArchiveBuilder.build(&context(), &requested, &mut graph).is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_event_tracking_needs_artifact() {
        let mut ctx = context();
        ctx.function_artifact = None;
        let flags = FeatureFlags::resolve(Preset::Production, &FeatureFlags::default());
        let err = plan(IntegrationLevel::Enhanced, &flags, &ctx).unwrap_err();
        assert!(matches!(err, StackError::InvalidConfig(_)));
    }

    #[test]
    fn test_existing_domain_identity_not_planned() {
        let mut ctx = context();
        ctx.domain_identity_exists = true;
        let graph = plan(IntegrationLevel::Enhanced, &FeatureFlags::default(), &ctx).unwrap();
        assert!(graph.node(nodes::DOMAIN_IDENTITY).is_none());
        assert_eq!(graph.outputs[outputs::DOMAIN].value, "example.com");
    }

    #[test]
    fn test_vercel_reuses_existing_oidc_provider() {
        let vercel = HostingProvider::Vercel {
            team_slug: "acme".into(),
            project_name: "web".into(),
        };
        let mut ctx = PlanContext::new("1", "us-east-1", vercel);
        let graph = plan(IntegrationLevel::DashboardOnly, &FeatureFlags::default(), &ctx).unwrap();
        assert!(graph.node(nodes::OIDC_PROVIDER).is_some());

        let existing = "arn:aws:iam::1:oidc-provider/oidc.vercel.com/acme";
        ctx.existing_oidc_provider = Some(existing.into());
        let graph = plan(IntegrationLevel::DashboardOnly, &FeatureFlags::default(), &ctx).unwrap();
        assert!(graph.node(nodes::OIDC_PROVIDER).is_none());
        assert_eq!(graph.outputs[outputs::OIDC_PROVIDER_ARN].value, existing);
    }

    #[test]
    fn test_enterprise_with_tracking_plans_edge() {
        let requested = FeatureFlags {
            tracking_domain: Some("track.example.com".into()),
            ..Default::default()
        };
        let flags = FeatureFlags::resolve(Preset::Enterprise, &requested);
        assert!(flags.https_tracking);

        // manual validation: certificate and firewall only
        let graph = plan(IntegrationLevel::Enhanced, &flags, &context()).unwrap();
        assert!(graph.node(nodes::CERTIFICATE).is_some());
        assert!(graph.node(nodes::DISTRIBUTION).is_none());
        assert_eq!(
            graph.node(nodes::CERTIFICATE).unwrap().provider.as_deref(),
            Some(nodes::US_EAST_1)
        );

        let mut ctx = context();
        ctx.validation = CertificateValidation::Automatic {
            zone_id: "Z123".into(),
        };
        let graph = plan(IntegrationLevel::Enhanced, &flags, &ctx).unwrap();
        let distribution = graph.node(nodes::DISTRIBUTION).unwrap();
        assert_eq!(
            distribution.properties["origins"][0]["domainName"],
            "r.eu-west-1.awstrack.me"
        );
        assert_eq!(
            distribution.properties["defaultCacheBehavior"]["defaultTtl"],
            0
        );
        assert!(graph.node(nodes::CERTIFICATE_VALIDATION).is_some());
    }

    #[test]
    fn test_existing_distribution_is_reused() {
        let requested = FeatureFlags {
            tracking_domain: Some("track.example.com".into()),
            https_tracking: true,
            ..Default::default()
        };
        let mut ctx = context();
        ctx.existing_distribution = Some(ExistingDistribution {
            id: "E123".into(),
            domain_name: "d111.cloudfront.net".into(),
        });
        let flags = FeatureFlags::resolve(Preset::Custom, &requested);
        let graph = plan(IntegrationLevel::Enhanced, &flags, &ctx).unwrap();
        assert!(!graph.contains_kind(ResourceKind::Distribution));
        assert!(!graph.contains_kind(ResourceKind::Certificate));
        assert_eq!(
            graph.outputs[outputs::DISTRIBUTION_DOMAIN].value,
            "d111.cloudfront.net"
        );
    }

    #[test]
    fn test_https_without_tracking_domain_rejected() {
        let flags = FeatureFlags {
            config_set: true,
            https_tracking: true,
            ..Default::default()
        };
        assert!(matches!(
            plan(IntegrationLevel::Enhanced, &flags, &context()),
            Err(StackError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("Enterprise".parse::<Preset>().unwrap(), Preset::Enterprise);
        assert!("gold".parse::<Preset>().is_err());
        assert!(FeatureFlags::from_preset(Preset::Starter).is_empty());
    }
}
