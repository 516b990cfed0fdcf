use super::{GroupBuilder, names, nodes};
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceGroup, ResourceKind, ResourceNode, outputs, reference};
use crate::iam::{self, RoleParams};
use crate::planner::{FeatureFlags, PlanContext};
use crate::record::{HostingProvider, IntegrationLevel};
use serde_json::json;

/// Execution role, its inline policy and the federation provider
pub struct CoreBuilder {
    pub level: IntegrationLevel,
}

impl GroupBuilder for CoreBuilder {
    fn group(&self) -> ResourceGroup {
        ResourceGroup::Core
    }

    fn build(
        &self,
        ctx: &PlanContext,
        _flags: &FeatureFlags,
        graph: &mut ResourceGraph,
    ) -> Result<()> {
        let group = self.group();
        let mut oidc_provider_arn = ctx.existing_oidc_provider.clone();

        if let HostingProvider::Vercel { team_slug, .. } = &ctx.provider {
            if oidc_provider_arn.is_none() {
                let spec = iam::vercel_oidc_spec(team_slug);
                graph.add(ResourceNode::new(
                    nodes::OIDC_PROVIDER,
                    ResourceKind::OidcProvider,
                    group,
                    json!({
                        "url": spec.url,
                        "clientIdLists": spec.client_ids,
                        "thumbprintLists": [],
                    }),
                ));
                oidc_provider_arn = Some(reference(nodes::OIDC_PROVIDER, "arn"));
            }
            if let Some(arn) = &oidc_provider_arn {
                graph.add_output(outputs::OIDC_PROVIDER_ARN, group, json!(arn));
            }
        }

        let role = iam::build_role(
            names::ROLE,
            &ctx.provider,
            self.level,
            &RoleParams {
                account_id: ctx.account_id.clone(),
                region: ctx.region.clone(),
                oidc_provider_arn,
                console_access: ctx.console_access.clone(),
            },
        )?;

        graph.add(ResourceNode::new(
            nodes::ROLE,
            ResourceKind::Role,
            group,
            json!({
                "name": role.name,
                "description": format!("mailstack {} access", self.level),
                "assumeRolePolicy": role.trust_policy,
                "maxSessionDuration": 3600,
            }),
        ));
        graph.add(ResourceNode::new(
            nodes::ROLE_POLICY,
            ResourceKind::RolePolicy,
            group,
            json!({
                "name": format!("{}-policy", names::ROLE),
                "role": reference(nodes::ROLE, "id"),
                "policy": role.permissions,
            }),
        ));
        graph.add_output(outputs::ROLE_ARN, group, json!(reference(nodes::ROLE, "arn")));
        Ok(())
    }
}
