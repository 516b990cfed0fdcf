use super::{GroupBuilder, names, nodes};
use crate::error::{Result, StackError};
use crate::graph::{ResourceGraph, ResourceGroup, ResourceKind, ResourceNode, outputs, reference};
use crate::planner::{FeatureFlags, PlanContext};
use serde_json::json;

/// Configuration set and, when the domain is new, its identity
pub struct SendingBuilder;

impl GroupBuilder for SendingBuilder {
    fn group(&self) -> ResourceGroup {
        ResourceGroup::Sending
    }

    fn build(
        &self,
        ctx: &PlanContext,
        flags: &FeatureFlags,
        graph: &mut ResourceGraph,
    ) -> Result<()> {
        let group = self.group();

        if flags.config_set {
            let mut properties = json!({
                "configurationSetName": names::CONFIG_SET,
                "reputationOptions": { "reputationMetricsEnabled": true },
                "sendingOptions": { "sendingEnabled": true },
            });
            if let Some(tracking) = &flags.tracking_domain {
                properties["trackingOptions"] = json!({
                    "customRedirectDomain": tracking,
                    "httpsPolicy": if flags.https_tracking { "REQUIRE" } else { "OPTIONAL" },
                });
                graph.add_output(outputs::TRACKING_DOMAIN, group, json!(tracking));
            }
            graph.add(ResourceNode::new(
                nodes::CONFIG_SET,
                ResourceKind::ConfigurationSet,
                group,
                properties,
            ));
            graph.add_output(
                outputs::CONFIG_SET_NAME,
                group,
                json!(reference(nodes::CONFIG_SET, "configurationSetName")),
            );
        } else if flags.tracking_domain.is_some() {
            return Err(StackError::InvalidPlan(
                "a tracking domain requires a configuration set".to_string(),
            ));
        }

        if let Some(domain) = &ctx.domain {
            graph.add_output(outputs::DOMAIN, group, json!(domain));
            // an identity the user already verified is theirs, never ours
            if !ctx.domain_identity_exists {
                let mut properties = json!({ "emailIdentity": domain });
                if flags.config_set {
                    properties["configurationSetName"] =
                        json!(reference(nodes::CONFIG_SET, "configurationSetName"));
                }
                graph.add(ResourceNode::new(
                    nodes::DOMAIN_IDENTITY,
                    ResourceKind::EmailIdentity,
                    group,
                    properties,
                ));
                graph.add_output(
                    outputs::DKIM_TOKENS,
                    group,
                    json!(reference(nodes::DOMAIN_IDENTITY, "dkimSigningAttributes.tokens")),
                );
            }
        }
        Ok(())
    }
}
