use super::{GroupBuilder, names, nodes};
use crate::error::{Result, StackError};
use crate::graph::{ResourceGraph, ResourceGroup, ResourceKind, ResourceNode, reference};
use crate::planner::{FeatureFlags, PlanContext};
use serde_json::json;

/// Archive plus its link to the configuration set
///
/// Both nodes are executed by the archive binder, not the engine.
pub struct ArchiveBuilder;

impl GroupBuilder for ArchiveBuilder {
    fn group(&self) -> ResourceGroup {
        ResourceGroup::Archive
    }

    fn build(
        &self,
        ctx: &PlanContext,
        flags: &FeatureFlags,
        graph: &mut ResourceGraph,
    ) -> Result<()> {
        let group = self.group();
        let retention = flags.archiving.ok_or_else(|| {
            StackError::InvalidPlan("archive group planned without a retention".to_string())
        })?;
        if graph.node(nodes::CONFIG_SET).is_none() {
            return Err(StackError::InvalidPlan(
                "an archive requires a configuration set".to_string(),
            ));
        }

        graph.add(ResourceNode::new(
            nodes::ARCHIVE,
            ResourceKind::Archive,
            group,
            json!({
                "name": names::ARCHIVE,
                "retention": retention,
                "kmsKeyArn": ctx.kms_key_arn,
            }),
        ));
        graph.add(ResourceNode::new(
            nodes::ARCHIVE_LINK,
            ResourceKind::ArchiveLink,
            group,
            json!({
                "configurationSetName": reference(nodes::CONFIG_SET, "configurationSetName"),
                "archiveArn": reference(nodes::ARCHIVE, "arn"),
            }),
        ));
        Ok(())
    }
}
