use super::{GroupBuilder, names, nodes};
use crate::error::{Result, StackError};
use crate::events::{PARTITION_KEY, PUBLISHED_EVENT_TYPES, RETENTION_DAYS, SORT_KEY, TTL_ATTRIBUTE};
use crate::graph::{ResourceGraph, ResourceGroup, ResourceKind, ResourceNode, outputs, reference};
use crate::planner::{FeatureFlags, PlanContext};
use serde_json::json;

const RUNTIME: &str = "nodejs20.x";
const HANDLER: &str = "index.handler";

/// History table plus the event processor subscribed to the
/// configuration set's notification topic
pub struct WireUpBuilder;

impl GroupBuilder for WireUpBuilder {
    fn group(&self) -> ResourceGroup {
        ResourceGroup::History
    }

    fn build(
        &self,
        ctx: &PlanContext,
        _flags: &FeatureFlags,
        graph: &mut ResourceGraph,
    ) -> Result<()> {
        let group = self.group();
        let artifact = ctx.function_artifact.as_deref().ok_or_else(|| {
            StackError::InvalidConfig(
                "event tracking needs the event-processor artifact (functionArtifact in settings.json)"
                    .to_string(),
            )
        })?;

        graph.add(ResourceNode::new(
            nodes::EVENT_TOPIC,
            ResourceKind::Topic,
            group,
            json!({ "name": names::EVENT_TOPIC }),
        ));
        graph.add(ResourceNode::new(
            nodes::EVENT_DESTINATION,
            ResourceKind::EventDestination,
            group,
            json!({
                "configurationSetName": reference(nodes::CONFIG_SET, "configurationSetName"),
                "eventDestinationName": names::EVENT_TOPIC,
                "eventDestination": {
                    "enabled": true,
                    "matchingEventTypes": PUBLISHED_EVENT_TYPES,
                    "snsDestination": { "topicArn": reference(nodes::EVENT_TOPIC, "arn") },
                },
            }),
        ));

        graph.add(ResourceNode::new(
            nodes::HISTORY_TABLE,
            ResourceKind::Table,
            group,
            json!({
                "name": names::HISTORY_TABLE,
                "billingMode": "PAY_PER_REQUEST",
                "hashKey": PARTITION_KEY,
                "rangeKey": SORT_KEY,
                "attributes": [
                    { "name": PARTITION_KEY, "type": "S" },
                    { "name": SORT_KEY, "type": "S" },
                ],
                "ttl": { "attributeName": TTL_ATTRIBUTE, "enabled": true },
            }),
        ));

        // the processor gets its own role: write one table, emit logs
        graph.add(ResourceNode::new(
            nodes::PROCESSOR_ROLE,
            ResourceKind::Role,
            group,
            json!({
                "name": names::EVENT_PROCESSOR_ROLE,
                "assumeRolePolicy": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" },
                        "Action": "sts:AssumeRole",
                    }],
                },
            }),
        ));
        graph.add(ResourceNode::new(
            nodes::PROCESSOR_ROLE_POLICY,
            ResourceKind::RolePolicy,
            group,
            json!({
                "role": reference(nodes::PROCESSOR_ROLE, "id"),
                "policy": {
                    "Version": "2012-10-17",
                    "Statement": [
                        {
                            "Effect": "Allow",
                            "Action": "dynamodb:PutItem",
                            "Resource": reference(nodes::HISTORY_TABLE, "arn"),
                        },
                        {
                            "Effect": "Allow",
                            "Action": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                            "Resource": format!("arn:aws:logs:{}:{}:*", ctx.region, ctx.account_id),
                        },
                    ],
                },
            }),
        ));

        graph.add(
            ResourceNode::new(
                nodes::PROCESSOR,
                ResourceKind::Function,
                group,
                json!({
                    "name": names::EVENT_PROCESSOR,
                    "runtime": RUNTIME,
                    "handler": HANDLER,
                    "role": reference(nodes::PROCESSOR_ROLE, "arn"),
                    "code": artifact,
                    "timeout": 30,
                    "memorySize": 256,
                    "environment": {
                        "variables": {
                            "HISTORY_TABLE_NAME": reference(nodes::HISTORY_TABLE, "name"),
                            "HISTORY_RETENTION_DAYS": RETENTION_DAYS.to_string(),
                        },
                    },
                }),
            )
            .depends_on(nodes::PROCESSOR_ROLE_POLICY),
        );
        graph.add(ResourceNode::new(
            nodes::PROCESSOR_PERMISSION,
            ResourceKind::FunctionPermission,
            group,
            json!({
                "action": "lambda:InvokeFunction",
                "function": reference(nodes::PROCESSOR, "name"),
                "principal": "sns.amazonaws.com",
                "sourceArn": reference(nodes::EVENT_TOPIC, "arn"),
            }),
        ));
        graph.add(
            ResourceNode::new(
                nodes::PROCESSOR_SUBSCRIPTION,
                ResourceKind::TopicSubscription,
                group,
                json!({
                    "topic": reference(nodes::EVENT_TOPIC, "arn"),
                    "protocol": "lambda",
                    "endpoint": reference(nodes::PROCESSOR, "arn"),
                }),
            )
            .depends_on(nodes::PROCESSOR_PERMISSION),
        );

        graph.add_output(
            outputs::HISTORY_TABLE_NAME,
            group,
            json!(reference(nodes::HISTORY_TABLE, "name")),
        );
        graph.add_output(
            outputs::FUNCTION_ARNS,
            group,
            json!([reference(nodes::PROCESSOR, "arn")]),
        );
        Ok(())
    }
}
