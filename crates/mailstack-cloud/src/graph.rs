//! Resource graph handed to the provisioning engine
//!
//! A [`ResourceGraph`] is an ordered list of [`ResourceNode`]s. Property
//! values may reference another node's attribute with `${node.attribute}`;
//! every referenced node must appear earlier in the list, so the graph is
//! always in dependency order.

use crate::dns::{DnsRecord, RecordGroup, RecordType};
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Names of the outputs a graph exposes
pub mod outputs {
    pub const ROLE_ARN: &str = "roleArn";
    pub const OIDC_PROVIDER_ARN: &str = "oidcProviderArn";
    pub const CONFIG_SET_NAME: &str = "configSetName";
    pub const DOMAIN: &str = "domain";
    pub const DKIM_TOKENS: &str = "dkimTokens";
    pub const TRACKING_DOMAIN: &str = "trackingDomain";
    pub const HISTORY_TABLE_NAME: &str = "historyTableName";
    pub const FUNCTION_ARNS: &str = "functionArns";
    pub const CERTIFICATE_ARN: &str = "certificateArn";
    pub const CERTIFICATE_VALIDATION: &str = "certificateValidation";
    pub const DISTRIBUTION_DOMAIN: &str = "distributionDomain";
}

/// Build a reference to another node's attribute
pub fn reference(node: &str, attribute: &str) -> String {
    format!("${{{}.{}}}", node, attribute)
}

/// Independently toggleable slices of the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceGroup {
    /// Execution role and federation provider
    Core,
    /// Configuration set and domain identity
    Sending,
    /// Event topic, history table and event processors
    History,
    /// Tracking certificate, firewall and distribution
    Edge,
    /// Message archive and its link to the configuration set
    Archive,
}

impl ResourceGroup {
    /// Groups that must be present for this one to be planned
    pub fn dependencies(&self) -> &'static [ResourceGroup] {
        match self {
            ResourceGroup::Core => &[],
            ResourceGroup::Sending => &[ResourceGroup::Core],
            ResourceGroup::History | ResourceGroup::Edge | ResourceGroup::Archive => {
                &[ResourceGroup::Core, ResourceGroup::Sending]
            }
        }
    }

    /// Failure of a base group aborts the command
    pub fn is_base(&self) -> bool {
        matches!(self, ResourceGroup::Core | ResourceGroup::Sending)
    }
}

impl fmt::Display for ResourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceGroup::Core => "core",
            ResourceGroup::Sending => "sending",
            ResourceGroup::History => "history",
            ResourceGroup::Edge => "edge",
            ResourceGroup::Archive => "archive",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    OidcProvider,
    Role,
    RolePolicy,
    ConfigurationSet,
    EmailIdentity,
    Topic,
    EventDestination,
    Table,
    Function,
    FunctionPermission,
    TopicSubscription,
    RegionProvider,
    Certificate,
    DnsRecord,
    CertificateValidation,
    Firewall,
    Distribution,
    Archive,
    ArchiveLink,
}

impl ResourceKind {
    /// Whether the provisioning engine creates this node
    ///
    /// Archive nodes are executed through the archive API after the engine
    /// stages have run.
    pub fn is_engine_managed(&self) -> bool {
        !matches!(self, ResourceKind::Archive | ResourceKind::ArchiveLink)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Logical name, unique within the graph
    pub name: String,
    pub kind: ResourceKind,
    pub group: ResourceGroup,
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Logical name of an explicit region provider node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ResourceNode {
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        group: ResourceGroup,
        properties: Value,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            group,
            properties,
            depends_on: Vec::new(),
            provider: None,
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Every node this one needs: explicit dependencies, the provider and
    /// anything referenced from its properties
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs: BTreeSet<String> = self.depends_on.iter().cloned().collect();
        if let Some(provider) = &self.provider {
            refs.insert(provider.clone());
        }
        collect_references(&self.properties, &mut refs);
        refs
    }
}

/// A named output expression, owned by the group that produces it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphOutput {
    pub group: ResourceGroup,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGraph {
    pub region: String,
    pub nodes: Vec<ResourceNode>,
    pub outputs: BTreeMap<String, GraphOutput>,
}

impl ResourceGraph {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            nodes: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, node: ResourceNode) {
        self.nodes.push(node);
    }

    pub fn add_output(&mut self, name: &str, group: ResourceGroup, value: Value) {
        self.outputs
            .insert(name.to_string(), GraphOutput { group, value });
    }

    pub fn node(&self, name: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn contains_kind(&self, kind: ResourceKind) -> bool {
        self.nodes.iter().any(|n| n.kind == kind)
    }

    pub fn nodes_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Groups with at least one node or output
    pub fn groups(&self) -> BTreeSet<ResourceGroup> {
        self.nodes
            .iter()
            .map(|n| n.group)
            .chain(self.outputs.values().map(|o| o.group))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes the provisioning engine is responsible for
    pub fn engine_nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(|n| n.kind.is_engine_managed())
    }

    /// Check ordering and dependency rules
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            for reference in node.references() {
                if !seen.contains(reference.as_str()) {
                    return Err(StackError::InvalidPlan(format!(
                        "{} references {} which is not planned before it",
                        node.name, reference
                    )));
                }
            }
            if !seen.insert(node.name.as_str()) {
                return Err(StackError::InvalidPlan(format!(
                    "duplicate resource name {}",
                    node.name
                )));
            }
        }

        let groups = self.groups();
        for group in &groups {
            for dependency in group.dependencies() {
                if !groups.contains(dependency) {
                    return Err(StackError::InvalidPlan(format!(
                        "{} group planned without {}",
                        group, dependency
                    )));
                }
            }
        }

        if self.contains_kind(ResourceKind::ArchiveLink)
            && !self.contains_kind(ResourceKind::ConfigurationSet)
        {
            return Err(StackError::InvalidPlan(
                "archive link planned without a configuration set".to_string(),
            ));
        }

        for (name, output) in &self.outputs {
            let mut refs = BTreeSet::new();
            collect_references(&output.value, &mut refs);
            if let Some(missing) = refs.iter().find(|r| !seen.contains(r.as_str())) {
                return Err(StackError::InvalidPlan(format!(
                    "output {} references unknown resource {}",
                    name, missing
                )));
            }
        }
        Ok(())
    }

    /// The part of the graph belonging to `groups`
    pub fn subgraph(&self, groups: &BTreeSet<ResourceGroup>) -> ResourceGraph {
        ResourceGraph {
            region: self.region.clone(),
            nodes: self
                .nodes
                .iter()
                .filter(|n| groups.contains(&n.group))
                .cloned()
                .collect(),
            outputs: self
                .outputs
                .iter()
                .filter(|(_, o)| groups.contains(&o.group))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn summary(&self) -> PlanSummary {
        let mut per_group = BTreeMap::new();
        for node in &self.nodes {
            *per_group.entry(node.group).or_insert(0) += 1;
        }
        PlanSummary {
            resources: self.nodes.len(),
            per_group,
        }
    }
}

fn collect_references(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            let mut rest = s.as_str();
            while let Some(start) = rest.find("${") {
                let after = &rest[start + 2..];
                let Some(end) = after.find('}') else { break };
                let expr = &after[..end];
                let node = expr
                    .split(['.', '['])
                    .next()
                    .unwrap_or_default();
                if !node.is_empty() {
                    refs.insert(node.to_string());
                }
                rest = &after[end + 1..];
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, refs)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, refs)),
        _ => {}
    }
}

/// Count of planned resources
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub resources: usize,
    pub per_group: BTreeMap<ResourceGroup, usize>,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resources", self.resources)?;
        if !self.per_group.is_empty() {
            let parts: Vec<String> = self
                .per_group
                .iter()
                .map(|(g, n)| format!("{} {}", n, g))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Raw outputs as returned by the provisioning engine
pub type FlatOutputs = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendingOutputs {
    pub config_set_name: Option<String>,
    pub domain: Option<String>,
    pub dkim_tokens: Vec<String>,
    pub tracking_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOutputs {
    pub table_name: String,
    pub function_arns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeOutputs {
    pub tracking_domain: String,
    pub certificate_arn: Option<String>,
    pub distribution_domain: Option<String>,
    /// Records to publish when certificate validation is manual
    pub validation_records: Vec<DnsRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutputs {
    pub archive_id: String,
    pub archive_arn: String,
    pub linked: bool,
}

/// Typed result of a successful apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutputs {
    pub role_arn: String,
    pub oidc_provider_arn: Option<String>,
    pub sending: Option<SendingOutputs>,
    pub history: Option<HistoryOutputs>,
    pub edge: Option<EdgeOutputs>,
    pub archive: Option<ArchiveOutputs>,
}

impl StackOutputs {
    /// Parse engine outputs, enforcing which fields travel together
    pub fn from_flat(flat: &FlatOutputs) -> Result<Self> {
        let role_arn = string_output(flat, outputs::ROLE_ARN).ok_or_else(|| {
            StackError::Engine(format!("apply returned no {} output", outputs::ROLE_ARN))
        })?;

        let config_set_name = string_output(flat, outputs::CONFIG_SET_NAME);
        let domain = string_output(flat, outputs::DOMAIN);
        let sending_tracking = string_output(flat, outputs::TRACKING_DOMAIN);
        let sending = if config_set_name.is_some() || domain.is_some() {
            Some(SendingOutputs {
                config_set_name,
                domain,
                dkim_tokens: list_output(flat, outputs::DKIM_TOKENS),
                tracking_domain: sending_tracking.clone(),
            })
        } else {
            None
        };

        let table_name = string_output(flat, outputs::HISTORY_TABLE_NAME);
        let function_arns = list_output(flat, outputs::FUNCTION_ARNS);
        let history = match (table_name, function_arns.is_empty()) {
            (Some(table_name), false) => Some(HistoryOutputs {
                table_name,
                function_arns,
            }),
            (None, true) => None,
            _ => {
                return Err(StackError::Engine(
                    "history outputs are incomplete: table name and functions must both be present"
                        .to_string(),
                ));
            }
        };

        let certificate_arn = string_output(flat, outputs::CERTIFICATE_ARN);
        let distribution_domain = string_output(flat, outputs::DISTRIBUTION_DOMAIN);
        let edge = if certificate_arn.is_some() || distribution_domain.is_some() {
            let tracking_domain = sending_tracking.ok_or_else(|| {
                StackError::Engine("edge outputs without a tracking domain".to_string())
            })?;
            Some(EdgeOutputs {
                tracking_domain,
                certificate_arn,
                distribution_domain,
                validation_records: validation_records(flat),
            })
        } else {
            None
        };

        Ok(StackOutputs {
            role_arn,
            oidc_provider_arn: string_output(flat, outputs::OIDC_PROVIDER_ARN),
            sending,
            history,
            edge,
            archive: None,
        })
    }

    pub fn config_set_name(&self) -> Option<&str> {
        self.sending
            .as_ref()
            .and_then(|s| s.config_set_name.as_deref())
    }
}

fn string_output(flat: &FlatOutputs, name: &str) -> Option<String> {
    match flat.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn list_output(flat: &FlatOutputs, name: &str) -> Vec<String> {
    match flat.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn validation_records(flat: &FlatOutputs) -> Vec<DnsRecord> {
    let Some(Value::Array(options)) = flat.get(outputs::CERTIFICATE_VALIDATION) else {
        return Vec::new();
    };
    options
        .iter()
        .filter_map(|option| {
            let name = option.get("resourceRecordName")?.as_str()?;
            let value = option.get("resourceRecordValue")?.as_str()?;
            Some(DnsRecord {
                name: name.trim_end_matches('.').to_string(),
                record_type: RecordType::Cname,
                value: value.trim_end_matches('.').to_string(),
                group: RecordGroup::CertificateValidation,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str, kind: ResourceKind, group: ResourceGroup, props: Value) -> ResourceNode {
        ResourceNode::new(name, kind, group, props)
    }

    #[test]
    fn test_references_collected_from_properties() {
        let n = node(
            "policy",
            ResourceKind::RolePolicy,
            ResourceGroup::Core,
            json!({ "role": "${emailRole.id}", "items": ["${table.arn}/index/*", "plain"] }),
        )
        .depends_on("other");
        let refs: Vec<_> = n.references().into_iter().collect();
        assert_eq!(refs, vec!["emailRole", "other", "table"]);
    }

    #[test]
    fn test_validate_rejects_forward_reference() {
        let mut graph = ResourceGraph::new("us-east-1");
        graph.add(node(
            "policy",
            ResourceKind::RolePolicy,
            ResourceGroup::Core,
            json!({ "role": "${emailRole.id}" }),
        ));
        graph.add(node("emailRole", ResourceKind::Role, ResourceGroup::Core, json!({})));
        assert!(matches!(graph.validate(), Err(StackError::InvalidPlan(_))));
    }

    #[test]
    fn test_validate_rejects_archive_link_without_config_set() {
        let mut graph = ResourceGraph::new("us-east-1");
        graph.add(node("emailRole", ResourceKind::Role, ResourceGroup::Core, json!({})));
        graph.add(node("configSet", ResourceKind::Topic, ResourceGroup::Sending, json!({})));
        graph.add(node("archive", ResourceKind::Archive, ResourceGroup::Archive, json!({})));
        graph.add(node(
            "archiveLink",
            ResourceKind::ArchiveLink,
            ResourceGroup::Archive,
            json!({ "archive": "${archive.arn}" }),
        ));
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_subgraph_keeps_group_outputs() {
        let mut graph = ResourceGraph::new("us-east-1");
        graph.add(node("emailRole", ResourceKind::Role, ResourceGroup::Core, json!({})));
        graph.add(node("table", ResourceKind::Table, ResourceGroup::History, json!({})));
        graph.add_output(outputs::ROLE_ARN, ResourceGroup::Core, json!("${emailRole.arn}"));
        graph.add_output(
            outputs::HISTORY_TABLE_NAME,
            ResourceGroup::History,
            json!("${table.name}"),
        );

        let core = graph.subgraph(&BTreeSet::from([ResourceGroup::Core]));
        assert_eq!(core.nodes.len(), 1);
        assert_eq!(core.outputs.len(), 1);
        assert_eq!(core.summary().to_string(), "1 resources (1 core)");
    }

    #[test]
    fn test_outputs_presence_rules() {
        let mut flat = FlatOutputs::new();
        assert!(StackOutputs::from_flat(&flat).is_err());

        flat.insert(outputs::ROLE_ARN.into(), json!("arn:aws:iam::1:role/r"));
        let parsed = StackOutputs::from_flat(&flat).unwrap();
        assert!(parsed.sending.is_none() && parsed.history.is_none() && parsed.edge.is_none());

        flat.insert(outputs::HISTORY_TABLE_NAME.into(), json!("mailstack-email-history"));
        assert!(StackOutputs::from_flat(&flat).is_err());

        flat.insert(outputs::FUNCTION_ARNS.into(), json!(["arn:aws:lambda:fn"]));
        flat.insert(outputs::CONFIG_SET_NAME.into(), json!("mailstack-email-tracking"));
        flat.insert(outputs::TRACKING_DOMAIN.into(), json!("track.example.com"));
        flat.insert(outputs::CERTIFICATE_ARN.into(), json!("arn:aws:acm:cert"));
        flat.insert(
            outputs::CERTIFICATE_VALIDATION.into(),
            json!([{
                "domainName": "track.example.com",
                "resourceRecordName": "_abc.track.example.com.",
                "resourceRecordType": "CNAME",
                "resourceRecordValue": "_xyz.acm-validations.aws."
            }]),
        );
        let parsed = StackOutputs::from_flat(&flat).unwrap();
        assert_eq!(parsed.history.as_ref().unwrap().function_arns.len(), 1);
        assert_eq!(parsed.config_set_name(), Some("mailstack-email-tracking"));
        let edge = parsed.edge.unwrap();
        assert!(edge.distribution_domain.is_none());
        assert_eq!(edge.validation_records[0].name, "_abc.track.example.com");
    }
}
