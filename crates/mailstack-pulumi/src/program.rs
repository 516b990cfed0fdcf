//! Pulumi YAML program rendering
//!
//! A [`ResourceGraph`] maps almost one to one onto a Pulumi YAML program:
//! nodes become `resources`, `${node.attr}` references are already in
//! Pulumi's interpolation syntax, and graph outputs become `outputs`.

use crate::error::{PulumiError, Result};
use mailstack_cloud::{ResourceGraph, ResourceKind, ResourceNode};
use serde::Serialize;
use serde_json::{Value, json};
use serde_yaml::Mapping;

pub const PROJECT_NAME: &str = "mailstack";
pub const PROGRAM_FILE: &str = "Pulumi.yaml";

#[derive(Debug, Serialize)]
struct Program {
    name: &'static str,
    runtime: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Mapping::is_empty")]
    resources: Mapping,
    #[serde(skip_serializing_if = "Mapping::is_empty")]
    outputs: Mapping,
}

#[derive(Debug, Serialize)]
struct Resource {
    #[serde(rename = "type")]
    resource_type: &'static str,
    #[serde(skip_serializing_if = "Value::is_null")]
    properties: Value,
    #[serde(skip_serializing_if = "ResourceOptions::is_empty")]
    options: ResourceOptions,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
}

impl ResourceOptions {
    fn is_empty(&self) -> bool {
        self.depends_on.is_empty() && self.provider.is_none()
    }
}

/// Pulumi resource token for a node kind
pub fn resource_type(kind: ResourceKind) -> Option<&'static str> {
    let token = match kind {
        ResourceKind::OidcProvider => "aws:iam:OpenIdConnectProvider",
        ResourceKind::Role => "aws:iam:Role",
        ResourceKind::RolePolicy => "aws:iam:RolePolicy",
        ResourceKind::ConfigurationSet => "aws:sesv2:ConfigurationSet",
        ResourceKind::EmailIdentity => "aws:sesv2:EmailIdentity",
        ResourceKind::Topic => "aws:sns:Topic",
        ResourceKind::EventDestination => "aws:sesv2:ConfigurationSetEventDestination",
        ResourceKind::Table => "aws:dynamodb:Table",
        ResourceKind::Function => "aws:lambda:Function",
        ResourceKind::FunctionPermission => "aws:lambda:Permission",
        ResourceKind::TopicSubscription => "aws:sns:TopicSubscription",
        ResourceKind::RegionProvider => "pulumi:providers:aws",
        ResourceKind::Certificate => "aws:acm:Certificate",
        ResourceKind::DnsRecord => "aws:route53:Record",
        ResourceKind::CertificateValidation => "aws:acm:CertificateValidation",
        ResourceKind::Firewall => "aws:wafv2:WebAcl",
        ResourceKind::Distribution => "aws:cloudfront:Distribution",
        ResourceKind::Archive | ResourceKind::ArchiveLink => return None,
    };
    Some(token)
}

/// URN pulumi gives a rendered node, for `up --target`
pub fn urn(stack: &str, node: &ResourceNode) -> Option<String> {
    resource_type(node.kind).map(|token| {
        format!("urn:pulumi:{}::{}::{}::{}", stack, PROJECT_NAME, token, node.name)
    })
}

/// URN of the root stack resource; targeting it refreshes the outputs
pub fn stack_urn(stack: &str) -> String {
    format!(
        "urn:pulumi:{}::{}::pulumi:pulumi:Stack::{}-{}",
        stack, PROJECT_NAME, PROJECT_NAME, stack
    )
}

/// Policy documents are JSON strings in the AWS provider
fn properties(node: &ResourceNode) -> Value {
    let mut properties = node.properties.clone();
    let Value::Object(map) = &mut properties else {
        return properties;
    };

    let encode = |map: &mut serde_json::Map<String, Value>, key: &str| {
        if let Some(document) = map.remove(key) {
            map.insert(key.to_string(), json!({ "fn::toJSON": document }));
        }
    };
    match node.kind {
        ResourceKind::Role => encode(map, "assumeRolePolicy"),
        ResourceKind::RolePolicy => encode(map, "policy"),
        ResourceKind::Function => {
            if let Some(Value::String(path)) = map.remove("code") {
                map.insert("code".to_string(), json!({ "fn::fileArchive": path }));
            }
        }
        _ => {}
    }
    properties
}

fn interpolate(name: &str) -> String {
    format!("${{{}}}", name)
}

/// Render the engine-managed part of `graph` as a Pulumi YAML program
pub fn render(graph: &ResourceGraph) -> Result<String> {
    let mut resources = Mapping::new();
    for node in &graph.nodes {
        let Some(resource_type) = resource_type(node.kind) else {
            return Err(PulumiError::Render(format!(
                "{} is a {:?} node, which the engine does not manage",
                node.name, node.kind
            )));
        };
        let resource = Resource {
            resource_type,
            properties: properties(node),
            options: ResourceOptions {
                depends_on: node.depends_on.iter().map(|d| interpolate(d)).collect(),
                provider: node.provider.as_deref().map(interpolate),
            },
        };
        resources.insert(
            node.name.clone().into(),
            serde_yaml::to_value(&resource)?,
        );
    }

    let mut outputs = Mapping::new();
    for (name, output) in &graph.outputs {
        outputs.insert(name.clone().into(), serde_yaml::to_value(&output.value)?);
    }

    let program = Program {
        name: PROJECT_NAME,
        runtime: "yaml",
        description: "Email sending stack managed by mailstack",
        resources,
        outputs,
    };
    Ok(serde_yaml::to_string(&program)?)
}
