//! IAM trust binder
//!
//! Builds the execution role for a hosting provider: who may assume it
//! (trust policy) and what it may do (inline permission policy). The
//! permission set is fixed per integration level.

use crate::builders::RESOURCE_PREFIX;
use crate::error::{Result, StackError};
use crate::record::{HostingProvider, IntegrationLevel};
use serde_json::{Value, json};

const VERCEL_ISSUER_HOST: &str = "oidc.vercel.com";
const AMBIENT_SERVICE_PRINCIPALS: [&str; 3] = [
    "lambda.amazonaws.com",
    "ec2.amazonaws.com",
    "ecs-tasks.amazonaws.com",
];

const READ_ACTIONS: &[&str] = &[
    "ses:GetAccount",
    "ses:GetSendQuota",
    "ses:GetSendStatistics",
    "ses:ListIdentities",
    "ses:GetIdentityVerificationAttributes",
    "ses:ListEmailIdentities",
    "ses:GetEmailIdentity",
    "ses:ListConfigurationSets",
    "ses:GetConfigurationSet",
    "cloudwatch:GetMetricData",
    "cloudwatch:GetMetricStatistics",
    "cloudwatch:ListMetrics",
    "logs:DescribeLogGroups",
    "logs:FilterLogEvents",
    "logs:GetLogEvents",
];

const SEND_ACTIONS: &[&str] = &[
    "ses:SendEmail",
    "ses:SendRawEmail",
    "ses:SendTemplatedEmail",
    "ses:SendBulkEmail",
];

const TABLE_ACTIONS: &[&str] = &[
    "dynamodb:GetItem",
    "dynamodb:BatchGetItem",
    "dynamodb:Query",
    "dynamodb:Scan",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DescribeTable",
];

/// Lets a dashboard account assume the role with an external id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleAccess {
    pub account_id: String,
    pub external_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct RoleParams {
    pub account_id: String,
    pub region: String,
    /// Federated principal: an existing provider ARN or a graph reference
    pub oidc_provider_arn: Option<String>,
    pub console_access: Option<ConsoleAccess>,
}

/// OIDC identity provider the role federates with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcProviderSpec {
    /// Issuer without scheme, as IAM names the provider
    pub issuer: String,
    pub url: String,
    pub client_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleSpec {
    pub name: String,
    pub trust_policy: Value,
    pub permissions: Value,
    pub oidc_provider: Option<OidcProviderSpec>,
}

/// Issuer of Vercel OIDC tokens for a team (without scheme)
pub fn vercel_issuer(team_slug: &str) -> String {
    format!("{}/{}", VERCEL_ISSUER_HOST, team_slug)
}

pub fn vercel_oidc_spec(team_slug: &str) -> OidcProviderSpec {
    let issuer = vercel_issuer(team_slug);
    OidcProviderSpec {
        url: format!("https://{}", issuer),
        issuer,
        client_ids: vec![format!("https://vercel.com/{}", team_slug)],
    }
}

/// Build the role for `provider` at `level`
pub fn build_role(
    name: &str,
    provider: &HostingProvider,
    level: IntegrationLevel,
    params: &RoleParams,
) -> Result<RoleSpec> {
    let mut statements = Vec::new();
    let mut oidc_provider = None;

    match provider {
        HostingProvider::Vercel {
            team_slug,
            project_name,
        } => {
            if team_slug.is_empty() || project_name.is_empty() {
                return Err(StackError::InvalidConfig(
                    "vercel team and project must not be empty".to_string(),
                ));
            }
            let spec = vercel_oidc_spec(team_slug);
            let principal = params.oidc_provider_arn.clone().ok_or_else(|| {
                StackError::Invariant("vercel role built without an OIDC provider".to_string())
            })?;
            statements.push(json!({
                "Sid": "VercelFederation",
                "Effect": "Allow",
                "Principal": { "Federated": principal },
                "Action": "sts:AssumeRoleWithWebIdentity",
                "Condition": {
                    "StringEquals": {
                        format!("{}:aud", spec.issuer): spec.client_ids[0].clone()
                    },
                    "StringLike": {
                        format!("{}:sub", spec.issuer): format!(
                            "owner:{}:project:{}:environment:*",
                            team_slug, project_name
                        )
                    }
                }
            }));
            oidc_provider = Some(spec);
        }
        HostingProvider::Aws => {
            statements.push(json!({
                "Sid": "AmbientCompute",
                "Effect": "Allow",
                "Principal": { "Service": AMBIENT_SERVICE_PRINCIPALS },
                "Action": "sts:AssumeRole"
            }));
        }
        HostingProvider::Railway | HostingProvider::Other => {
            // static keys of IAM users in this account
            statements.push(json!({
                "Sid": "AccountPrincipals",
                "Effect": "Allow",
                "Principal": { "AWS": format!("arn:aws:iam::{}:root", params.account_id) },
                "Action": "sts:AssumeRole"
            }));
        }
    }

    if let Some(console) = &params.console_access {
        statements.push(json!({
            "Sid": "ConsoleAccess",
            "Effect": "Allow",
            "Principal": { "AWS": format!("arn:aws:iam::{}:root", console.account_id) },
            "Action": "sts:AssumeRole",
            "Condition": { "StringEquals": { "sts:ExternalId": console.external_id } }
        }));
    }

    Ok(RoleSpec {
        name: name.to_string(),
        trust_policy: json!({ "Version": "2012-10-17", "Statement": statements }),
        permissions: permission_policy(level, &params.account_id, &params.region),
        oidc_provider,
    })
}

/// Inline permissions for the execution role
pub fn permission_policy(level: IntegrationLevel, account_id: &str, region: &str) -> Value {
    let mut statements = vec![json!({
        "Sid": "ReadOnly",
        "Effect": "Allow",
        "Action": READ_ACTIONS,
        "Resource": "*"
    })];

    if level == IntegrationLevel::Enhanced {
        let table = format!(
            "arn:aws:dynamodb:{}:{}:table/{}*",
            region, account_id, RESOURCE_PREFIX
        );
        statements.push(json!({
            "Sid": "Send",
            "Effect": "Allow",
            "Action": SEND_ACTIONS,
            "Resource": "*"
        }));
        statements.push(json!({
            "Sid": "History",
            "Effect": "Allow",
            "Action": TABLE_ACTIONS,
            "Resource": [table.clone(), format!("{}/index/*", table)]
        }));
    }

    json!({ "Version": "2012-10-17", "Statement": statements })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RoleParams {
        RoleParams {
            account_id: "123456789012".into(),
            region: "us-east-1".into(),
            ..Default::default()
        }
    }

    fn actions(policy: &Value) -> Vec<String> {
        policy["Statement"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|s| s["Action"].as_array().cloned().unwrap_or_default())
            .map(|a| a.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_vercel_trust_scoped_to_project() {
        let provider = HostingProvider::Vercel {
            team_slug: "acme".into(),
            project_name: "web".into(),
        };
        let mut p = params();
        p.oidc_provider_arn = Some("${vercelOidcProvider.arn}".into());
        let role = build_role("mailstack-email-role", &provider, IntegrationLevel::Enhanced, &p)
            .unwrap();

        let statement = &role.trust_policy["Statement"][0];
        assert_eq!(statement["Principal"]["Federated"], "${vercelOidcProvider.arn}");
        assert_eq!(
            statement["Condition"]["StringEquals"]["oidc.vercel.com/acme:aud"],
            "https://vercel.com/acme"
        );
        assert_eq!(
            statement["Condition"]["StringLike"]["oidc.vercel.com/acme:sub"],
            "owner:acme:project:web:environment:*"
        );
        assert_eq!(role.oidc_provider.unwrap().url, "https://oidc.vercel.com/acme");
    }

    #[test]
    fn test_aws_trusts_compute_principals() {
        let role = build_role("r", &HostingProvider::Aws, IntegrationLevel::DashboardOnly, &params())
            .unwrap();
        let services = role.trust_policy["Statement"][0]["Principal"]["Service"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(services, 3);
        assert!(role.oidc_provider.is_none());
    }

    #[test]
    fn test_console_access_requires_external_id() {
        let mut p = params();
        p.console_access = Some(ConsoleAccess {
            account_id: "999999999999".into(),
            external_id: "ext-123".into(),
        });
        let role = build_role("r", &HostingProvider::Other, IntegrationLevel::DashboardOnly, &p)
            .unwrap();
        let console = &role.trust_policy["Statement"][1];
        assert_eq!(console["Principal"]["AWS"], "arn:aws:iam::999999999999:root");
        assert_eq!(console["Condition"]["StringEquals"]["sts:ExternalId"], "ext-123");
    }

    #[test]
    fn test_permission_sets_by_level() {
        let read = permission_policy(IntegrationLevel::DashboardOnly, "1", "us-east-1");
        let read_actions = actions(&read);
        assert!(read_actions.iter().all(|a| !a.starts_with("ses:Send")));
        assert!(read_actions.iter().all(|a| !a.starts_with("dynamodb:")));

        let enhanced = permission_policy(IntegrationLevel::Enhanced, "1", "us-east-1");
        let enhanced_actions = actions(&enhanced);
        assert!(enhanced_actions.contains(&"ses:SendRawEmail".to_string()));
        assert_eq!(
            enhanced["Statement"][2]["Resource"][0],
            "arn:aws:dynamodb:us-east-1:1:table/mailstack-*"
        );
    }
}
