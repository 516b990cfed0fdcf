//! Account identity and IAM lookups

use crate::context::AwsContext;
use crate::error::sdk_error;
use async_trait::async_trait;
use mailstack_cloud::{AccountApi, Result, StackError};

pub struct AwsAccount {
    sts: aws_sdk_sts::Client,
    iam: aws_sdk_iam::Client,
}

impl AwsAccount {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            sts: ctx.sts_client(),
            iam: ctx.iam_client(),
        }
    }
}

/// True when `arn` is the IAM OIDC provider for `issuer`
fn is_provider_for(arn: &str, issuer: &str) -> bool {
    arn.split_once(":oidc-provider/")
        .is_some_and(|(_, url)| url.trim_end_matches('/') == issuer.trim_end_matches('/'))
}

#[async_trait]
impl AccountApi for AwsAccount {
    async fn caller_account(&self) -> Result<String> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| match sdk_error("sts", "sts:GetCallerIdentity", e) {
                // nothing is authorized without credentials, so the root cause is the same
                StackError::Authorization { message, .. } => StackError::Credentials(message),
                other => other,
            })?;

        let account = identity.account().ok_or_else(|| {
            StackError::Credentials("STS returned no account id".to_string())
        })?;
        tracing::info!(account_id = %account, "AWS account validated");
        Ok(account.to_string())
    }

    async fn find_oidc_provider(&self, issuer: &str) -> Result<Option<String>> {
        let providers = self
            .iam
            .list_open_id_connect_providers()
            .send()
            .await
            .map_err(|e| sdk_error("iam", "iam:ListOpenIDConnectProviders", e))?;

        let found = providers
            .open_id_connect_provider_list()
            .iter()
            .filter_map(|p| p.arn())
            .find(|arn| is_provider_for(arn, issuer))
            .map(str::to_string);
        tracing::debug!("OIDC provider for {}: {:?}", issuer, found);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_provider_for() {
        let arn = "arn:aws:iam::123456789012:oidc-provider/oidc.vercel.com/acme";
        assert!(is_provider_for(arn, "oidc.vercel.com/acme"));
        assert!(!is_provider_for(arn, "oidc.vercel.com/acme-staging"));
        assert!(!is_provider_for("arn:aws:iam::123456789012:role/acme", "oidc.vercel.com/acme"));
    }
}
