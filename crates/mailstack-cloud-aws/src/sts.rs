//! Cross-account role assumption

use crate::context::AwsContext;
use crate::error::sdk_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailstack_cloud::{Credential, Result, RoleAssumer, StackError};
use std::time::Duration;

pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
}

impl StsRoleAssumer {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sts_client(),
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(
        &self,
        role_arn: &str,
        external_id: Option<&str>,
        session_name: &str,
        duration: Duration,
    ) -> Result<Credential> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .set_external_id(external_id.map(str::to_string))
            .duration_seconds(duration.as_secs().min(i32::MAX as u64) as i32)
            .send()
            .await
            .map_err(|e| sdk_error("sts", "sts:AssumeRole", e))?;

        let credentials = output.credentials().ok_or_else(|| {
            StackError::api("sts", None, "AssumeRole returned no credentials")
        })?;
        let expires_at = DateTime::<Utc>::from_timestamp(credentials.expiration().secs(), 0)
            .ok_or_else(|| StackError::api("sts", None, "credential expiry out of range"))?;

        tracing::debug!("Assumed {} until {}", role_arn, expires_at);
        Ok(Credential {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expires_at,
        })
    }
}
