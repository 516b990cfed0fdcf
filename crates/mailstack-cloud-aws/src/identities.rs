//! SES v2 email identities

use crate::context::AwsContext;
use crate::error::sdk_error;
use async_trait::async_trait;
use aws_sdk_sesv2::types::{BehaviorOnMxFailure, VerificationStatus};
use mailstack_cloud::provider::{DkimStatus, IdentityStatus};
use mailstack_cloud::record::IdentityType;
use mailstack_cloud::{IdentityApi, Result};

const PAGE_SIZE: i32 = 1000;

pub struct SesIdentities {
    client: aws_sdk_sesv2::Client,
}

impl SesIdentities {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sesv2_client(),
        }
    }
}

fn dkim_status(value: Option<&str>) -> DkimStatus {
    match value {
        Some("SUCCESS") => DkimStatus::Success,
        Some("PENDING") => DkimStatus::Pending,
        Some("FAILED") => DkimStatus::Failed,
        Some("TEMPORARY_FAILURE") => DkimStatus::TemporaryFailure,
        _ => DkimStatus::NotStarted,
    }
}

#[async_trait]
impl IdentityApi for SesIdentities {
    async fn list_identities(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_email_identities()
                .page_size(PAGE_SIZE)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("sesv2", "ses:ListEmailIdentities", e))?;

            names.extend(
                page.email_identities()
                    .iter()
                    .filter_map(|i| i.identity_name())
                    .map(str::to_string),
            );

            match page.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        tracing::debug!("Found {} email identities", names.len());
        Ok(names)
    }

    async fn identity_status(&self, name: &str) -> Result<Option<IdentityStatus>> {
        let identity = match self
            .client
            .get_email_identity()
            .email_identity(name)
            .send()
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                let err = sdk_error("sesv2", "ses:GetEmailIdentity", e);
                if err.is_not_found() {
                    return Ok(None);
                }
                return Err(err);
            }
        };

        let dkim = identity.dkim_attributes();
        Ok(Some(IdentityStatus {
            name: name.to_string(),
            identity_type: IdentityType::of(name),
            verified: matches!(
                identity.verification_status(),
                Some(VerificationStatus::Success)
            ),
            dkim_status: dkim_status(dkim.and_then(|d| d.status()).map(|s| s.as_str())),
            dkim_tokens: dkim.map(|d| d.tokens().to_vec()).unwrap_or_default(),
            config_set: identity.configuration_set_name().map(str::to_string),
            mail_from_domain: identity
                .mail_from_attributes()
                .map(|m| m.mail_from_domain().to_string())
                .filter(|d| !d.is_empty()),
        }))
    }

    async fn set_configuration_set(
        &self,
        identity: &str,
        config_set: Option<&str>,
    ) -> Result<()> {
        tracing::info!(
            "Setting configuration set of {} to {}",
            identity,
            config_set.unwrap_or("<none>")
        );
        self.client
            .put_email_identity_configuration_set_attributes()
            .email_identity(identity)
            .set_configuration_set_name(config_set.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("sesv2", "ses:PutEmailIdentityConfigurationSetAttributes", e))?;
        Ok(())
    }

    async fn set_mail_from(&self, domain: &str, mail_from: Option<&str>) -> Result<()> {
        tracing::info!(
            "Setting MAIL FROM of {} to {}",
            domain,
            mail_from.unwrap_or("<none>")
        );
        self.client
            .put_email_identity_mail_from_attributes()
            .email_identity(domain)
            .set_mail_from_domain(mail_from.map(str::to_string))
            .set_behavior_on_mx_failure(mail_from.map(|_| BehaviorOnMxFailure::UseDefaultValue))
            .send()
            .await
            .map_err(|e| sdk_error("sesv2", "ses:PutEmailIdentityMailFromAttributes", e))?;
        Ok(())
    }
}
