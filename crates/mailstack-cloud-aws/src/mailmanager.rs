//! Mail Manager archives
//!
//! Archives are created through Mail Manager; linking one to a
//! configuration set is an SES v2 call.

use crate::context::AwsContext;
use crate::error::sdk_error;
use async_trait::async_trait;
use aws_sdk_mailmanager::types::{ArchiveRetention as ApiRetention, RetentionPeriod};
use mailstack_cloud::provider::ArchiveHandle;
use mailstack_cloud::{ArchiveApi, ArchiveRetention, Result};

pub struct MailManagerArchives {
    mailmanager: aws_sdk_mailmanager::Client,
    sesv2: aws_sdk_sesv2::Client,
}

impl MailManagerArchives {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            mailmanager: ctx.mailmanager_client(),
            sesv2: ctx.sesv2_client(),
        }
    }

    async fn set_archive(&self, config_set: &str, archive_arn: Option<&str>) -> Result<()> {
        self.sesv2
            .put_configuration_set_archiving_options()
            .configuration_set_name(config_set)
            .set_archive_arn(archive_arn.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("sesv2", "ses:PutConfigurationSetArchivingOptions", e))?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveApi for MailManagerArchives {
    async fn create_archive(
        &self,
        name: &str,
        retention: ArchiveRetention,
        kms_key_arn: Option<&str>,
    ) -> Result<ArchiveHandle> {
        let created = self
            .mailmanager
            .create_archive()
            .archive_name(name)
            .retention(ApiRetention::RetentionPeriod(RetentionPeriod::from(
                retention.api_name(),
            )))
            .set_kms_key_arn(kms_key_arn.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error("mailmanager", "ses:CreateArchive", e))?;
        let id = created.archive_id().to_string();

        // CreateArchive only returns the id
        let archive = self
            .mailmanager
            .get_archive()
            .archive_id(&id)
            .send()
            .await
            .map_err(|e| sdk_error("mailmanager", "ses:GetArchive", e))?;

        tracing::info!("Created archive {} ({}, retention {})", name, id, retention);
        Ok(ArchiveHandle {
            id,
            arn: archive.archive_arn().to_string(),
        })
    }

    async fn link_archive(&self, config_set: &str, archive_arn: &str) -> Result<()> {
        tracing::info!("Linking archive {} to {}", archive_arn, config_set);
        self.set_archive(config_set, Some(archive_arn)).await
    }

    async fn unlink_archive(&self, config_set: &str) -> Result<()> {
        tracing::info!("Unlinking archive from {}", config_set);
        self.set_archive(config_set, None).await
    }

    async fn delete_archive(&self, archive_id: &str) -> Result<()> {
        tracing::info!("Deleting archive {}", archive_id);
        self.mailmanager
            .delete_archive()
            .archive_id(archive_id)
            .send()
            .await
            .map_err(|e| sdk_error("mailmanager", "ses:DeleteArchive", e))?;
        Ok(())
    }
}
