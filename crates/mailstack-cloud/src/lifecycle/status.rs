use super::{Diagnostic, Orchestrator};
use crate::dns::{self, RecordInputs, VerifyReport};
use crate::error::Result;
use crate::graph::StackOutputs;
use crate::provider::{DnsResolver, IdentityStatus};
use crate::record::{ConnectionKey, ConnectionRecord, FeatureName};
use futures_util::future::{join, join_all};

#[derive(Debug)]
pub struct StatusReport {
    pub record: ConnectionRecord,
    /// Last-known engine outputs; `None` when they could not be read
    pub outputs: Option<StackOutputs>,
    pub engine_error: Option<Diagnostic>,
    pub identities: Vec<IdentityStatus>,
}

impl Orchestrator {
    /// The record for the ambient account in `region`, if any
    pub async fn connection(&self, region: &str) -> Result<Option<ConnectionRecord>> {
        let key = self.resolve_key(region).await?;
        self.store.load(&key).await
    }

    /// Read-only view of a deployed connection
    ///
    /// `account` skips the caller lookup. A missing record is an error.
    pub async fn status(&self, account: Option<&str>, region: &str) -> Result<StatusReport> {
        let key = match account {
            Some(account) => ConnectionKey::new(account, region),
            None => self.resolve_key(region).await?,
        };
        let record = self.store.require(&key).await?;

        let mut names: Vec<&str> = record.domain.as_deref().into_iter().collect();
        for identity in &record.identities {
            if !names.contains(&identity.name.as_str()) {
                names.push(&identity.name);
            }
        }

        let identities = &self.cloud.identities;
        let (outputs, statuses) = join(
            self.engine.outputs(&record.stack_id),
            join_all(names.iter().map(|name| identities.identity_status(name))),
        )
        .await;

        let (outputs, engine_error) = match outputs.and_then(|flat| StackOutputs::from_flat(&flat)) {
            Ok(outputs) => (Some(outputs), None),
            Err(e) => {
                tracing::warn!("Could not read outputs of {}: {}", record.stack_id, e);
                (None, Some(Diagnostic::from_error("read stack outputs", None, &e)))
            }
        };

        let identities = names
            .iter()
            .zip(statuses)
            .filter_map(|(name, status)| match status {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Could not read identity {}: {}", name, e);
                    None
                }
            })
            .collect();

        Ok(StatusReport {
            engine_error,
            outputs,
            identities,
            record,
        })
    }

    /// Check the published DNS for `domain`
    ///
    /// Tracking and MAIL FROM expectations come from a matching record when
    /// one exists; otherwise only DKIM, SPF and DMARC are checked.
    pub async fn verify(
        &self,
        resolver: &dyn DnsResolver,
        domain: &str,
        region: &str,
    ) -> Result<VerifyReport> {
        let records = self.store.list().await?;
        let record = records
            .iter()
            .filter(|r| r.domain.as_deref() == Some(domain))
            .find(|r| r.region == region)
            .or_else(|| records.iter().find(|r| r.domain.as_deref() == Some(domain)));

        let inputs = match record {
            Some(record) => RecordInputs {
                domain: domain.to_string(),
                region: record.region.clone(),
                dkim_tokens: record.outputs.dkim_tokens.clone(),
                tracking_domain: record.outputs.tracking_domain.clone(),
                distribution_domain: record.outputs.distribution_domain.clone(),
                mail_from_domain: record
                    .feature(FeatureName::MailFrom)
                    .filter(|f| f.enabled)
                    .and_then(|f| f.current_value.clone()),
            },
            None => RecordInputs {
                domain: domain.to_string(),
                region: region.to_string(),
                ..Default::default()
            },
        };

        dns::verify(resolver, self.cloud.identities.as_ref(), inputs).await
    }
}
