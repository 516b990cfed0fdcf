//! restore and destroy
//!
//! Teardown runs in a fixed order: identity attachments and MAIL FROM are
//! reverted first, then the archive is unlinked and deleted, then the
//! engine removes the stack, and the record goes last. A stack that is
//! already gone does not stop the record from being deleted.

use super::{Diagnostic, Orchestrator};
use crate::archive::ArchiveBinder;
use crate::error::{Result, StackError};
use crate::record::{
    ConnectionKey, ConnectionRecord, FeatureAction, FeatureName, FeatureState, IdentityAction,
    IdentityState,
};
use futures_util::future::join_all;

#[derive(Debug)]
pub enum DestroyOutcome {
    /// No record for the key; treated as already destroyed
    NothingToDestroy,
    Destroyed(TeardownReport),
}

#[derive(Debug, Default)]
pub struct TeardownReport {
    pub identities_reverted: Vec<String>,
    pub mail_from_reverted: bool,
    pub archive_removed: bool,
    /// False when the engine had no stack left to remove
    pub stack_removed: bool,
    pub record_deleted: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// The changes `restore` will put back
#[derive(Debug, Clone)]
pub struct RestorePlan {
    pub key: ConnectionKey,
    pub identities: Vec<IdentityState>,
    pub features: Vec<(FeatureName, FeatureState)>,
}

impl RestorePlan {
    pub fn of(record: &ConnectionRecord) -> Self {
        Self {
            key: record.key(),
            identities: record
                .identities
                .iter()
                .filter(|i| i.is_restorable())
                .cloned()
                .collect(),
            features: record
                .features
                .iter()
                .filter(|(_, f)| f.action == FeatureAction::Replace)
                .map(|(name, f)| (*name, f.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty() && self.features.is_empty()
    }
}

/// An identity whose live attachment differs from its original after restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreMismatch {
    pub identity: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug)]
pub struct RestoreReport {
    pub plan: RestorePlan,
    pub mismatches: Vec<RestoreMismatch>,
    pub teardown: TeardownReport,
}

#[derive(Debug)]
pub enum RestoreOutcome {
    NothingToRestore,
    Restored(RestoreReport),
}

impl Orchestrator {
    /// What `restore` would put back, for confirmation
    pub async fn restore_plan(&self, region: &str) -> Result<RestorePlan> {
        let key = self.resolve_key(region).await?;
        let record = self.store.require(&key).await?;
        record.validate()?;
        Ok(RestorePlan::of(&record))
    }

    /// Reinstate the recorded originals, then tear the stack down
    pub async fn restore(&self, region: &str) -> Result<RestoreOutcome> {
        let key = self.resolve_key(region).await?;
        let lock = self.store.acquire_lock(&key).await?;
        let record = self.store.require(&key).await?;
        record.validate()?;

        let plan = RestorePlan::of(&record);
        if plan.is_empty() {
            lock.release().await?;
            return Ok(RestoreOutcome::NothingToRestore);
        }

        tracing::info!(
            "Restoring {} identities and {} settings for {}",
            plan.identities.len(),
            plan.features.len(),
            key
        );
        let teardown = self.teardown(&record).await?;
        let mismatches = self.check_restored(&plan.identities).await;
        for mismatch in &mismatches {
            tracing::warn!(
                "{} is on {:?} after restore, expected {:?}",
                mismatch.identity,
                mismatch.actual,
                mismatch.expected
            );
        }

        lock.release().await?;
        Ok(RestoreOutcome::Restored(RestoreReport {
            plan,
            mismatches,
            teardown,
        }))
    }

    /// Remove everything the stack created; a missing record is a no-op
    pub async fn destroy(&self, region: &str) -> Result<DestroyOutcome> {
        let key = self.resolve_key(region).await?;
        let lock = self.store.acquire_lock(&key).await?;

        let outcome = match self.store.load(&key).await? {
            None => {
                tracing::info!("No connection for {}; nothing to destroy", key);
                DestroyOutcome::NothingToDestroy
            }
            Some(record) => DestroyOutcome::Destroyed(self.teardown(&record).await?),
        };
        lock.release().await?;
        Ok(outcome)
    }

    async fn teardown(&self, record: &ConnectionRecord) -> Result<TeardownReport> {
        let mut report = TeardownReport::default();

        self.revert_identities(record, &mut report).await?;
        self.revert_mail_from(record, &mut report).await?;

        if let Some(archive) = &record.outputs.archive {
            ArchiveBinder::new(self.cloud.archives.as_ref())
                .unbind(archive, record.outputs.config_set_name.as_deref())
                .await?;
            report.archive_removed = true;
        }

        match self.engine.destroy(&record.stack_id).await {
            Ok(()) => {
                tracing::info!("Destroyed stack {}", record.stack_id);
                report.stack_removed = true;
            }
            Err(StackError::StackNotFound(stack)) => {
                tracing::warn!("Stack {} no longer exists; removing its record", stack);
            }
            Err(e) => return Err(e),
        }

        report.record_deleted = self.store.delete(&record.key()).await?;
        Ok(report)
    }

    /// Put tracked identities back on their original configuration set
    ///
    /// An identity someone moved since we attached it is left where it is.
    async fn revert_identities(
        &self,
        record: &ConnectionRecord,
        report: &mut TeardownReport,
    ) -> Result<()> {
        let tracked: Vec<&IdentityState> = record
            .identities
            .iter()
            .filter(|i| i.is_restorable())
            .collect();
        let identities = &self.cloud.identities;
        let statuses =
            join_all(tracked.iter().map(|i| identities.identity_status(&i.name))).await;

        for (identity, status) in tracked.into_iter().zip(statuses) {
            let Some(status) = status? else {
                tracing::warn!("Identity {} no longer exists", identity.name);
                continue;
            };
            if status.config_set != identity.current_config_set {
                tracing::warn!(
                    "{} was moved to {:?} since it was {}; leaving it",
                    identity.name,
                    status.config_set,
                    identity.action
                );
                report.diagnostics.push(Diagnostic::from_error(
                    format!("restore {}", identity.name),
                    None,
                    &StackError::State(format!(
                        "{} changed outside mailstack",
                        identity.name
                    )),
                ));
                continue;
            }

            let target = match identity.action {
                IdentityAction::Replaced => identity.original_config_set.as_deref(),
                _ => None,
            };
            match identities.set_configuration_set(&identity.name, target).await {
                Ok(()) => {
                    tracing::info!("Restored {} to {:?}", identity.name, target);
                    report.identities_reverted.push(identity.name.clone());
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!("Identity {} no longer exists", identity.name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn revert_mail_from(
        &self,
        record: &ConnectionRecord,
        report: &mut TeardownReport,
    ) -> Result<()> {
        let (Some(feature), Some(domain)) = (
            record.feature(FeatureName::MailFrom).filter(|f| f.enabled),
            record.domain.as_deref(),
        ) else {
            return Ok(());
        };
        let target = match feature.action {
            FeatureAction::Replace => feature.original_value.as_deref(),
            _ => None,
        };
        match self.cloud.identities.set_mail_from(domain, target).await {
            Ok(()) => {
                tracing::info!("Restored MAIL FROM of {} to {:?}", domain, target);
                report.mail_from_reverted = true;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!("Identity {} no longer exists", domain);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Compare live attachments with the originals after restore
    async fn check_restored(&self, identities: &[IdentityState]) -> Vec<RestoreMismatch> {
        let api = &self.cloud.identities;
        let statuses = join_all(identities.iter().map(|i| api.identity_status(&i.name))).await;

        identities
            .iter()
            .zip(statuses)
            .filter_map(|(identity, status)| {
                let actual = match status {
                    Ok(Some(status)) => status.config_set,
                    Ok(None) => return None,
                    Err(e) => {
                        tracing::warn!("Could not read {}: {}", identity.name, e);
                        return None;
                    }
                };
                let expected = match identity.action {
                    IdentityAction::Replaced => identity.original_config_set.clone(),
                    _ => None,
                };
                (actual != expected).then(|| RestoreMismatch {
                    identity: identity.name.clone(),
                    expected,
                    actual,
                })
            })
            .collect()
    }
}
