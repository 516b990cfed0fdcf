//! Lifecycle command state machine
//!
//! ```text
//! uninitialized ──init/connect──▶ deployed ──upgrade/update──▶ deployed
//!                                    │
//!                                    ├──restore──▶ restored (then destroyed)
//!                                    └──destroy──▶ destroyed
//! ```
//!
//! The [`Orchestrator`] is the only writer of connection records. Every
//! read-modify-write cycle runs under the record's advisory lock.

mod deploy;
mod status;
mod teardown;

pub use deploy::{DeployReport, DeployRequest, UpgradeRequest};
pub use status::StatusReport;
pub use teardown::{
    DestroyOutcome, RestoreMismatch, RestoreOutcome, RestorePlan, RestoreReport, TeardownReport,
};

use crate::error::StackError;
use crate::graph::ResourceGroup;
use crate::iam::ConsoleAccess;
use crate::provider::{CloudApis, ProvisioningEngine};
use crate::record::ConnectionKey;
use crate::state::MetadataStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs that come from settings rather than the command line
#[derive(Debug, Clone, Default)]
pub struct LifecycleOptions {
    /// Bundled event-processor archive
    pub function_artifact: Option<PathBuf>,
    pub console_access: Option<ConsoleAccess>,
    /// Customer-managed key for the archive; the service default otherwise
    pub kms_key_arn: Option<String>,
}

/// A reportable failure that did not abort the command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub step: String,
    pub group: Option<ResourceGroup>,
    pub code: &'static str,
    pub message: String,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn from_error(step: impl Into<String>, group: Option<ResourceGroup>, error: &StackError) -> Self {
        Self {
            step: step.into(),
            group,
            code: error.code(),
            message: error.to_string(),
            suggestion: error.suggestion(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.step, self.code, self.message)
    }
}

pub struct Orchestrator {
    engine: Arc<dyn ProvisioningEngine>,
    cloud: CloudApis,
    store: MetadataStore,
    options: LifecycleOptions,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn ProvisioningEngine>,
        cloud: CloudApis,
        store: MetadataStore,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            engine,
            cloud,
            store,
            options,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Key for the ambient account in `region`
    ///
    /// Fails with a credentials error when no account can be resolved.
    async fn resolve_key(&self, region: &str) -> crate::error::Result<ConnectionKey> {
        if region.is_empty() {
            return Err(StackError::InvalidConfig(
                "no region given; pass --region or set MAILSTACK_REGION".to_string(),
            ));
        }
        let account_id = self.cloud.account.caller_account().await?;
        tracing::debug!("Resolved account {} in {}", account_id, region);
        Ok(ConnectionKey::new(account_id, region))
    }
}
