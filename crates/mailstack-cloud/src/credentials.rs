//! Credential cache and broker
//!
//! Assumes a role in a customer account and reuses the temporary
//! credentials until they come within a safety margin of expiry.
//! Concurrent callers for the same `(role, external id)` share a single
//! in-flight assumption. Credentials live in memory only.

use crate::error::StackError;
use crate::provider::RoleAssumer;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SESSION_NAME: &str = "mailstack-console";
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(3600);
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(300);

/// Temporary credentials returned by a role assumption
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True while `now` is more than `margin` before expiry
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::seconds(margin.as_secs() as i64);
        now + margin < self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Assumption failure shared by every caller waiting on it
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct BrokerError(Arc<StackError>);

impl BrokerError {
    pub fn inner(&self) -> &StackError {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub session_name: String,
    pub session_duration: Duration,
    pub safety_margin: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            session_duration: DEFAULT_SESSION_DURATION,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

type CacheKey = (String, Option<String>);
type SharedAssumption = Shared<BoxFuture<'static, Result<Credential, BrokerError>>>;

enum Slot {
    Ready(Credential),
    InFlight {
        generation: u64,
        assumption: SharedAssumption,
    },
}

/// Process-wide credential cache
///
/// Construct one at startup and share it by reference or `Arc`.
pub struct CredentialBroker {
    assumer: Arc<dyn RoleAssumer>,
    config: BrokerConfig,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    next_generation: AtomicU64,
}

impl CredentialBroker {
    pub fn new(assumer: Arc<dyn RoleAssumer>) -> Self {
        Self::with_config(assumer, BrokerConfig::default())
    }

    pub fn with_config(assumer: Arc<dyn RoleAssumer>, config: BrokerConfig) -> Self {
        Self {
            assumer,
            config,
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        // the map stays consistent even if a holder panicked
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credentials for `role_arn`, assuming the role only when needed
    pub async fn get_credentials(
        &self,
        role_arn: &str,
        external_id: Option<&str>,
    ) -> Result<Credential, BrokerError> {
        let key: CacheKey = (role_arn.to_string(), external_id.map(str::to_string));

        let (generation, assumption) = {
            let mut slots = self.slots();
            let joined = match slots.get(&key) {
                Some(Slot::Ready(credential))
                    if credential.is_fresh(Utc::now(), self.config.safety_margin) =>
                {
                    tracing::debug!("Credential cache hit for {}", role_arn);
                    return Ok(credential.clone());
                }
                Some(Slot::InFlight {
                    generation,
                    assumption,
                }) => {
                    tracing::debug!("Joining in-flight assumption for {}", role_arn);
                    Some((*generation, assumption.clone()))
                }
                _ => None,
            };

            match joined {
                Some(joined) => joined,
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let assumption = self.assume(key.clone()).shared();
                    slots.insert(
                        key.clone(),
                        Slot::InFlight {
                            generation,
                            assumption: assumption.clone(),
                        },
                    );
                    (generation, assumption)
                }
            }
        };

        let result = assumption.await;

        let mut slots = self.slots();
        let owns_slot = matches!(
            slots.get(&key),
            Some(Slot::InFlight { generation: g, .. }) if *g == generation
        );
        if owns_slot {
            match &result {
                Ok(credential) => {
                    slots.insert(key, Slot::Ready(credential.clone()));
                }
                Err(_) => {
                    slots.remove(&key);
                }
            }
        }
        result
    }

    fn assume(&self, key: CacheKey) -> BoxFuture<'static, Result<Credential, BrokerError>> {
        let assumer = Arc::clone(&self.assumer);
        let session_name = self.config.session_name.clone();
        let duration = self.config.session_duration;
        async move {
            let (role_arn, external_id) = key;
            tracing::info!("Assuming {}", role_arn);
            assumer
                .assume_role(&role_arn, external_id.as_deref(), &session_name, duration)
                .await
                .map_err(|e| BrokerError(Arc::new(e)))
        }
        .boxed()
    }
}
