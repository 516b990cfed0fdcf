//! Connection metadata store
//!
//! One JSON file per (account, region) under the connections directory,
//! written atomically through a temporary file and a rename. An advisory
//! sidecar lock serializes read-modify-write cycles across processes.

use crate::error::{Result, StackError};
use crate::record::{ConnectionKey, ConnectionRecord, RECORD_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const RECORD_EXT: &str = "json";
const LOCK_EXT: &str = "lock";
const STALE_LOCK_HOURS: i64 = 1;

/// Reads and writes [`ConnectionRecord`] files
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_stem(key: &ConnectionKey) -> String {
        format!(
            "{}.{}",
            sanitize(&key.account_id),
            sanitize(&key.region)
        )
    }

    /// Deterministic record path for a key
    pub fn record_path(&self, key: &ConnectionKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", Self::file_stem(key), RECORD_EXT))
    }

    fn lock_path(&self, key: &ConnectionKey) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::file_stem(key), LOCK_EXT))
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!("Created connections directory: {}", self.dir.display());
        }
        Ok(())
    }

    /// Load the record for a key, `None` when no stack exists there
    pub async fn load(&self, key: &ConnectionKey) -> Result<Option<ConnectionRecord>> {
        let path = self.record_path(key);
        if !path.exists() {
            tracing::debug!("No connection record at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let record = parse_record(&path, &content)?;
        Ok(Some(record))
    }

    /// Load a record that a command requires to exist
    pub async fn require(&self, key: &ConnectionKey) -> Result<ConnectionRecord> {
        self.load(key)
            .await?
            .ok_or_else(|| StackError::ConnectionNotFound {
                account_id: key.account_id.clone(),
                region: key.region.clone(),
            })
    }

    /// Write a record, replacing whatever was there
    pub async fn save(&self, record: &ConnectionRecord) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.record_path(&record.key());
        let tmp = path.with_extension(format!("{}.tmp", RECORD_EXT));

        let content = serde_json::to_string_pretty(record)?;
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &path).await?;
        tracing::debug!("Saved connection record {}", path.display());
        Ok(())
    }

    /// Remove a record; a missing file is not an error
    ///
    /// Returns whether a file was actually removed.
    pub async fn delete(&self, key: &ConnectionKey) -> Result<bool> {
        let path = self.record_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted connection record {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All records in the store, ordered by account then region
    pub async fn list(&self) -> Result<Vec<ConnectionRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match parse_record(&path, &content) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(records)
    }

    /// Acquire the advisory lock for a key
    ///
    /// A lock older than one hour is considered abandoned and replaced.
    pub async fn acquire_lock(&self, key: &ConnectionKey) -> Result<StateLock> {
        self.ensure_dir().await?;
        let lock_path = self.lock_path(key);

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(info) => {
                    let age = Utc::now().signed_duration_since(info.acquired_at);
                    if age.num_hours() < STALE_LOCK_HOURS {
                        return Err(StackError::Locked(format!(
                            "{} is locked by {} (pid {}) since {}",
                            key, info.holder, info.pid, info.acquired_at
                        )));
                    }
                    tracing::warn!("Removing stale lock held by {} (pid {})", info.holder, info.pid);
                }
                Err(e) => tracing::warn!("Removing unreadable lock {}: {}", lock_path.display(), e),
            }
            fs::remove_file(&lock_path).await?;
        }

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        // create_new closes the race between two processes that both saw no lock
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StackError::Locked(format!(
                    "{} was locked by another process",
                    key
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())
            .await?;

        tracing::debug!("Acquired lock {}", lock_path.display());
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

fn parse_record(path: &Path, content: &str) -> Result<ConnectionRecord> {
    let record: ConnectionRecord = serde_json::from_str(content)?;
    if record.version > RECORD_VERSION {
        return Err(StackError::State(format!(
            "{} has version {}, newer than supported version {}",
            path.display(),
            record.version,
            RECORD_VERSION
        )));
    }
    Ok(record)
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for a record lock
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released lock {}", self.lock_path.display());
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Preset;
    use crate::record::{
        FeatureName, FeatureState, HostingProvider, IdentityAction, IdentityState,
        IdentityType, IntegrationLevel,
    };
    use tempfile::tempdir;

    fn key() -> ConnectionKey {
        ConnectionKey::new("123456789012", "eu-west-1")
    }

    fn sample() -> ConnectionRecord {
        let mut record = ConnectionRecord::new(
            &key(),
            HostingProvider::Vercel {
                team_slug: "acme".into(),
                project_name: "web".into(),
            },
            IntegrationLevel::Enhanced,
            Preset::Production,
        );
        record.set_feature(
            FeatureName::ConfigSet,
            FeatureState::deployed(Some("mailstack-email-tracking".into())),
        );
        record.set_feature(
            FeatureName::MailFrom,
            FeatureState::replaced("bounce.example.com", "mail.example.com"),
        );
        record.identities.push(IdentityState {
            name: "example.com".into(),
            identity_type: IdentityType::Domain,
            original_config_set: Some("legacy".into()),
            current_config_set: Some("mailstack-email-tracking".into()),
            action: IdentityAction::Replaced,
        });
        record.outputs.role_arn = Some("arn:aws:iam::123456789012:role/mailstack-email-role".into());
        record
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        let record = sample();

        store.save(&record).await.unwrap();
        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        assert!(store.record_path(&key()).ends_with("123456789012.eu-west-1.json"));
        // no temp file left behind
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["123456789012.eu-west-1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_record_and_idempotent_delete() {
        let temp_dir = tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path().join("connections"));

        assert!(store.load(&key()).await.unwrap().is_none());
        assert!(matches!(
            store.require(&key()).await,
            Err(StackError::ConnectionNotFound { .. })
        ));

        store.save(&sample()).await.unwrap();
        assert!(store.delete(&key()).await.unwrap());
        assert!(!store.delete(&key()).await.unwrap());
        assert!(!store.delete(&key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_newer_version() {
        let temp_dir = tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        let mut record = sample();
        record.version = RECORD_VERSION + 1;
        store.save(&record).await.unwrap();

        assert!(matches!(
            store.load(&key()).await,
            Err(StackError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let temp_dir = tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path());

        let mut other = sample();
        other.region = "ap-northeast-1".into();
        store.save(&sample()).await.unwrap();
        store.save(&other).await.unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let regions: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.region)
            .collect();
        assert_eq!(regions, vec!["ap-northeast-1", "eu-west-1"]);
    }

    #[tokio::test]
    async fn test_lock_excludes_second_holder() {
        let temp_dir = tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path());

        let lock = store.acquire_lock(&key()).await.unwrap();
        assert!(matches!(
            store.acquire_lock(&key()).await,
            Err(StackError::Locked(_))
        ));

        lock.release().await.unwrap();
        let again = store.acquire_lock(&key()).await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join("123456789012.eu-west-1.lock").exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        let stale = LockInfo {
            holder: "old-host".into(),
            pid: 1,
            acquired_at: Utc::now() - chrono::Duration::hours(2),
        };
        std::fs::write(
            temp_dir.path().join("123456789012.eu-west-1.lock"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = store.acquire_lock(&key()).await.unwrap();
        lock.release().await.unwrap();
    }
}
