//! mailstack configuration
//!
//! Resolves the per-user configuration directory and loads the optional
//! `settings.json` stored in it. Every path mailstack writes to (connection
//! records, Pulumi work directories, the local Pulumi backend) hangs off
//! [`get_config_dir`].

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mailstack";
const SETTINGS_FILE: &str = "settings.json";

/// Environment variable that relocates the whole configuration directory
pub const CONFIG_DIR_ENV: &str = "MAILSTACK_CONFIG_DIR";
pub const REGION_ENV: &str = "MAILSTACK_REGION";
pub const PULUMI_BIN_ENV: &str = "MAILSTACK_PULUMI_BIN";

const DEFAULT_PULUMI_BIN: &str = "pulumi";
const DEFAULT_SAFETY_MARGIN_SECS: u64 = 300;
const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

/// Get the mailstack configuration directory, creating it if needed
///
/// `MAILSTACK_CONFIG_DIR` takes precedence over `~/.config/mailstack`.
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(APP_DIR),
    };

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        tracing::debug!("Created config directory: {}", config_dir.display());
    }

    Ok(config_dir)
}

/// User settings read from `settings.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Region used when neither `--region` nor the AWS profile supplies one
    pub default_region: Option<String>,

    /// `pulumi` executable
    pub pulumi_bin: String,

    /// Bundled event-processor archive deployed by the event-tracking group
    pub function_artifact: Option<PathBuf>,

    /// Credentials closer than this to expiry are refreshed
    pub credential_safety_margin_secs: u64,

    /// DNS-over-HTTPS endpoint used by `verify`
    pub doh_endpoint: String,

    /// Account allowed to assume the stack role for console access
    pub console_account_id: Option<String>,

    /// Customer-managed key for the email archive; AWS-owned key otherwise
    pub archive_kms_key_arn: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_region: None,
            pulumi_bin: DEFAULT_PULUMI_BIN.to_string(),
            function_artifact: None,
            credential_safety_margin_secs: DEFAULT_SAFETY_MARGIN_SECS,
            doh_endpoint: DEFAULT_DOH_ENDPOINT.to_string(),
            console_account_id: None,
            archive_kms_key_arn: None,
        }
    }
}

impl Settings {
    /// Load settings from the configuration directory and apply env overrides
    pub fn load() -> Result<Self> {
        let dir = get_config_dir()?;
        Self::load_from(&dir)
    }

    /// Load settings from an explicit directory
    ///
    /// A missing `settings.json` yields the defaults.
    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidSettings {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            Settings::default()
        };

        if settings.function_artifact.is_none() {
            settings.function_artifact =
                Some(config_dir.join("artifacts").join("event-processor.zip"));
        }

        settings.apply_env();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(region) = std::env::var(REGION_ENV) {
            if !region.is_empty() {
                self.default_region = Some(region);
            }
        }
        if let Ok(bin) = std::env::var(PULUMI_BIN_ENV) {
            if !bin.is_empty() {
                self.pulumi_bin = bin;
            }
        }
    }
}

/// Directory holding one connection record per (account, region)
pub fn connections_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("connections")
}

/// Directory holding one Pulumi work directory per stack
pub fn stacks_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("stacks")
}

/// Local Pulumi backend (`file://` state)
pub fn pulumi_state_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("pulumi-state")
}
