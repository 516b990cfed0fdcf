use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// An isolated config directory with no AWS environment leaking in
pub struct TestEnv {
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            config_dir: tempfile::tempdir().unwrap(),
        }
    }

    #[allow(dead_code)]
    pub fn write_settings(&self, content: &str) {
        fs::write(self.config_dir.path().join("settings.json"), content).unwrap();
    }

    pub fn path(&self) -> &Path {
        self.config_dir.path()
    }

    #[allow(deprecated)]
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("mailstack").unwrap();
        let missing = self.path().join("no-such-file");
        cmd.env("MAILSTACK_CONFIG_DIR", self.path())
            .env("AWS_EC2_METADATA_DISABLED", "true")
            .env("AWS_CONFIG_FILE", &missing)
            .env("AWS_SHARED_CREDENTIALS_FILE", &missing)
            .env_remove("AWS_PROFILE")
            .env_remove("AWS_REGION")
            .env_remove("AWS_DEFAULT_REGION")
            .env_remove("MAILSTACK_REGION")
            .env_remove("MAILSTACK_PROVIDER")
            .env_remove("MAILSTACK_EXTERNAL_ID")
            .env_remove("VERCEL_TEAM")
            .env_remove("VERCEL_PROJECT")
            .env_remove("CLOUDFLARE_API_TOKEN")
            .env_remove("CLOUDFLARE_ZONE_ID");
        cmd
    }
}
