//! pulumi CLI wrapper
//!
//! Every command runs non-interactively against a local `file://` backend.

use crate::error::{PulumiError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const PASSPHRASE_ENV: &str = "PULUMI_CONFIG_PASSPHRASE";

/// pulumi CLI wrapper
#[derive(Debug, Clone)]
pub struct PulumiCli {
    bin: String,
    state_dir: PathBuf,
}

impl PulumiCli {
    /// `state_dir` holds the local backend shared by every stack
    pub fn new(bin: impl Into<String>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Installed pulumi version
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.bin)
            .arg("version")
            .output()
            .await
            .map_err(|e| PulumiError::PulumiNotFound(format!("{}: {}", self.bin, e)))?;

        if !output.status.success() {
            return Err(PulumiError::PulumiNotFound(self.bin.clone()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn env(&self) -> BTreeMap<&'static str, String> {
        let mut env = BTreeMap::new();
        env.insert(
            "PULUMI_BACKEND_URL",
            format!("file://{}", self.state_dir.display()),
        );
        // secrets stay encrypted with an empty passphrase unless one is set
        env.insert(
            PASSPHRASE_ENV,
            std::env::var(PASSPHRASE_ENV).unwrap_or_default(),
        );
        env.insert("PULUMI_SKIP_UPDATE_CHECKS", "true".to_string());
        env
    }

    /// Run a pulumi command in `work_dir` and return stdout
    async fn run_command(&self, work_dir: &Path, args: &[&str]) -> Result<String> {
        if !self.state_dir.exists() {
            tokio::fs::create_dir_all(&self.state_dir).await?;
        }

        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        cmd.current_dir(work_dir);
        cmd.envs(self.env());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {} (in {})", self.bin, args.join(" "), work_dir.display());

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PulumiError::PulumiNotFound(self.bin.clone()),
            _ => PulumiError::IoError(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(classify_failure(args, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Select `stack`, creating it when `create` is set
    pub async fn select_stack(&self, work_dir: &Path, stack: &str, create: bool) -> Result<()> {
        let mut args = vec!["stack", "select", stack, "--non-interactive"];
        if create {
            args.push("--create");
        }
        self.run_command(work_dir, &args).await?;
        Ok(())
    }

    pub async fn set_config(&self, work_dir: &Path, stack: &str, key: &str, value: &str) -> Result<()> {
        self.run_command(work_dir, &["config", "set", key, value, "--stack", stack])
            .await?;
        Ok(())
    }

    /// Converge the stack onto the program in `work_dir`
    ///
    /// With `targets`, only those URNs are created or updated.
    pub async fn up(&self, work_dir: &Path, stack: &str, targets: &[String]) -> Result<()> {
        let mut args = vec![
            "up",
            "--stack",
            stack,
            "--yes",
            "--skip-preview",
            "--non-interactive",
        ];
        for target in targets {
            args.push("--target");
            args.push(target);
        }
        self.run_command(work_dir, &args).await?;
        Ok(())
    }

    /// Stack outputs as a JSON object, secrets included
    pub async fn stack_output(&self, work_dir: &Path, stack: &str) -> Result<serde_json::Value> {
        let output = self
            .run_command(
                work_dir,
                &["stack", "output", "--stack", stack, "--json", "--show-secrets"],
            )
            .await?;

        if output.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&output)?)
    }

    pub async fn destroy(&self, work_dir: &Path, stack: &str) -> Result<()> {
        self.run_command(
            work_dir,
            &[
                "destroy",
                "--stack",
                stack,
                "--yes",
                "--skip-preview",
                "--non-interactive",
            ],
        )
        .await?;
        Ok(())
    }

    /// Remove the (empty) stack from the backend
    pub async fn remove_stack(&self, work_dir: &Path, stack: &str) -> Result<()> {
        self.run_command(work_dir, &["stack", "rm", stack, "--yes", "--non-interactive"])
            .await?;
        Ok(())
    }
}

/// Map a failed command onto an error kind
fn classify_failure(args: &[&str], stderr: &str) -> PulumiError {
    let lowered = stderr.to_ascii_lowercase();
    if lowered.contains("no stack named") || lowered.contains("stack not found") {
        let stack = args
            .iter()
            .position(|a| *a == "--stack" || *a == "select" || *a == "rm")
            .and_then(|i| args.get(i + 1))
            .unwrap_or(&"")
            .to_string();
        return PulumiError::StackNotFound(stack);
    }
    PulumiError::CommandFailed {
        command: args
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .take(2)
            .copied()
            .collect::<Vec<_>>()
            .join(" "),
        stderr: stderr.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stack_is_classified() {
        let err = classify_failure(
            &["destroy", "--stack", "mailstack-1-us-east-1", "--yes"],
            "error: no stack named 'mailstack-1-us-east-1' found",
        );
        assert!(matches!(err, PulumiError::StackNotFound(ref s) if s == "mailstack-1-us-east-1"));

        let err = classify_failure(&["stack", "rm", "s1", "--yes"], "error: No stack named 's1' found");
        assert!(matches!(err, PulumiError::StackNotFound(ref s) if s == "s1"));
    }

    #[test]
    fn test_other_failures_keep_stderr() {
        let err = classify_failure(
            &["up", "--stack", "s1"],
            "  error: creating IAM Role: AccessDenied\n",
        );
        match err {
            PulumiError::CommandFailed { command, stderr } => {
                assert_eq!(command, "up");
                assert_eq!(stderr, "error: creating IAM Role: AccessDenied");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_backend_env() {
        let cli = PulumiCli::new("pulumi", "/tmp/mailstack/pulumi-state");
        let env = cli.env();
        assert_eq!(env["PULUMI_BACKEND_URL"], "file:///tmp/mailstack/pulumi-state");
        assert!(env.contains_key(PASSPHRASE_ENV));
    }
}
