//! Pulumi engine error types

use mailstack_cloud::StackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulumiError {
    #[error("pulumi not found ({0}). Install it: curl -fsSL https://get.pulumi.com | sh")]
    PulumiNotFound(String),

    #[error("pulumi {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Stack not found: {0}")]
    StackNotFound(String),

    #[error("Cannot render program: {0}")]
    Render(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<PulumiError> for StackError {
    fn from(err: PulumiError) -> Self {
        match err {
            PulumiError::StackNotFound(stack) => StackError::StackNotFound(stack),
            PulumiError::PulumiNotFound(_) => StackError::InvalidConfig(err.to_string()),
            PulumiError::Render(message) => StackError::InvalidPlan(message),
            other => StackError::Engine(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PulumiError>;
