//! Stack orchestration error types

use thiserror::Error;

/// Errors surfaced by the lifecycle orchestrator and its collaborators
///
/// Every variant maps to a stable [`StackError::code`] and, where one exists,
/// a one-line [`StackError::suggestion`] printed by the CLI.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("No usable AWS credentials: {0}")]
    Credentials(String),

    #[error("Access denied while performing {action}: {message}")]
    Authorization { action: String, message: String },

    #[error("No mailstack connection found for account {account_id} in {region}")]
    ConnectionNotFound { account_id: String, region: String },

    #[error("A mailstack connection already exists for account {account_id} in {region}")]
    ConnectionExists { account_id: String, region: String },

    #[error("Provisioning stack not found: {0}")]
    StackNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid resource plan: {0}")]
    InvalidPlan(String),

    #[error("Provisioning engine failed: {0}")]
    Engine(String),

    #[error("{service} API error: {message}")]
    Api {
        service: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("State file error: {0}")]
    State(String),

    #[error("State is locked: {0}")]
    Locked(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StackError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            StackError::Credentials(_) => "CREDENTIALS_MISSING",
            StackError::Authorization { .. } => "ACCESS_DENIED",
            StackError::ConnectionNotFound { .. } => "STACK_NOT_FOUND",
            StackError::ConnectionExists { .. } => "STACK_EXISTS",
            StackError::StackNotFound(_) => "ENGINE_STACK_NOT_FOUND",
            StackError::InvalidConfig(_) => "INVALID_CONFIG",
            StackError::InvalidPlan(_) => "INVALID_PLAN",
            StackError::Engine(_) => "ENGINE_FAILED",
            StackError::Api { .. } => "API_ERROR",
            StackError::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            StackError::State(_) | StackError::Io(_) | StackError::Json(_) => "STATE_ERROR",
            StackError::Locked(_) => "LOCKED",
            StackError::Cancelled => "CANCELLED",
            StackError::Invariant(_) => "INVARIANT",
        }
    }

    /// Human remediation hint
    pub fn suggestion(&self) -> Option<String> {
        match self {
            StackError::Credentials(_) => Some(
                "Configure AWS credentials (aws configure, AWS_PROFILE or AWS_ACCESS_KEY_ID) and retry"
                    .to_string(),
            ),
            StackError::Authorization { action, .. } => Some(format!(
                "Grant the calling principal permission for {} or use a more privileged profile",
                action
            )),
            StackError::ConnectionNotFound { .. } => {
                Some("Run `mailstack init` or `mailstack connect` first".to_string())
            }
            StackError::ConnectionExists { .. } => Some(
                "Use `mailstack upgrade` to change it or `mailstack destroy` to start over"
                    .to_string(),
            ),
            StackError::InvalidConfig(_) => {
                Some("Check the command flags and settings.json".to_string())
            }
            StackError::Engine(_) => Some(
                "Inspect the Pulumi output above; re-running `mailstack update` resumes the apply"
                    .to_string(),
            ),
            StackError::Locked(_) => Some(
                "Another mailstack command is running against this account and region; wait for it or remove the stale .lock file"
                    .to_string(),
            ),
            StackError::Api { code: Some(code), .. } => suggestion_for_api_code(code),
            _ => None,
        }
    }

    /// Documentation pointer for the error category
    pub fn docs_url(&self) -> Option<&'static str> {
        match self {
            StackError::Credentials(_) => Some("https://mailstack.dev/docs/credentials"),
            StackError::Authorization { .. } => Some("https://mailstack.dev/docs/permissions"),
            StackError::ConnectionNotFound { .. } | StackError::ConnectionExists { .. } => {
                Some("https://mailstack.dev/docs/lifecycle")
            }
            StackError::Engine(_) | StackError::StackNotFound(_) => {
                Some("https://mailstack.dev/docs/pulumi")
            }
            _ => None,
        }
    }

    /// True when the error means "the thing is already gone"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StackError::StackNotFound(_) | StackError::ResourceNotFound(_)
        )
    }

    pub fn api(service: &'static str, code: Option<&str>, message: impl Into<String>) -> Self {
        StackError::Api {
            service,
            code: code.map(|c| c.to_string()),
            message: message.into(),
        }
    }
}

fn suggestion_for_api_code(code: &str) -> Option<String> {
    match code {
        "Throttling" | "ThrottlingException" | "TooManyRequestsException" => {
            Some("The API is throttling requests; wait a moment and retry".to_string())
        }
        "ExpiredToken" | "ExpiredTokenException" => {
            Some("Your session token has expired; refresh your credentials".to_string())
        }
        "LimitExceededException" => {
            Some("An account quota was reached; request a limit increase".to_string())
        }
        _ => None,
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
