//! Cloudflare error types

use mailstack_cloud::StackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Cloudflare API error: {0}")]
    ApiError(String),

    #[error("DNS query for {name} failed with status {status}")]
    QueryFailed { name: String, status: u32 },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<CloudflareError> for StackError {
    fn from(err: CloudflareError) -> Self {
        match err {
            CloudflareError::MissingEnvVar(var) => {
                StackError::InvalidConfig(format!("{} is not set", var))
            }
            CloudflareError::ApiError(message) => StackError::api("cloudflare", None, message),
            other => StackError::api("cloudflare", None, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudflareError>;
