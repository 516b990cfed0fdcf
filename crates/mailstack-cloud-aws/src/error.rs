//! AWS error classification
//!
//! SDK errors are sorted by their service error code (via
//! `ProvideErrorMetadata`), never by matching on Debug output, and turned
//! into the matching [`StackError`] variant.

use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use mailstack_cloud::StackError;

/// How an AWS failure should be treated by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwsErrorKind {
    /// The resource is already gone (safe to skip in teardown)
    NotFound,
    /// The caller lacks permission
    AccessDenied,
    /// Rate limit exceeded
    Throttled,
    /// No credentials could be loaded or they were rejected
    Credentials,
    Other,
}

const NOT_FOUND_CODES: &[&str] = &[
    "NotFoundException",
    "ResourceNotFoundException",
    "NoSuchEntity",
    "NoSuchHostedZone",
    "NoSuchDistribution",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "AuthorizationError",
];

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

const CREDENTIAL_CODES: &[&str] = &[
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
];

/// Classify by service error code; `message` only matters when there is none
pub fn classify(code: Option<&str>, message: &str) -> AwsErrorKind {
    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsErrorKind::NotFound,
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsErrorKind::AccessDenied,
        Some(c) if THROTTLING_CODES.contains(&c) => AwsErrorKind::Throttled,
        Some(c) if CREDENTIAL_CODES.contains(&c) => AwsErrorKind::Credentials,
        Some(_) => AwsErrorKind::Other,
        // dispatch failures carry no code; a missing provider chain says so
        None if message.to_ascii_lowercase().contains("credentials") => {
            AwsErrorKind::Credentials
        }
        None => AwsErrorKind::Other,
    }
}

/// Convert an SDK error into a [`StackError`]
///
/// `service` names the API for messages, `action` is the IAM action
/// reported on access-denied errors (e.g. `ses:GetEmailIdentity`).
pub(crate) fn sdk_error<E>(service: &'static str, action: &str, err: E) -> StackError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    match classify(code.as_deref(), &message) {
        AwsErrorKind::NotFound => StackError::ResourceNotFound(message),
        AwsErrorKind::AccessDenied => StackError::Authorization {
            action: action.to_string(),
            message,
        },
        AwsErrorKind::Credentials => StackError::Credentials(message),
        AwsErrorKind::Throttled | AwsErrorKind::Other => {
            tracing::debug!("{} {} failed: {:?} {}", service, action, code, message);
            StackError::api(service, code.as_deref(), message)
        }
    }
}

/// Builders for required-field shapes fail only on programming errors
pub(crate) fn build_error(service: &'static str, err: impl std::fmt::Display) -> StackError {
    StackError::Invariant(format!("{} request could not be built: {}", service, err))
}
