//! Error types for the Harvest SDK.

use harvest_core::error::ToolError;
use serde_json::{json, Value};

/// Result type for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

/// Guidance returned when the upstream rejects our credentials.
pub const CREDENTIALS_MESSAGE: &str = "StakeKit API rejected the request. Confirm STAKEKIT_API_KEY is valid and has the necessary permissions.";
/// Guidance returned when the network route to the upstream is missing.
pub const UNREACHABLE_MESSAGE: &str = "StakeKit host was unreachable (ENETUNREACH). Verify outbound network access or proxy configuration.";

/// Error types that can occur when using the Harvest SDK.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Upstream request failed after retries and fallback.
    #[error("{message}")]
    Upstream {
        message: String,
        status: Option<u16>,
        code: Option<String>,
        details: Value,
    },

    /// Upstream payload did not match the expected shape.
    #[error(transparent)]
    Schema(#[from] ToolError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied value cannot be sent upstream.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be constructed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SdkError {
    /// Upstream HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if the upstream answered 404 on every host.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<SdkError> for ToolError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::Upstream {
                message,
                status,
                code,
                details,
            } => {
                let details = match code {
                    Some(code) => {
                        let mut details = details;
                        if let Value::Object(map) = &mut details {
                            map.entry("code").or_insert(json!(code));
                        }
                        details
                    }
                    None => details,
                };
                ToolError::upstream(message)
                    .with_details(details)
                    .with_status(status)
            }
            SdkError::Schema(err) => err,
            SdkError::Http(e) => ToolError::upstream(e.to_string()),
            SdkError::InvalidArgument(message) => ToolError::validation(message),
            err @ (SdkError::Config(_) | SdkError::InvalidUrl(_)) => {
                ToolError::internal(err.to_string())
            }
        }
    }
}
