//! Error taxonomy shared by every Harvest component.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type for Harvest operations.
pub type HarvestResult<T> = Result<T, ToolError>;

/// Classification of a failure as surfaced to MCP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolErrorCode {
    /// Requested entity is absent after a successful upstream query.
    NotFound,
    /// Caller-supplied arguments failed shape or range checks.
    ValidationError,
    /// Upstream host unreachable, rejected the request, or returned an unexpected shape.
    UpstreamError,
    /// Anything unclassified.
    InternalError,
}

impl ToolErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP-equivalent status for the code, when one is implied.
    pub fn default_status(&self) -> Option<u16> {
        match self {
            Self::NotFound => Some(404),
            Self::ValidationError => Some(400),
            Self::UpstreamError => None,
            Self::InternalError => Some(500),
        }
    }
}

impl std::fmt::Display for ToolErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error carried from any component up to the handler boundary.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ToolError {
    pub code: ToolErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ToolError {
    pub fn new(code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            status: code.default_status(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::ValidationError, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::UpstreamError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::InternalError, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ToolErrorCode::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = ToolError::not_found("Yield abc was not found");
        assert_eq!(err.to_string(), "[NOT_FOUND] Yield abc was not found");
    }

    #[test]
    fn test_default_statuses() {
        assert_eq!(ToolError::validation("bad").status, Some(400));
        assert_eq!(ToolError::not_found("gone").status, Some(404));
        assert_eq!(ToolError::internal("boom").status, Some(500));
        assert_eq!(ToolError::upstream("down").status, None);
        assert_eq!(
            ToolError::upstream("down").with_status(Some(503)).status,
            Some(503)
        );
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let err = ToolError::upstream("down").with_details(serde_json::json!({"status": 502}));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "UPSTREAM_ERROR");
        assert_eq!(json["details"]["status"], 502);
        assert!(json.get("status").is_none());
    }
}
