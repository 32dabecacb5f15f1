//! Adapter error taxonomy
//!
//! Every failure mode the adapter can report maps to exactly one variant
//! here. The variant decides the HTTP status and whether the failure is
//! "informative" enough to publish an error justification archive.

use serde::Serialize;

/// Errors produced while serving an oracle request
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// HTTP body malformed or missing CID
    #[error("bad request: {0}")]
    BadRequest(String),

    /// IPFS gateway returned 404 for a CID after retries
    #[error("CID not found on gateway: {0}")]
    CidNotFound(String),

    /// Archive failed to extract or lacks a manifest
    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),

    /// Manifest schema violation (primary XOR, name uniqueness, bCID name mismatch)
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    /// AI endpoint transport failure or 5xx after retry
    #[error("AI service unavailable: {0}")]
    AiServiceUnavailable(String),

    /// AI endpoint rejected the request with a 4xx
    #[error("AI service refused request: {0}")]
    AiServiceRefused(String),

    /// Pinning service failure after retry
    #[error("justification publish failed: {0}")]
    PublishFailed(String),

    /// Total request deadline hit
    #[error("request deadline exceeded after {0}s")]
    DeadlineExceeded(u64),

    /// Caller disconnected before the request completed
    #[error("request canceled")]
    RequestCanceled,
}

impl AdapterError {
    /// Stable kind tag used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::BadRequest(_) => "BadRequest",
            AdapterError::CidNotFound(_) => "CIDNotFound",
            AdapterError::ArchiveCorrupt(_) => "ArchiveCorrupt",
            AdapterError::ManifestInvalid(_) => "ManifestInvalid",
            AdapterError::AiServiceUnavailable(_) => "AIServiceUnavailable",
            AdapterError::AiServiceRefused(_) => "AIServiceRefused",
            AdapterError::PublishFailed(_) => "PublishFailed",
            AdapterError::DeadlineExceeded(_) => "DeadlineExceeded",
            AdapterError::RequestCanceled => "RequestCanceled",
        }
    }

    /// HTTP status reported to the oracle
    pub fn status_code(&self) -> u16 {
        match self {
            AdapterError::BadRequest(_) => 400,
            _ => 500,
        }
    }

    /// Whether enough request context exists to publish an error justification.
    ///
    /// `PublishFailed` is excluded: the pinning service is the part that
    /// already failed. Deadline and cancel are excluded: there is no time
    /// left to upload anything.
    pub fn is_informative(&self) -> bool {
        matches!(
            self,
            AdapterError::CidNotFound(_)
                | AdapterError::ArchiveCorrupt(_)
                | AdapterError::ManifestInvalid(_)
                | AdapterError::AiServiceUnavailable(_)
                | AdapterError::AiServiceRefused(_)
        )
    }
}

/// Wire shape of `data.error` in a failure response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable kind tag, e.g. `ManifestInvalid`
    pub kind: String,
    /// Short human-readable message
    pub message: String,
}

impl From<&AdapterError> for ErrorBody {
    fn from(err: &AdapterError) -> Self {
        ErrorBody {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AdapterError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AdapterError::CidNotFound("x".into()).status_code(), 500);
        assert_eq!(AdapterError::DeadlineExceeded(120).status_code(), 500);
    }

    #[test]
    fn test_informative_errors_carry_justifications() {
        assert!(AdapterError::ManifestInvalid("dup".into()).is_informative());
        assert!(AdapterError::AiServiceRefused("400".into()).is_informative());
        assert!(!AdapterError::PublishFailed("pin".into()).is_informative());
        assert!(!AdapterError::BadRequest("no cid".into()).is_informative());
        assert!(!AdapterError::RequestCanceled.is_informative());
    }

    #[test]
    fn test_error_body_kind() {
        let err = AdapterError::ManifestInvalid("name mismatch".into());
        let body = ErrorBody::from(&err);
        assert_eq!(body.kind, "ManifestInvalid");
        assert!(body.message.contains("name mismatch"));
    }
}
