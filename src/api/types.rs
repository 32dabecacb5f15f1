//! Oracle-facing wire types
//!
//! Shapes of the Chainlink external-adapter request/response bodies. The
//! raw request is permissive (everything optional, as the node sends it);
//! [`EvaluationRequest`] is the validated form the dispatcher works with.

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult, ErrorBody};

/// Raw oracle request body: `{ id, data: {...} }`
#[derive(Debug, Clone, Deserialize)]
pub struct OracleRequest {
    pub id: Option<String>,
    pub data: Option<OracleRequestData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleRequestData {
    /// Comma-separated CID list; first is the primary
    pub cid: Option<String>,
    pub aggregator: Option<String>,
    #[serde(rename = "classID")]
    pub class_id: Option<i64>,
    pub mode: Option<u8>,
    #[serde(rename = "requestID")]
    pub request_id: Option<String>,
}

/// Commit-reveal protocol mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Standard,
    Commit,
    Reveal,
}

impl RequestMode {
    pub fn from_wire(mode: Option<u8>) -> AdapterResult<Self> {
        match mode.unwrap_or(0) {
            0 => Ok(RequestMode::Standard),
            1 => Ok(RequestMode::Commit),
            2 => Ok(RequestMode::Reveal),
            other => Err(AdapterError::BadRequest(format!(
                "mode must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

/// Validated request the pipeline runs on
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub job_run_id: String,
    /// Primary CID followed by bound CIDs, in request order
    pub cids: Vec<String>,
    pub aggregator: Option<String>,
    pub class_id: Option<i64>,
    pub mode: RequestMode,
    pub request_id: String,
}

impl EvaluationRequest {
    /// Validate the raw body: a non-empty CID list and a known mode are
    /// required; everything else passes through.
    pub fn from_wire(request: OracleRequest) -> AdapterResult<Self> {
        let data = request
            .data
            .ok_or_else(|| AdapterError::BadRequest("missing data object".into()))?;

        let cids: Vec<String> = data
            .cid
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if cids.is_empty() {
            return Err(AdapterError::BadRequest("missing CID".into()));
        }

        Ok(Self {
            job_run_id: request.id.unwrap_or_default(),
            cids,
            aggregator: data.aggregator,
            class_id: data.class_id,
            mode: RequestMode::from_wire(data.mode)?,
            request_id: data.request_id.unwrap_or_default(),
        })
    }

    pub fn primary_cid(&self) -> &str {
        &self.cids[0]
    }

    /// Bound CIDs, i.e. everything after the primary
    pub fn bcids(&self) -> &[String] {
        &self.cids[1..]
    }
}

/// Response body: `{ jobRunID, statusCode, data: {...} }`
#[derive(Debug, Clone, Serialize)]
pub struct OracleResponse {
    #[serde(rename = "jobRunID")]
    pub job_run_id: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub data: OracleResponseData,
}

#[derive(Debug, Clone, Serialize)]
pub struct OracleResponseData {
    /// Hex-encoded CBOR result bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(rename = "justificationCID", skip_serializing_if = "Option::is_none")]
    pub justification_cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl OracleResponse {
    pub fn success(job_run_id: String, result: String, justification_cid: Option<String>) -> Self {
        Self {
            job_run_id,
            status_code: 200,
            data: OracleResponseData {
                result: Some(result),
                justification_cid,
                error: None,
            },
        }
    }

    pub fn failure(job_run_id: String, error: &AdapterError, justification_cid: Option<String>) -> Self {
        Self {
            job_run_id,
            status_code: error.status_code(),
            data: OracleResponseData {
                result: None,
                justification_cid,
                error: Some(ErrorBody::from(error)),
            },
        }
    }
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub cache_entries: usize,
}
