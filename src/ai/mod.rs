//! AI jury integration
//!
//! Types and payload construction for the AI service's
//! `/api/rank-and-justify` endpoint, plus the [`JuryService`] trait the
//! dispatcher depends on so tests can substitute a deterministic jury.

pub mod client;

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};
use crate::resolver::ParsedManifest;

pub use client::HttpJuryClient;

/// Evaluation request handed to the jury service
#[derive(Debug, Clone)]
pub struct JuryRequest {
    pub manifest: ParsedManifest,
    /// Hex fingerprint for commit/reveal requests; absent in standard mode
    pub fingerprint: Option<String>,
}

/// Verdict returned by the jury: one integer score per outcome plus the
/// written justification. The adapter never interprets the scores.
#[derive(Debug, Clone, PartialEq)]
pub struct AiVerdict {
    pub scores: Vec<u64>,
    pub justification: String,
}

/// Trait seam between the dispatcher and the jury service
#[async_trait::async_trait]
pub trait JuryService: Send + Sync {
    async fn evaluate(&self, request: &JuryRequest) -> AdapterResult<AiVerdict>;
}

// ============================================================================
// Wire types
// ============================================================================

/// Body POSTed to `/api/rank-and-justify`
#[derive(Debug, Clone, Serialize)]
pub struct RankRequest {
    pub prompt: String,
    pub models: Vec<RankModel>,
    pub outcomes: Vec<String>,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub attachments: Vec<RankAttachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankModel {
    pub provider: String,
    pub model: String,
    pub weight: f64,
    pub count: u32,
}

/// One attachment; `content` is UTF-8 text for textual MIME types and
/// base64 otherwise
#[derive(Debug, Clone, Serialize)]
pub struct RankAttachment {
    pub name: String,
    pub mime: String,
    pub content: String,
}

/// Body returned by `/api/rank-and-justify`
#[derive(Debug, Clone, Deserialize)]
pub struct RankResponse {
    pub scores: Vec<u64>,
    pub justification: String,
}

// ============================================================================
// Payload construction
// ============================================================================

/// Build the outbound payload from a parsed combined manifest.
///
/// Attachment bytes are read here; MIME comes from the manifest's declared
/// `type` when it names a concrete media type, else content sniffing, else
/// octet-stream.
pub fn build_payload(request: &JuryRequest) -> AdapterResult<RankRequest> {
    let manifest = &request.manifest;

    let mut attachments = Vec::with_capacity(manifest.additional.len());
    for entry in &manifest.additional {
        let bytes = std::fs::read(&entry.path).map_err(|e| {
            AdapterError::ManifestInvalid(format!(
                "attachment {} unreadable at {}: {e}",
                entry.name,
                entry.path.display()
            ))
        })?;
        let mime = resolve_mime(&entry.declared_type, &entry.path, &bytes);
        let content = encode_content(&mime, bytes);
        attachments.push(RankAttachment {
            name: entry.name.clone(),
            mime,
            content,
        });
    }

    Ok(RankRequest {
        prompt: manifest.prompt.clone(),
        models: manifest
            .models
            .iter()
            .map(|m| RankModel {
                provider: m.provider.clone(),
                model: m.model.clone(),
                weight: m.weight,
                count: m.count,
            })
            .collect(),
        outcomes: manifest.outcomes.clone(),
        iterations: manifest.iterations,
        hash: request.fingerprint.clone(),
        attachments,
    })
}

/// Pick the attachment MIME type: declared type wins when it is a concrete
/// media type, `ipfs/cid` and other placeholders fall through to content
/// sniffing, then octet-stream.
pub fn resolve_mime(declared: &str, path: &Path, bytes: &[u8]) -> String {
    let declared = declared.trim();
    if declared.contains('/') && !declared.eq_ignore_ascii_case("ipfs/cid") {
        return declared.to_string();
    }
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if ext.eq_ignore_ascii_case("json") {
            return "application/json".to_string();
        }
        if ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md") {
            return "text/plain".to_string();
        }
    }
    if std::str::from_utf8(bytes).is_ok() {
        return "text/plain".to_string();
    }
    "application/octet-stream".to_string()
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime == "application/json"
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
}

fn encode_content(mime: &str, bytes: Vec<u8>) -> String {
    if is_textual(mime) {
        // Declared textual but not valid UTF-8 ships as base64 rather than mangled
        return match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => base64::engine::general_purpose::STANDARD.encode(err.into_bytes()),
        };
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
