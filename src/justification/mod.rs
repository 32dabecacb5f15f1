//! Justification publisher
//!
//! Wraps the jury's written justification into a small tar.gz archive and
//! pins it, returning the CID the oracle reports on-chain. The archive
//! bytes are deterministic (fixed entry order, zeroed timestamps), so an
//! honest node publishing the same verdict twice gets the same CID.

use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tracing::warn;

use crate::ai::AiVerdict;
use crate::error::{AdapterError, AdapterResult};
use crate::ipfs::IpfsClient;
use crate::resolver::ParsedManifest;

const ARCHIVE_FILENAME: &str = "justification.tar.gz";

/// Descriptor stored as `manifest.json` inside the justification archive
#[derive(Debug, Serialize)]
struct JustificationManifest<'a> {
    version: &'a str,
    kind: &'a str,
    outcomes: &'a [String],
    scores: &'a [u64],
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetail<'a>>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    kind: &'a str,
    message: String,
}

/// Builds and pins justification archives
#[derive(Clone)]
pub struct JustificationPublisher {
    ipfs: Arc<IpfsClient>,
}

impl JustificationPublisher {
    pub fn new(ipfs: Arc<IpfsClient>) -> Self {
        Self { ipfs }
    }

    /// Publish the verdict justification; failure is fatal for the request
    pub async fn publish_verdict(
        &self,
        verdict: &AiVerdict,
        manifest: &ParsedManifest,
    ) -> AdapterResult<String> {
        let archive = build_verdict_archive(verdict, manifest)?;
        self.ipfs.pin(archive, ARCHIVE_FILENAME).await
    }

    /// Publish an error justification so the on-chain consumer can audit
    /// the failure. Best-effort: a pin failure here is logged and dropped.
    pub async fn publish_error(&self, error: &AdapterError) -> Option<String> {
        let archive = match build_error_archive(error) {
            Ok(archive) => archive,
            Err(e) => {
                warn!(error = %e, "error justification build failed");
                return None;
            }
        };
        match self.ipfs.pin(archive, ARCHIVE_FILENAME).await {
            Ok(cid) => Some(cid),
            Err(e) => {
                warn!(error = %e, "error justification pin failed");
                None
            }
        }
    }
}

/// Assemble the verdict archive: `manifest.json`, `justification.txt` and
/// a `references/` folder holding the attachments the query named.
pub fn build_verdict_archive(
    verdict: &AiVerdict,
    manifest: &ParsedManifest,
) -> AdapterResult<Vec<u8>> {
    let descriptor = JustificationManifest {
        version: "1.0",
        kind: "verdict",
        outcomes: &manifest.outcomes,
        scores: &verdict.scores,
        error: None,
    };
    let descriptor_bytes = serde_json::to_vec_pretty(&descriptor)
        .map_err(|e| AdapterError::PublishFailed(format!("descriptor encode failed: {e}")))?;

    let mut files: Vec<(String, Vec<u8>)> = vec![
        ("manifest.json".to_string(), descriptor_bytes),
        (
            "justification.txt".to_string(),
            verdict.justification.as_bytes().to_vec(),
        ),
    ];

    for reference in &manifest.references {
        if let Some(attachment) = manifest.additional.iter().find(|a| &a.name == reference) {
            let bytes = std::fs::read(&attachment.path).map_err(|e| {
                AdapterError::PublishFailed(format!("reference {reference} unreadable: {e}"))
            })?;
            files.push((format!("references/{reference}"), bytes));
        }
    }

    build_archive(&files)
}

/// Assemble the minimal error archive: kind + message
pub fn build_error_archive(error: &AdapterError) -> AdapterResult<Vec<u8>> {
    let descriptor = JustificationManifest {
        version: "1.0",
        kind: "error",
        outcomes: &[],
        scores: &[],
        error: Some(ErrorDetail {
            kind: error.kind(),
            message: error.to_string(),
        }),
    };
    let descriptor_bytes = serde_json::to_vec_pretty(&descriptor)
        .map_err(|e| AdapterError::PublishFailed(format!("descriptor encode failed: {e}")))?;

    build_archive(&[
        ("manifest.json".to_string(), descriptor_bytes),
        (
            "justification.txt".to_string(),
            error.to_string().into_bytes(),
        ),
    ])
}

fn build_archive(files: &[(String, Vec<u8>)]) -> AdapterResult<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        // mtime stays zero: archive bytes must not depend on wall time
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_slice())
            .map_err(|e| AdapterError::PublishFailed(format!("archive append failed: {e}")))?;
    }
    let encoder = builder
        .into_inner()
        .map_err(|e| AdapterError::PublishFailed(format!("archive finalize failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| AdapterError::PublishFailed(format!("archive compress failed: {e}")))
}
