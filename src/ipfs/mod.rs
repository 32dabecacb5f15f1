//! IPFS client
//!
//! Two operations against the content-addressed network: `fetch` pulls a
//! blob through the configured gateway list (fallback order, bounded
//! retries) and `pin` pushes a blob to the pinning service with bearer
//! auth. Neither interprets the bytes.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Config, LogLevel};
use crate::error::{AdapterError, AdapterResult};
use crate::retry::{with_retry, RetryPolicy};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const PIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the IPFS gateway and pinning service
#[derive(Debug, Clone)]
pub struct IpfsClient {
    http: reqwest::Client,
    gateways: Vec<String>,
    pinning_url: Option<String>,
    pinning_key: Option<String>,
}

/// Pinning service response
#[derive(Debug, Deserialize)]
struct PinResponse {
    cid: String,
    #[allow(dead_code)]
    size: Option<u64>,
}

impl IpfsClient {
    pub fn new(config: &Config) -> AdapterResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AdapterError::BadRequest(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            http,
            gateways: config.ipfs_gateways.clone(),
            pinning_url: config.pinning_service_url.clone(),
            pinning_key: config.pinning_key.clone(),
        })
    }

    /// Fetch the raw bytes behind a CID.
    ///
    /// Each attempt walks the gateway list in order; an attempt fails only
    /// when every gateway failed. Exhausting the retry budget surfaces
    /// `CIDNotFound` with the last gateway error.
    pub async fn fetch(&self, cid: &str) -> AdapterResult<Vec<u8>> {
        let cid = cid.trim();
        if cid.is_empty() {
            return Err(AdapterError::BadRequest("empty CID".into()));
        }

        let bytes = with_retry("ipfs_fetch", RetryPolicy::ipfs_fetch(), || async {
            self.fetch_once(cid).await.map_err(backoff::Error::transient)
        })
        .await?;

        debug!(cid, bytes = bytes.len(), "fetched from gateway");
        Ok(bytes)
    }

    async fn fetch_once(&self, cid: &str) -> Result<Vec<u8>, AdapterError> {
        let mut last_err = AdapterError::CidNotFound(format!("{cid}: no gateways configured"));
        for gateway in &self.gateways {
            let url = format!("{gateway}/ipfs/{cid}");
            match self
                .http
                .get(&url)
                .timeout(FETCH_TIMEOUT)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.bytes().await.map_err(|e| {
                        AdapterError::CidNotFound(format!("{cid}: body read failed: {e}"))
                    })?;
                    return Ok(body.to_vec());
                }
                Ok(resp) => {
                    last_err = AdapterError::CidNotFound(format!(
                        "{cid}: gateway {gateway} returned {}",
                        resp.status()
                    ));
                }
                Err(e) => {
                    last_err =
                        AdapterError::CidNotFound(format!("{cid}: gateway {gateway} failed: {e}"));
                }
            }
        }
        Err(last_err)
    }

    /// Upload bytes to the pinning service and return the resulting CID.
    pub async fn pin(&self, bytes: Vec<u8>, filename: &str) -> AdapterResult<String> {
        let pinning_url = self.pinning_url.as_deref().ok_or_else(|| {
            AdapterError::PublishFailed("IPFS_PINNING_SERVICE is not configured".into())
        })?;

        let response = with_retry("ipfs_pin", RetryPolicy::ipfs_pin(), || {
            let bytes = bytes.clone();
            async move {
                self.pin_once(pinning_url, bytes, filename)
                    .await
                    .map_err(backoff::Error::transient)
            }
        })
        .await?;

        info!(cid = %response.cid, "pinned justification archive");
        Ok(response.cid)
    }

    async fn pin_once(
        &self,
        pinning_url: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<PinResponse, AdapterError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| AdapterError::PublishFailed(format!("multipart build failed: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self
            .http
            .post(pinning_url)
            .timeout(PIN_TIMEOUT)
            .multipart(form);
        if let Some(key) = &self.pinning_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| AdapterError::PublishFailed(format!("pinning service unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::PublishFailed(format!(
                "pinning service returned {status}: {body}"
            )));
        }

        resp.json::<PinResponse>()
            .await
            .map_err(|e| AdapterError::PublishFailed(format!("pin response malformed: {e}")))
    }
}
