//! HTTP client for the AI jury service
//!
//! POSTs the rank-and-justify payload and maps the response. Transport
//! errors and 5xx answers get one retry; 4xx answers are refused outright.

use std::time::Duration;

use tracing::{debug, info};

use super::{build_payload, AiVerdict, JuryRequest, JuryService, RankResponse};
use crate::config::Config;
use crate::error::{AdapterError, AdapterResult};
use crate::retry::{with_retry, RetryPolicy};

const AI_CALL_TIMEOUT: Duration = Duration::from_secs(90);

/// Concrete jury client speaking HTTP to the configured AI node
#[derive(Debug, Clone)]
pub struct HttpJuryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpJuryClient {
    pub fn new(config: &Config) -> AdapterResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(AI_CALL_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::AiServiceUnavailable(format!("client init failed: {e}")))?;
        Ok(Self {
            http,
            base_url: config.ai_node_url.clone(),
        })
    }

    async fn call_once(&self, payload: &super::RankRequest) -> Result<RankResponse, AdapterError> {
        let url = format!("{}/api/rank-and-justify", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AdapterError::AiServiceUnavailable(format!("transport error: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Backpressure, not refusal: 429 earns the same single retry as 5xx
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::AiServiceUnavailable(format!(
                "{status}: {body}"
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::AiServiceRefused(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::AiServiceUnavailable(format!(
                "{status}: {body}"
            )));
        }

        response
            .json::<RankResponse>()
            .await
            .map_err(|e| AdapterError::AiServiceUnavailable(format!("response malformed: {e}")))
    }
}

#[async_trait::async_trait]
impl JuryService for HttpJuryClient {
    async fn evaluate(&self, request: &JuryRequest) -> AdapterResult<AiVerdict> {
        let payload = build_payload(request)?;
        debug!(
            outcomes = payload.outcomes.len(),
            models = payload.models.len(),
            attachments = payload.attachments.len(),
            iterations = payload.iterations,
            "calling AI jury"
        );

        let response = with_retry("ai_rank_and_justify", RetryPolicy::ai_call(), || async {
            self.call_once(&payload).await.map_err(|err| match &err {
                // 4xx is final; transport and 5xx earn the one retry
                AdapterError::AiServiceRefused(_) => backoff::Error::permanent(err),
                _ => backoff::Error::transient(err),
            })
        })
        .await?;

        map_response(response, request.manifest.outcomes.len())
    }
}

/// Validate the jury response shape against the request
pub fn map_response(response: RankResponse, expected_outcomes: usize) -> AdapterResult<AiVerdict> {
    if response.scores.len() != expected_outcomes {
        return Err(AdapterError::AiServiceUnavailable(format!(
            "jury returned {} scores for {} outcomes",
            response.scores.len(),
            expected_outcomes
        )));
    }
    info!(scores = ?response.scores, "jury verdict received");
    Ok(AiVerdict {
        scores: response.scores,
        justification: response.justification,
    })
}
