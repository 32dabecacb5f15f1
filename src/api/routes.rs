//! Oracle-facing HTTP dispatcher
//!
//! - POST /       - evaluate an oracle request (standard / commit / reveal)
//! - GET  /health - liveness probe with cache statistics
//!
//! Each request runs on its own task under the configured total deadline.
//! Requests are isolated except for the shared commit cache: a commit
//! stores its encoded result there and the matching reveal replays those
//! bytes without touching the AI service again.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::ai::{HttpJuryClient, JuryRequest, JuryService};
use crate::api::types::{
    EvaluationRequest, HealthResponse, OracleRequest, OracleResponse, RequestMode,
};
use crate::commit::{commit_hash, fingerprint, CommitCache, CommitRecord, KEY_DERIVATION};
use crate::config::Config;
use crate::encoder;
use crate::error::{AdapterError, AdapterResult};
use crate::ipfs::IpfsClient;
use crate::justification::JustificationPublisher;
use crate::resolver::workdir::WorkDir;
use crate::resolver::ManifestResolver;

// ============================================================================
// Shared State
// ============================================================================

/// Dispatcher dependencies, constructed once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub resolver: ManifestResolver,
    pub jury: Arc<dyn JuryService>,
    pub cache: CommitCache,
    pub publisher: JustificationPublisher,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire up all collaborators around an explicit jury implementation.
    /// Tests pass a deterministic jury here.
    pub fn new(config: Config, jury: Arc<dyn JuryService>) -> AdapterResult<Self> {
        let ipfs = Arc::new(IpfsClient::new(&config)?);
        let resolver = ManifestResolver::new(ipfs.clone());
        let publisher = JustificationPublisher::new(ipfs);
        let cache = CommitCache::new(config.reveal_ttl);
        Ok(Self {
            config,
            resolver,
            jury,
            cache,
            publisher,
            started_at: Utc::now(),
        })
    }

    /// Production wiring: the HTTP jury client against `AI_NODE_URL`
    pub fn with_http_jury(config: Config) -> AdapterResult<Self> {
        let jury = Arc::new(HttpJuryClient::new(&config)?);
        Self::new(config, jury)
    }
}

/// Build the adapter router
pub fn create_adapter_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_oracle_request))
        .route("/health", get(health))
        .with_state(state)
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn handle_oracle_request(
    State(state): State<AppState>,
    body: Result<Json<OracleRequest>, JsonRejection>,
) -> (StatusCode, Json<OracleResponse>) {
    let raw = match body {
        Ok(Json(raw)) => raw,
        Err(rejection) => {
            let err = AdapterError::BadRequest(format!("body not parseable: {rejection}"));
            return respond_error(&state, String::new(), &log_correlator(""), err).await;
        }
    };

    let job_run_id = raw.id.clone().unwrap_or_default();
    let log_job = log_correlator(&job_run_id);
    let request = match EvaluationRequest::from_wire(raw) {
        Ok(request) => request,
        Err(err) => return respond_error(&state, job_run_id, &log_job, err).await,
    };

    let started = Instant::now();
    let deadline = state.config.request_deadline;
    let outcome = match tokio::time::timeout(deadline, run_pipeline(&state, &request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AdapterError::DeadlineExceeded(deadline.as_secs())),
    };

    match outcome {
        Ok(output) => {
            info!(
                job = %log_job,
                mode = mode_label(request.mode),
                cids = request.cids.len(),
                from_cache = output.revealed_from_cache,
                resolve_ms = output.timings.resolve_ms,
                ai_ms = output.timings.ai_ms,
                publish_ms = output.timings.publish_ms,
                total_ms = started.elapsed().as_millis() as u64,
                "request complete"
            );
            (
                StatusCode::OK,
                Json(OracleResponse::success(
                    request.job_run_id.clone(),
                    output.result_hex,
                    Some(output.justification_cid),
                )),
            )
        }
        Err(err) => respond_error(&state, request.job_run_id.clone(), &log_job, err).await,
    }
}

/// Logs need a non-empty correlator even when the node omits the job id.
/// The response always echoes the original id untouched.
fn log_correlator(job_run_id: &str) -> String {
    if job_run_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        job_run_id.to_string()
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: state.started_at,
        cache_entries: state.cache.len().await,
    })
}

async fn respond_error(
    state: &AppState,
    job_run_id: String,
    log_job: &str,
    err: AdapterError,
) -> (StatusCode, Json<OracleResponse>) {
    error!(job = %log_job, kind = err.kind(), error = %err, "request failed");

    // Informative failures still publish an auditable justification
    let justification_cid = if err.is_informative() {
        state.publisher.publish_error(&err).await
    } else {
        None
    };

    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(OracleResponse::failure(job_run_id, &err, justification_cid)),
    )
}

// ============================================================================
// Request Pipeline
// ============================================================================

#[derive(Debug, Default)]
struct PhaseTimings {
    resolve_ms: u64,
    ai_ms: u64,
    publish_ms: u64,
}

struct PipelineOutput {
    result_hex: String,
    justification_cid: String,
    timings: PhaseTimings,
    revealed_from_cache: bool,
}

async fn run_pipeline(
    state: &AppState,
    request: &EvaluationRequest,
) -> AdapterResult<PipelineOutput> {
    let key = fingerprint(
        &request.request_id,
        request.primary_cid(),
        request.bcids(),
        request.class_id,
    );

    if request.mode == RequestMode::Reveal {
        if let Some(record) = state.cache.get(&key).await {
            info!(
                job = %request.job_run_id,
                fingerprint = %hex::encode(&key[..8]),
                "reveal served from commit cache"
            );
            return Ok(PipelineOutput {
                result_hex: encoder::to_hex(&record.result_bytes),
                justification_cid: record.justification_cid,
                timings: PhaseTimings::default(),
                revealed_from_cache: true,
            });
        }
        warn!(
            job = %request.job_run_id,
            fingerprint = %hex::encode(&key[..8]),
            "reveal cache miss, running full evaluation"
        );
    }

    let mut timings = PhaseTimings::default();

    // Working directory lives for the whole pipeline; dropped on every exit
    let workdir = WorkDir::create()?;

    let phase = Instant::now();
    let manifest = state.resolver.resolve(&request.cids, &workdir).await?;
    timings.resolve_ms = phase.elapsed().as_millis() as u64;

    let jury_request = JuryRequest {
        manifest: manifest.clone(),
        fingerprint: (request.mode != RequestMode::Standard).then(|| hex::encode(key)),
    };
    let phase = Instant::now();
    let verdict = state.jury.evaluate(&jury_request).await?;
    timings.ai_ms = phase.elapsed().as_millis() as u64;

    let phase = Instant::now();
    let justification_cid = state.publisher.publish_verdict(&verdict, &manifest).await?;
    timings.publish_ms = phase.elapsed().as_millis() as u64;

    let result_bytes = encoder::encode_standard(&justification_cid, &verdict.scores);

    let result_hex = match request.mode {
        RequestMode::Commit => {
            let hash = commit_hash(&result_bytes);
            state
                .cache
                .store(
                    key,
                    CommitRecord {
                        result_bytes,
                        justification_cid: justification_cid.clone(),
                        scores: verdict.scores.clone(),
                        stored_at: Instant::now(),
                        key_derivation: KEY_DERIVATION,
                    },
                )
                .await;
            encoder::to_hex(&encoder::encode_commit(&hash, &justification_cid))
        }
        RequestMode::Standard | RequestMode::Reveal => encoder::to_hex(&result_bytes),
    };

    Ok(PipelineOutput {
        result_hex,
        justification_cid,
        timings,
        revealed_from_cache: false,
    })
}

fn mode_label(mode: RequestMode) -> &'static str {
    match mode {
        RequestMode::Standard => "standard",
        RequestMode::Commit => "commit",
        RequestMode::Reveal => "reveal",
    }
}
