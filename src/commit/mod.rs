//! Commit-reveal cache
//!
//! In-memory store keyed by a deterministic request fingerprint. A mode-1
//! (commit) evaluation stashes its encoded result here; the matching
//! mode-2 (reveal) replays those bytes untouched so the on-chain reveal
//! check sees exactly what was committed. Entries live for `revealTTL` and
//! are never persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How the fingerprint preimage is assembled; stored with each record so a
/// future derivation change cannot silently mix key spaces
pub const KEY_DERIVATION: &str = "sha256/len-delimited/v1";

/// 32-byte request fingerprint
pub type Fingerprint = [u8; 32];

/// Derive the fingerprint binding a commit to its reveal.
///
/// Fields are length-delimited before hashing so no concatenation of CIDs
/// can collide with another field split. bCIDs are sorted: the fingerprint
/// is invariant under their order in the request.
pub fn fingerprint(
    request_id: &str,
    primary_cid: &str,
    bcids: &[String],
    class_id: Option<i64>,
) -> Fingerprint {
    let mut sorted: Vec<&str> = bcids.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    let mut feed = |field: &[u8]| {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field);
    };
    feed(request_id.as_bytes());
    feed(primary_cid.as_bytes());
    for bcid in &sorted {
        feed(bcid.as_bytes());
    }
    let class = class_id.map(|c| c.to_string()).unwrap_or_default();
    feed(class.as_bytes());

    hasher.finalize().into()
}

/// 16-byte commit hash published in mode 1: a truncated SHA-256 of the
/// encoded mode-0 result bytes
pub fn commit_hash(result_bytes: &[u8]) -> [u8; 16] {
    let digest: [u8; 32] = Sha256::digest(result_bytes).into();
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&digest[..16]);
    truncated
}

/// What a commit stashes for its reveal
#[derive(Debug, Clone)]
pub struct CommitRecord {
    /// Encoded mode-0 result bytes, replayed verbatim on reveal
    pub result_bytes: Vec<u8>,
    pub justification_cid: String,
    pub scores: Vec<u64>,
    pub stored_at: Instant,
    pub key_derivation: &'static str,
}

/// Thread-safe in-memory commit store shared by all requests
#[derive(Clone)]
pub struct CommitCache {
    inner: Arc<RwLock<HashMap<Fingerprint, CommitRecord>>>,
    ttl: Duration,
}

impl CommitCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Stash a completed commit. Only successful evaluations are stored.
    pub async fn store(&self, key: Fingerprint, record: CommitRecord) {
        debug!(fingerprint = %hex::encode(&key[..8]), "storing commit record");
        self.inner.write().await.insert(key, record);
    }

    /// Look up a commit for reveal. A record at or past `revealTTL` age is
    /// treated as expired and skipped.
    pub async fn get(&self, key: &Fingerprint) -> Option<CommitRecord> {
        let guard = self.inner.read().await;
        match guard.get(key) {
            Some(record) if record.stored_at.elapsed() < self.ttl => Some(record.clone()),
            Some(_) => {
                warn!(
                    fingerprint = %hex::encode(&key[..8]),
                    "commit record expired before reveal"
                );
                None
            }
            None => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Drop expired entries; returns how many were evicted
    pub async fn sweep(&self) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, record| record.stored_at.elapsed() < self.ttl);
        before - guard.len()
    }

    /// Background task evicting expired entries every `revealTTL / 4`
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        let period = (cache.ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = cache.sweep().await;
                if evicted > 0 {
                    let remaining = cache.len().await;
                    info!(evicted, remaining, "commit cache sweep");
                }
            }
        })
    }
}
