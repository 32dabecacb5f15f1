//! Manifest schema
//!
//! Wire shapes of the `manifest.json` found at the root of every evaluation
//! archive, plus the primary query file it points at. Parsing (serde) and
//! validation are separate passes: a manifest can deserialize fine and
//! still be rejected for a schema violation.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::error::{AdapterError, AdapterResult};

/// Name of the manifest file inside every archive
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Role an archive plays in a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestRole {
    /// First CID in the request
    Primary,
    /// Any further CID; must declare a `name` bound in the primary's `bCIDs`
    Bound,
}

/// Root manifest document
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub version: Option<String>,
    pub primary: Option<PrimaryRef>,
    pub name: Option<String>,
    #[serde(rename = "juryParameters")]
    pub jury_parameters: Option<JuryParameters>,
    pub additional: Option<Vec<AdditionalEntry>>,
    pub support: Option<Vec<SupportEntry>>,
    #[serde(rename = "bCIDs")]
    pub bcids: Option<BTreeMap<String, String>>,
    pub addendum: Option<String>,
}

/// Reference to the primary query file: local filename or IPFS hash
#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryRef {
    pub filename: Option<String>,
    pub hash: Option<String>,
}

/// Jury composition parameters
#[derive(Debug, Clone, Deserialize)]
pub struct JuryParameters {
    #[serde(rename = "NUMBER_OF_OUTCOMES")]
    pub number_of_outcomes: Option<u32>,
    #[serde(rename = "AI_NODES")]
    pub ai_nodes: Option<Vec<AiNodeSpec>>,
    #[serde(rename = "ITERATIONS")]
    pub iterations: Option<u32>,
}

/// One model in the jury pool
#[derive(Debug, Clone, Deserialize)]
pub struct AiNodeSpec {
    #[serde(rename = "AI_PROVIDER")]
    pub provider: String,
    #[serde(rename = "AI_MODEL")]
    pub model: String,
    #[serde(rename = "NO_COUNTS")]
    pub count: Option<u32>,
    #[serde(rename = "WEIGHT")]
    pub weight: Option<f64>,
}

/// Attachment entry: local file or IPFS-referenced blob
#[derive(Debug, Clone, Deserialize)]
pub struct AdditionalEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub filename: Option<String>,
    pub hash: Option<String>,
    pub description: Option<String>,
}

/// Supporting document entry
#[derive(Debug, Clone, Deserialize)]
pub struct SupportEntry {
    pub hash: SupportHash,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupportHash {
    pub cid: String,
    pub description: Option<String>,
    pub id: Option<String>,
}

/// Primary query file content
#[derive(Debug, Clone, Deserialize)]
pub struct QueryFile {
    pub query: Option<String>,
    pub references: Option<Vec<String>>,
    pub outcomes: Option<Vec<String>>,
}

/// Model selection after applying jury defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
    pub weight: f64,
    pub count: u32,
}

/// Jury parameters with defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedJury {
    pub outcome_count: u32,
    pub models: Vec<ModelSpec>,
    pub iterations: u32,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> AdapterResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AdapterError::ManifestInvalid(format!("manifest JSON invalid: {e}")))
    }

    /// Schema validation beyond what serde can express.
    ///
    /// Checks required fields, the `filename` XOR `hash` rule on `primary`
    /// and every `additional` entry, attachment name uniqueness, and the
    /// `name` requirement for bound archives.
    pub fn validate(&self, role: ManifestRole) -> AdapterResult<()> {
        match &self.version {
            Some(v) if !v.trim().is_empty() => {}
            _ => {
                return Err(AdapterError::ManifestInvalid(
                    "missing required field: version".into(),
                ))
            }
        }

        let primary = self.primary.as_ref().ok_or_else(|| {
            AdapterError::ManifestInvalid("missing required field: primary".into())
        })?;
        exactly_one("primary", primary.filename.as_deref(), primary.hash.as_deref())?;

        if role == ManifestRole::Bound {
            match &self.name {
                Some(n) if !n.trim().is_empty() => {}
                _ => {
                    return Err(AdapterError::ManifestInvalid(
                        "bound archive manifest must declare a name".into(),
                    ))
                }
            }
        }

        if let Some(additional) = &self.additional {
            let mut seen = HashSet::new();
            for entry in additional {
                if !seen.insert(entry.name.as_str()) {
                    return Err(AdapterError::ManifestInvalid(format!(
                        "duplicate additional entry name: {}",
                        entry.name
                    )));
                }
                exactly_one(
                    &format!("additional entry {}", entry.name),
                    entry.filename.as_deref(),
                    entry.hash.as_deref(),
                )?;
            }
        }

        Ok(())
    }

    /// Jury parameters with documented defaults applied
    pub fn jury(&self) -> ResolvedJury {
        let params = self.jury_parameters.as_ref();
        let outcome_count = params
            .and_then(|p| p.number_of_outcomes)
            .filter(|n| *n > 0)
            .unwrap_or(2);
        let iterations = params
            .and_then(|p| p.iterations)
            .filter(|n| *n > 0)
            .unwrap_or(1);
        let models = params
            .and_then(|p| p.ai_nodes.as_ref())
            .filter(|nodes| !nodes.is_empty())
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|n| ModelSpec {
                        provider: n.provider.clone(),
                        model: n.model.clone(),
                        weight: n.weight.unwrap_or(1.0),
                        count: n.count.unwrap_or(1),
                    })
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![ModelSpec {
                    provider: "OpenAI".to_string(),
                    model: "gpt-4".to_string(),
                    weight: 1.0,
                    count: 1,
                }]
            });

        ResolvedJury {
            outcome_count,
            models,
            iterations,
        }
    }
}

impl QueryFile {
    pub fn parse(bytes: &[u8]) -> AdapterResult<Self> {
        let query_file: QueryFile = serde_json::from_slice(bytes)
            .map_err(|e| AdapterError::ManifestInvalid(format!("query file JSON invalid: {e}")))?;
        match &query_file.query {
            Some(q) if !q.trim().is_empty() => Ok(query_file),
            _ => Err(AdapterError::ManifestInvalid(
                "query file missing required field: query".into(),
            )),
        }
    }
}

/// Synthesize `outcome1..outcomeN` when the query file declares none
pub fn default_outcomes(count: u32) -> Vec<String> {
    (1..=count).map(|i| format!("outcome{i}")).collect()
}

fn exactly_one(site: &str, filename: Option<&str>, hash: Option<&str>) -> AdapterResult<()> {
    match (filename, hash) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        (Some(_), Some(_)) => Err(AdapterError::ManifestInvalid(format!(
            "{site}: filename and hash are mutually exclusive"
        ))),
        (None, None) => Err(AdapterError::ManifestInvalid(format!(
            "{site}: one of filename or hash is required"
        ))),
    }
}
