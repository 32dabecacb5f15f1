//! Manifest resolver
//!
//! Turns the request's CID list into one parsed combined manifest: fetches
//! each archive from IPFS, extracts it into the request's working
//! directory, validates its manifest, resolves the primary query and all
//! referenced files, binds bCID archives to the primary's `bCIDs` map and
//! assembles the composite prompt handed to the AI jury.

pub mod archive;
pub mod manifest;
pub mod workdir;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::ipfs::IpfsClient;
use manifest::{
    default_outcomes, Manifest, ManifestRole, ModelSpec, QueryFile, MANIFEST_FILENAME,
};
use workdir::WorkDir;

/// An attachment resolved to a file on disk
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    /// Name the manifest (and the AI payload) knows the attachment by
    pub name: String,
    /// The manifest's declared `type`; may be a MIME type or `ipfs/cid`
    pub declared_type: String,
    /// Absolute path inside the working directory
    pub path: PathBuf,
    pub description: Option<String>,
}

/// A support document resolved to a file on disk
#[derive(Debug, Clone)]
pub struct ResolvedSupport {
    pub hash: String,
    pub path: PathBuf,
}

/// Resolver output: everything the AI client needs for one evaluation
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub prompt: String,
    pub outcomes: Vec<String>,
    pub models: Vec<ModelSpec>,
    pub iterations: u32,
    pub additional: Vec<ResolvedAttachment>,
    pub support: Vec<ResolvedSupport>,
    pub bcids: Option<BTreeMap<String, String>>,
    pub addendum: Option<String>,
    pub references: Vec<String>,
}

/// One archive after fetch, extraction and per-archive resolution
#[derive(Debug)]
pub struct LoadedArchive {
    pub role: ManifestRole,
    pub cid: String,
    pub manifest: Manifest,
    pub query: QueryFile,
    pub additional: Vec<ResolvedAttachment>,
    pub support: Vec<ResolvedSupport>,
}

/// Resolves CID lists into parsed combined manifests
#[derive(Clone)]
pub struct ManifestResolver {
    ipfs: Arc<IpfsClient>,
}

impl ManifestResolver {
    pub fn new(ipfs: Arc<IpfsClient>) -> Self {
        Self { ipfs }
    }

    /// Resolve the full CID list of a request.
    ///
    /// The first CID is the primary; every further CID is a bound archive
    /// whose manifest `name` must match a key in the primary's `bCIDs`.
    pub async fn resolve(
        &self,
        cids: &[String],
        workdir: &WorkDir,
    ) -> AdapterResult<ParsedManifest> {
        if cids.is_empty() {
            return Err(AdapterError::BadRequest("request carries no CID".into()));
        }

        let mut archives = Vec::with_capacity(cids.len());
        for (index, cid) in cids.iter().enumerate() {
            let role = if index == 0 {
                ManifestRole::Primary
            } else {
                ManifestRole::Bound
            };
            archives.push(self.load_archive(cid, index, role, workdir).await?);
        }

        combine(archives)
    }

    async fn load_archive(
        &self,
        cid: &str,
        index: usize,
        role: ManifestRole,
        workdir: &WorkDir,
    ) -> AdapterResult<LoadedArchive> {
        let blob = self.ipfs.fetch(cid).await?;
        let dir = workdir.subdir(&format!("archive_{index}"))?;
        archive::extract(&blob, &dir)?;

        let manifest_path = locate_manifest(&dir)?;
        let archive_root = manifest_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| dir.clone());
        let manifest_bytes = std::fs::read(&manifest_path)
            .map_err(|e| AdapterError::ArchiveCorrupt(format!("manifest read failed: {e}")))?;
        let manifest = Manifest::parse(&manifest_bytes)?;
        manifest.validate(role)?;

        let query = self.resolve_query(&manifest, &archive_root).await?;
        let additional = self
            .resolve_additional(&manifest, &archive_root, workdir)
            .await?;
        let support = self.resolve_support(&manifest, workdir).await?;

        debug!(
            cid,
            ?role,
            attachments = additional.len(),
            support = support.len(),
            "archive resolved"
        );

        Ok(LoadedArchive {
            role,
            cid: cid.to_string(),
            manifest,
            query,
            additional,
            support,
        })
    }

    async fn resolve_query(
        &self,
        manifest: &Manifest,
        archive_root: &std::path::Path,
    ) -> AdapterResult<QueryFile> {
        let primary = manifest.primary.as_ref().ok_or_else(|| {
            AdapterError::ManifestInvalid("missing required field: primary".into())
        })?;
        let bytes = match (&primary.filename, &primary.hash) {
            (Some(filename), None) => {
                std::fs::read(archive_root.join(filename)).map_err(|e| {
                    AdapterError::ManifestInvalid(format!(
                        "primary query file {filename} unreadable: {e}"
                    ))
                })?
            }
            (None, Some(hash)) => self.ipfs.fetch(hash).await?,
            _ => unreachable!("primary passed XOR validation"),
        };
        QueryFile::parse(&bytes)
    }

    async fn resolve_additional(
        &self,
        manifest: &Manifest,
        archive_root: &std::path::Path,
        workdir: &WorkDir,
    ) -> AdapterResult<Vec<ResolvedAttachment>> {
        let entries = match &manifest.additional {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };

        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = match (&entry.filename, &entry.hash) {
                (Some(filename), None) => {
                    let path = archive_root.join(filename);
                    if !path.is_file() {
                        return Err(AdapterError::ManifestInvalid(format!(
                            "additional file {filename} not present in archive"
                        )));
                    }
                    path
                }
                (None, Some(hash)) => {
                    let bytes = self.ipfs.fetch(hash).await?;
                    workdir.write_file(&format!("additional_{hash}"), &bytes)?
                }
                _ => unreachable!("additional entries passed XOR validation"),
            };
            resolved.push(ResolvedAttachment {
                name: entry.name.clone(),
                declared_type: entry.kind.clone(),
                path,
                description: entry.description.clone(),
            });
        }
        Ok(resolved)
    }

    async fn resolve_support(
        &self,
        manifest: &Manifest,
        workdir: &WorkDir,
    ) -> AdapterResult<Vec<ResolvedSupport>> {
        let entries = match &manifest.support {
            Some(entries) => entries,
            None => return Ok(Vec::new()),
        };

        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let cid = &entry.hash.cid;
            let bytes = self.ipfs.fetch(cid).await?;
            let path = workdir.write_file(&format!("support_{cid}"), &bytes)?;
            resolved.push(ResolvedSupport {
                hash: cid.clone(),
                path,
            });
        }
        Ok(resolved)
    }
}

fn bound_name(archive: &LoadedArchive) -> AdapterResult<&str> {
    archive
        .manifest
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            AdapterError::ManifestInvalid("bound archive manifest must declare a name".into())
        })
}

fn locate_manifest(dir: &std::path::Path) -> AdapterResult<PathBuf> {
    let root = dir.join(MANIFEST_FILENAME);
    if root.is_file() {
        return Ok(root);
    }
    // Tolerate archives wrapping their content in a single top-level folder
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| AdapterError::ArchiveCorrupt(format!("workdir read failed: {e}")))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect::<Vec<_>>();
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            let nested = entry.join(MANIFEST_FILENAME);
            if nested.is_file() {
                return Ok(nested);
            }
        }
    }
    Err(AdapterError::ArchiveCorrupt(
        "archive does not contain manifest.json".into(),
    ))
}

/// Merge loaded archives into the combined manifest.
///
/// Binds each bound archive's `name` to the primary's `bCIDs` map (every
/// key used exactly once), builds the composite prompt in input order and
/// concatenates attachments primary-first.
pub fn combine(archives: Vec<LoadedArchive>) -> AdapterResult<ParsedManifest> {
    let mut iter = archives.into_iter();
    let primary = iter
        .next()
        .ok_or_else(|| AdapterError::BadRequest("no archives resolved".into()))?;
    let bounds: Vec<LoadedArchive> = iter.collect();

    let jury = primary.manifest.jury();
    let primary_prompt = primary
        .query
        .query
        .clone()
        .unwrap_or_default();

    // Every bound name must exist in bCIDs, each key used exactly once
    let bcids = primary.manifest.bcids.clone();
    if !bounds.is_empty() {
        let declared = bcids.as_ref().ok_or_else(|| {
            AdapterError::ManifestInvalid(
                "request has bound archives but primary manifest declares no bCIDs".into(),
            )
        })?;
        let mut used: HashSet<&str> = HashSet::new();
        for bound in &bounds {
            let name = bound_name(bound)?;
            if !declared.contains_key(name) {
                return Err(AdapterError::ManifestInvalid(format!(
                    "bound archive name {name:?} is not declared in the primary bCIDs map"
                )));
            }
            if !used.insert(name) {
                return Err(AdapterError::ManifestInvalid(format!(
                    "bound archive name {name:?} is declared by more than one archive"
                )));
            }
        }
        for key in declared.keys() {
            if !used.contains(key.as_str()) {
                return Err(AdapterError::ManifestInvalid(format!(
                    "bCIDs key {key:?} has no matching bound archive"
                )));
            }
        }
    }

    // Composite prompt: primary first, bound work products in input order
    let mut prompt = primary_prompt;
    for bound in &bounds {
        let name = bound_name(bound)?;
        let work = bound.query.query.as_deref().unwrap_or_default();
        prompt.push_str(&format!(
            "\n\n**\nWork product submitted for evaluation:\nName: {name}\n{work}"
        ));
    }
    if let Some(addendum) = &primary.manifest.addendum {
        prompt.push_str(&format!("\n\nAddendum: {addendum}"));
    }

    // Outcomes: declared list wins, else synthesized; length must match
    let outcomes = match &primary.query.outcomes {
        Some(declared) if !declared.is_empty() => {
            if declared.len() != jury.outcome_count as usize {
                return Err(AdapterError::ManifestInvalid(format!(
                    "query declares {} outcomes but NUMBER_OF_OUTCOMES is {}",
                    declared.len(),
                    jury.outcome_count
                )));
            }
            declared.clone()
        }
        _ => default_outcomes(jury.outcome_count),
    };

    // Attachments: primary first, then bounds in input order. Collisions
    // across archives get the bound archive's name as a suffix.
    let mut additional = primary.additional.clone();
    let mut names: HashSet<String> = additional.iter().map(|a| a.name.clone()).collect();
    for bound in &bounds {
        let archive_name = bound_name(bound)?;
        for attachment in &bound.additional {
            let mut entry = attachment.clone();
            if !names.insert(entry.name.clone()) {
                let renamed = format!("{}_{archive_name}", entry.name);
                warn!(
                    original = %entry.name,
                    renamed = %renamed,
                    "attachment name collision across archives"
                );
                names.insert(renamed.clone());
                entry.name = renamed;
            }
            additional.push(entry);
        }
    }

    // References: union over primary and bounds, first occurrence wins
    let mut references: Vec<String> = Vec::new();
    let mut seen_refs: HashSet<String> = HashSet::new();
    let all_refs = primary
        .query
        .references
        .iter()
        .flatten()
        .chain(bounds.iter().flat_map(|b| b.query.references.iter().flatten()));
    for reference in all_refs {
        if seen_refs.insert(reference.clone()) {
            references.push(reference.clone());
        }
    }
    for reference in &references {
        if !names.contains(reference) {
            warn!(reference = %reference, "reference does not match any attachment name");
        }
    }

    let mut support = primary.support.clone();
    for bound in &bounds {
        support.extend(bound.support.iter().cloned());
    }

    Ok(ParsedManifest {
        prompt,
        outcomes,
        models: jury.models,
        iterations: jury.iterations,
        additional,
        support,
        bcids,
        addendum: primary.manifest.addendum.clone(),
        references,
    })
}
