//! Catalog structure discovery
//!
//! Walks `collections/` for manifests at any depth and validates each one
//! independently. Two query functions share one scan:
//!
//! - [`list_collections`] skips collections with per-collection faults and
//!   logs a warning for each (browsing flows).
//! - [`validate_collections`] fails on the first per-collection fault
//!   (explicit validation flows).
//!
//! Missing shared assets and duplicate names abort both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::manifest::{declared_name, validate_entry, CollectionEntry, CONFIG_FILE, MANIFEST_FILE};
use crate::error::{BerthError, Result};
use crate::version::Version;

/// Shared-assets location, relative to the catalog root
pub const SHARED_DIR: &str = "shared";

/// Where collections live, relative to the catalog root
pub const COLLECTIONS_DIR: &str = "collections";

/// Files every catalog must ship in `shared/`
pub const SHARED_ASSETS: &[&str] = &["postcreate.sh", "functions.sh", "project-setup.sh"];

/// A collection left out of a listing, and why
#[derive(Debug)]
pub struct SkippedCollection {
    /// Known when the manifest parsed far enough to have one
    pub name: Option<String>,
    pub manifest: PathBuf,
    pub reason: BerthError,
}

/// Result of a skip-policy scan
#[derive(Debug, Default)]
pub struct Discovery {
    pub entries: Vec<CollectionEntry>,
    pub skipped: Vec<SkippedCollection>,
}

impl Discovery {
    /// Remove and return the usable collection called `name`
    pub fn take(&mut self, name: &str) -> Option<CollectionEntry> {
        let pos = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.swap_remove(pos))
    }

    /// Remove and return the skipped collection that declared `name`
    pub fn take_skipped(&mut self, name: &str) -> Option<SkippedCollection> {
        let pos = self
            .skipped
            .iter()
            .position(|s| s.name.as_deref() == Some(name))?;
        Some(self.skipped.swap_remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// List usable collections, skipping faulty ones with a warning each
pub fn list_collections(root: &Path, current_version: &Version) -> Result<Discovery> {
    let mut discovery = Discovery::default();

    for candidate in scan(root, current_version)? {
        match candidate.outcome {
            Ok(entry) => discovery.entries.push(entry),
            Err(reason) => {
                warn!(
                    "Skipping collection at {}: {}",
                    candidate.manifest.display(),
                    reason
                );
                discovery.skipped.push(SkippedCollection {
                    name: candidate.name,
                    manifest: candidate.manifest,
                    reason,
                });
            }
        }
    }

    debug!(
        "Discovered {} collection(s), skipped {}",
        discovery.entries.len(),
        discovery.skipped.len()
    );
    Ok(discovery)
}

/// Validate every collection, failing on the first per-collection fault
pub fn validate_collections(root: &Path, current_version: &Version) -> Result<Vec<CollectionEntry>> {
    scan(root, current_version)?
        .into_iter()
        .map(|candidate| candidate.outcome)
        .collect()
}

/// Fails with `MissingSharedAssets` unless every shared asset is present
pub fn check_shared_assets(root: &Path) -> Result<PathBuf> {
    let location = root.join(SHARED_DIR);
    let missing: Vec<String> = SHARED_ASSETS
        .iter()
        .filter(|asset| !location.join(asset).is_file())
        .map(|asset| asset.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(BerthError::MissingSharedAssets { location, missing });
    }

    Ok(location)
}

/// Files belonging to the collection at `dir`, relative to it
///
/// Nested collections are excluded, as is the manifest itself.
pub fn collection_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && e.path().join(MANIFEST_FILE).is_file())
        });

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if rel == Path::new(MANIFEST_FILE) {
            continue;
        }
        files.push(rel.to_path_buf());
    }

    Ok(files)
}

struct Candidate {
    manifest: PathBuf,
    name: Option<String>,
    outcome: Result<CollectionEntry>,
}

fn scan(root: &Path, current_version: &Version) -> Result<Vec<Candidate>> {
    check_shared_assets(root)?;

    let collections_root = root.join(COLLECTIONS_DIR);
    if !collections_root.is_dir() {
        debug!("No {} directory in {}", COLLECTIONS_DIR, root.display());
        return Ok(Vec::new());
    }

    let mut manifests = Vec::new();
    for entry in WalkDir::new(&collections_root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(&collections_root, e))?;
        if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
            debug!("Found collection manifest: {}", entry.path().display());
            manifests.push(entry.into_path());
        }
    }

    let mut candidates: Vec<Candidate> = manifests
        .into_iter()
        .map(|manifest| {
            let outcome = validate_entry(root, &manifest);
            Candidate {
                name: match &outcome {
                    Ok(entry) => Some(entry.name.clone()),
                    Err(_) => declared_name(&manifest),
                },
                manifest,
                outcome,
            }
        })
        .collect();

    check_unique_names(&candidates)?;

    for candidate in &mut candidates {
        if let Ok(entry) = &candidate.outcome {
            if let Err(fault) = check_policy(root, entry, current_version) {
                candidate.outcome = Err(fault);
            }
        }
    }

    Ok(candidates)
}

fn check_unique_names(candidates: &[Candidate]) -> Result<()> {
    let mut seen: BTreeMap<&str, &Path> = BTreeMap::new();

    for candidate in candidates {
        let Some(name) = candidate.name.as_deref() else {
            continue;
        };
        if let Some(first) = seen.insert(name, &candidate.manifest) {
            let (first, second) = if first <= candidate.manifest.as_path() {
                (first, candidate.manifest.as_path())
            } else {
                (candidate.manifest.as_path(), first)
            };
            return Err(BerthError::DuplicateCollectionName {
                name: name.to_string(),
                first: first.to_path_buf(),
                second: second.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// Per-collection structural checks that run after the manifest validated
fn check_policy(root: &Path, entry: &CollectionEntry, current_version: &Version) -> Result<()> {
    let dir = root.join(&entry.relative_path);

    let conflicts: Vec<String> = collection_files(&dir)?
        .into_iter()
        .filter(|f| {
            f.file_name()
                .and_then(|n| n.to_str())
                .map(|n| SHARED_ASSETS.contains(&n))
                .unwrap_or(false)
        })
        .map(|f| f.display().to_string())
        .collect();

    if !conflicts.is_empty() {
        return Err(BerthError::CollectionAssetConflict {
            collection: entry.name.clone(),
            path: dir,
            files: conflicts,
        });
    }

    if !entry.has_config_file {
        return Err(BerthError::IncompleteCollection {
            collection: entry.name.clone(),
            path: dir,
            missing: CONFIG_FILE.to_string(),
        });
    }

    if let Some(required) = &entry.min_required_version {
        if !current_version.satisfies(required) {
            return Err(BerthError::IncompatibleCollection {
                collection: entry.name.clone(),
                required: required.to_string(),
                current: current_version.to_string(),
            });
        }
    }

    Ok(())
}

fn walk_error(base: &Path, err: walkdir::Error) -> BerthError {
    let path = err.path().unwrap_or(base).to_path_buf();
    match err.into_io_error() {
        Some(source) => BerthError::io(path, source),
        None => BerthError::Parse {
            path,
            reason: "filesystem loop detected".to_string(),
        },
    }
}
