//! Project materialization and the companion lock file
//!
//! `berth init` copies a resolved collection into `<project>/.devcontainer/`
//! with the catalog's shared assets under `.devcontainer/shared/`, then
//! records where it came from in `.devcontainer/berth.lock`. That lock is
//! the metadata reconciliation needs to find the project's template again.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::catalog::{ResolvedCollection, SHARED_DIR};
use crate::reconcile::ENV_FILES;
use crate::version::Version;

/// Directory every materialized project keeps its container setup in
pub const DEVCONTAINER_DIR: &str = ".devcontainer";

const LOCK_FILE: &str = "berth.lock";

/// Contents of `.devcontainer/berth.lock`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    /// Catalog descriptor the collection was resolved from
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub collection: String,
    /// berth version that materialized the project
    #[serde(default)]
    pub tool_version: String,
    #[serde(default)]
    pub materialized_at: String,
    /// Materialized file (relative to `.devcontainer/`) to content digest
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// A materialized file whose content no longer matches the lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDrift {
    pub path: String,
    pub state: DriftState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftState {
    Modified,
    Deleted,
}

impl ProjectManifest {
    pub fn new(source: &str, collection: &str, tool_version: &str) -> Self {
        Self {
            source: source.to_string(),
            collection: collection.to_string(),
            tool_version: tool_version.to_string(),
            materialized_at: chrono::Utc::now().to_rfc3339(),
            files: BTreeMap::new(),
        }
    }

    /// Lock file location for the project rooted at `project_dir`
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(DEVCONTAINER_DIR).join(LOCK_FILE)
    }

    /// Load the project's lock, `None` when the project has none
    pub fn load(project_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(project_dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let path = Self::path(project_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml_ng::to_string(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Whether the lock says which collection produced the project and with
    /// which berth version
    pub fn identifies_template(&self) -> bool {
        !self.collection.trim().is_empty() && !self.tool_version.trim().is_empty()
    }

    /// Materialized files that were edited or removed since `berth init`
    pub fn drift(&self, project_dir: &Path) -> Result<Vec<FileDrift>> {
        let base = project_dir.join(DEVCONTAINER_DIR);
        let mut drift = Vec::new();

        for (rel, recorded) in &self.files {
            let path = base.join(rel);
            let state = if !path.is_file() {
                Some(DriftState::Deleted)
            } else if hash_file(&path)? != *recorded {
                Some(DriftState::Modified)
            } else {
                None
            };

            if let Some(state) = state {
                debug!("{} is {:?}", rel, state);
                drift.push(FileDrift {
                    path: rel.clone(),
                    state,
                });
            }
        }

        Ok(drift)
    }
}

/// `sha256:<hex>` digest of a file's contents
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// Writes resolved collections into a project directory
pub struct Materializer {
    project_dir: PathBuf,
    tool_version: Version,
    force: bool,
}

impl Materializer {
    pub fn new(project_dir: impl Into<PathBuf>, tool_version: Version) -> Self {
        Self {
            project_dir: project_dir.into(),
            tool_version,
            force: false,
        }
    }

    /// Overwrite files in an existing `.devcontainer/`
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn target_dir(&self) -> PathBuf {
        self.project_dir.join(DEVCONTAINER_DIR)
    }

    /// Copy the collection and shared assets, then write the lock
    ///
    /// Existing env files are left alone even when forced. Env files shipped
    /// by the collection only seed a project that has none, and are not
    /// tracked in the lock since `sync` edits them.
    pub fn materialize(&self, resolved: &ResolvedCollection) -> Result<ProjectManifest> {
        let target = self.target_dir();
        if target.exists() && !self.force {
            bail!(
                "{} already exists. Use --force to overwrite the materialized files",
                target.display()
            );
        }
        std::fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;

        let mut manifest = ProjectManifest::new(
            &resolved.source.descriptor(),
            &resolved.entry.name,
            &self.tool_version.to_string(),
        );

        let collection_dir = resolved.collection_dir();
        for rel in &resolved.files {
            if is_env_file(rel) {
                if target.join(rel).exists() {
                    debug!("Keeping existing {}", target.join(rel).display());
                } else {
                    self.copy(&collection_dir.join(rel), rel)?;
                }
                continue;
            }
            self.copy_file(&collection_dir.join(rel), rel, &mut manifest)?;
        }

        let shared_dir = resolved.shared_dir();
        for entry in WalkDir::new(&shared_dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", shared_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&shared_dir)
                .with_context(|| format!("{} escapes the catalog", entry.path().display()))?;
            self.copy_file(entry.path(), &Path::new(SHARED_DIR).join(rel), &mut manifest)?;
        }

        manifest.save(&self.project_dir)?;
        info!(
            "Materialized '{}' into {} ({} files)",
            manifest.collection,
            target.display(),
            manifest.files.len()
        );
        Ok(manifest)
    }

    fn copy(&self, from: &Path, rel: &Path) -> Result<PathBuf> {
        let to = self.target_dir().join(rel);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::copy(from, &to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        Ok(to)
    }

    fn copy_file(&self, from: &Path, rel: &Path, manifest: &mut ProjectManifest) -> Result<()> {
        let to = self.copy(from, rel)?;
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        manifest.files.insert(key, hash_file(&to)?);
        Ok(())
    }
}

fn is_env_file(rel: &Path) -> bool {
    ENV_FILES.iter().any(|name| rel == Path::new(name))
}
