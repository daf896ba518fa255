//! Top-level catalog resolution
//!
//! `Start -> SourceParsed -> Fetched -> StructureValidated -> {EntrySelected | EntryNotFound}`
//!
//! Each transition is a hard gate: a failed step means nothing after it runs.
//! Without an entry name resolution stops at `StructureValidated` and
//! returns the listing.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info};

use super::discovery::{self, Discovery, SHARED_ASSETS, SHARED_DIR};
use super::{CatalogFetcher, CatalogSource, CollectionEntry};
use crate::error::{BerthError, Result};
use crate::version::Version;

/// Catalog used when no source descriptor is given
pub const DEFAULT_CATALOG_SOURCE: &str = "https://github.com/berth-dev/catalog.git";

/// Default limit for a single fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Whether a named collection may be resolved against the default catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourcePolicy {
    #[default]
    AllowDefault,
    /// Selecting by name requires an explicit source
    RequireExplicit,
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub default_source: String,
    pub timeout: Duration,
    pub source_policy: SourcePolicy,
    /// Version collections' `minRequiredVersion` is checked against
    pub current_version: Version,
}

impl ResolverOptions {
    pub fn new(current_version: Version) -> Self {
        Self {
            default_source: DEFAULT_CATALOG_SOURCE.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            source_policy: SourcePolicy::default(),
            current_version,
        }
    }
}

/// Browse outcome: everything the catalog offers
#[derive(Debug)]
pub struct CatalogListing {
    pub source: CatalogSource,
    pub discovery: Discovery,
}

/// A selected collection, ready to be materialized
///
/// Owns the working directory the catalog was fetched into; the files stay
/// on disk until this value is dropped.
#[derive(Debug)]
pub struct ResolvedCollection {
    pub source: CatalogSource,
    pub entry: CollectionEntry,
    pub catalog_root: PathBuf,
    /// Collection files, relative to [`Self::collection_dir`]
    pub files: Vec<PathBuf>,
    _workdir: TempDir,
}

impl ResolvedCollection {
    pub fn collection_dir(&self) -> PathBuf {
        self.catalog_root.join(&self.entry.relative_path)
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.catalog_root.join(SHARED_DIR)
    }

    /// Absolute paths of the shared assets every collection relies on
    pub fn shared_assets(&self) -> Vec<PathBuf> {
        let shared = self.shared_dir();
        SHARED_ASSETS.iter().map(|a| shared.join(a)).collect()
    }
}

#[derive(Debug)]
pub enum Resolution {
    Browse(CatalogListing),
    Selected(ResolvedCollection),
}

pub struct CatalogResolver<F> {
    fetcher: F,
    options: ResolverOptions,
}

impl<F: CatalogFetcher> CatalogResolver<F> {
    pub fn new(fetcher: F, options: ResolverOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Resolve a source and optionally select one collection from it
    pub fn resolve(&self, descriptor: Option<&str>, entry_name: Option<&str>) -> Result<Resolution> {
        match entry_name {
            Some(name) => self.select(descriptor, name).map(Resolution::Selected),
            None => self.browse(descriptor).map(Resolution::Browse),
        }
    }

    /// Resolve and list, never selecting
    pub fn browse(&self, descriptor: Option<&str>) -> Result<CatalogListing> {
        let fetched = self.fetch_and_discover(descriptor)?;
        Ok(CatalogListing {
            source: fetched.source,
            discovery: fetched.discovery,
        })
    }

    /// Resolve and select `name`
    pub fn select(&self, descriptor: Option<&str>, name: &str) -> Result<ResolvedCollection> {
        if descriptor.is_none() && self.options.source_policy == SourcePolicy::RequireExplicit {
            return Err(BerthError::SourceRequired {
                name: name.to_string(),
            });
        }

        let mut fetched = self.fetch_and_discover(descriptor)?;
        let entry = select(&mut fetched.discovery, &fetched.source, name)?;
        let files = discovery::collection_files(&fetched.root.join(&entry.relative_path))?;

        info!("Selected collection '{}' from {}", entry.name, fetched.source);
        Ok(ResolvedCollection {
            source: fetched.source,
            entry,
            catalog_root: fetched.root,
            files,
            _workdir: fetched.workdir,
        })
    }

    /// `Start -> SourceParsed -> Fetched -> StructureValidated`
    fn fetch_and_discover(&self, descriptor: Option<&str>) -> Result<Fetched> {
        let source = CatalogSource::parse(descriptor.unwrap_or(&self.options.default_source))?;
        debug!("Source parsed: {}", source);

        let workdir = tempfile::Builder::new()
            .prefix("berth-catalog-")
            .tempdir()
            .map_err(|e| BerthError::io(std::env::temp_dir(), e))?;

        let root = self
            .fetcher
            .fetch(&source, workdir.path(), self.options.timeout)?;
        debug!("Fetched catalog into {}", root.display());

        let discovery = discovery::list_collections(&root, &self.options.current_version)?;
        debug!("Structure validated: {} collection(s)", discovery.entries.len());

        Ok(Fetched {
            source,
            workdir,
            root,
            discovery,
        })
    }
}

/// Intermediate state of one resolution; dropped when the call returns
struct Fetched {
    source: CatalogSource,
    workdir: TempDir,
    root: PathBuf,
    discovery: Discovery,
}

/// Pick `name` out of a discovery, surfacing why it was skipped if it was
fn select(discovery: &mut Discovery, source: &CatalogSource, name: &str) -> Result<CollectionEntry> {
    if let Some(entry) = discovery.take(name) {
        return Ok(entry);
    }

    if let Some(skipped) = discovery.take_skipped(name) {
        return Err(skipped.reason);
    }

    if discovery.entries.is_empty() && discovery.skipped.is_empty() {
        return Err(BerthError::NoCollectionsFound {
            descriptor: source.descriptor(),
        });
    }

    Err(BerthError::CollectionNotFound {
        name: name.to_string(),
        descriptor: source.descriptor(),
    })
}
