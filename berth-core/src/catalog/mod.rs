//! berth Catalog - collection discovery and resolution
//!
//! A catalog is a git repository holding one or more collections plus a
//! shared-assets bundle that every collection relies on.
//!
//! # Architecture
//!
//! ```text
//! "<clone-url>[@<ref>]"
//!     │  CatalogSource::parse
//!     ▼
//! CatalogFetcher (git clone / local dir)
//!     │
//!     ▼
//! <catalog-root>/
//!     ├── shared/postcreate.sh          ← required shared assets
//!     ├── shared/functions.sh
//!     ├── shared/project-setup.sh
//!     └── collections/**/collection.yaml ← one manifest per collection
//!            │  list_collections / validate_collections
//!            ▼
//!     CatalogResolver → ResolvedCollection
//! ```

mod discovery;
mod fetcher;
mod manifest;
mod resolver;
mod source;

pub use discovery::{
    check_shared_assets, collection_files, list_collections, validate_collections, Discovery,
    SkippedCollection, COLLECTIONS_DIR, SHARED_ASSETS, SHARED_DIR,
};
pub use fetcher::{AutoFetcher, CatalogFetcher, FetchError, GitFetcher, LocalFetcher};
pub use manifest::{
    declared_name, validate_entry, CollectionEntry, CollectionManifest, CONFIG_FILE, MANIFEST_FILE,
    POSTCREATE_REFERENCE,
};
pub use resolver::{
    CatalogListing, CatalogResolver, Resolution, ResolvedCollection, ResolverOptions,
    SourcePolicy, DEFAULT_CATALOG_SOURCE, DEFAULT_FETCH_TIMEOUT,
};
pub use source::CatalogSource;

#[cfg(test)]
pub(crate) mod fixture;

#[cfg(test)]
mod tests;
