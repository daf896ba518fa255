//! Error taxonomy for the catalog, template and reconciliation engine
//!
//! Every fault carries the offending name/path/field so the CLI can render an
//! actionable message. `BerthError::kind()` gives a stable discriminant and
//! `ErrorKind::scope()` tells callers whether a fault aborts the whole
//! resolution or only disqualifies one collection.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::FetchError;
use crate::template::TemplateRejected;

pub type Result<T> = std::result::Result<T, BerthError>;

#[derive(Error, Debug)]
pub enum BerthError {
    #[error("Invalid catalog source '{descriptor}': {reason}\n\nExpected <clone-url>[@<ref>], for example:\n  git@github.com:org/catalog.git@v2.0")]
    InvalidSourceFormat { descriptor: String, reason: String },

    #[error("Malformed version '{value}': {reason}")]
    MalformedVersion { value: String, reason: String },

    #[error("Catalog is missing shared assets in {}: {}", location.display(), missing.join(", "))]
    MissingSharedAssets {
        location: PathBuf,
        missing: Vec<String>,
    },

    #[error("No collections found in catalog '{descriptor}'")]
    NoCollectionsFound { descriptor: String },

    #[error("Duplicate collection name '{name}' declared by {} and {}", first.display(), second.display())]
    DuplicateCollectionName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Invalid collection manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Collection '{collection}' at {} shadows shared assets: {}", path.display(), files.join(", "))]
    CollectionAssetConflict {
        collection: String,
        path: PathBuf,
        files: Vec<String>,
    },

    #[error("Collection '{collection}' at {} is missing its {missing}", path.display())]
    IncompleteCollection {
        collection: String,
        path: PathBuf,
        missing: String,
    },

    #[error("Collection '{collection}' requires berth {required} or newer (running {current})")]
    IncompatibleCollection {
        collection: String,
        required: String,
        current: String,
    },

    #[error(transparent)]
    Template(#[from] TemplateRejected),

    #[error("Collection '{name}' not found in catalog '{descriptor}'.\n\nRun 'berth catalog list --source {descriptor}' to see available collections.")]
    CollectionNotFound { name: String, descriptor: String },

    #[error("Collection '{name}' was requested without a catalog source.\n\nPass --source <clone-url>[@<ref>] to choose the catalog explicitly.")]
    SourceRequired { name: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
}

impl BerthError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BerthError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_manifest(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BerthError::InvalidManifest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable discriminant for this fault
    pub fn kind(&self) -> ErrorKind {
        match self {
            BerthError::InvalidSourceFormat { .. } => ErrorKind::InvalidSourceFormat,
            BerthError::MalformedVersion { .. } => ErrorKind::MalformedVersion,
            BerthError::MissingSharedAssets { .. } => ErrorKind::MissingSharedAssets,
            BerthError::NoCollectionsFound { .. } => ErrorKind::NoCollectionsFound,
            BerthError::DuplicateCollectionName { .. } => ErrorKind::DuplicateCollectionName,
            BerthError::InvalidManifest { .. } => ErrorKind::InvalidManifest,
            BerthError::CollectionAssetConflict { .. } => ErrorKind::CollectionAssetConflict,
            BerthError::IncompleteCollection { .. } => ErrorKind::IncompleteCollection,
            BerthError::IncompatibleCollection { .. } => ErrorKind::IncompatibleCollection,
            BerthError::Template(rejected) => rejected.primary_kind(),
            BerthError::CollectionNotFound { .. } => ErrorKind::CollectionNotFound,
            BerthError::SourceRequired { .. } => ErrorKind::SourceRequired,
            BerthError::Fetch(err) => err.kind(),
            BerthError::Io { .. } => ErrorKind::Io,
            BerthError::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// True for faults that disqualify a single collection but leave the rest
    /// of the catalog usable.
    pub fn is_collection_fault(&self) -> bool {
        self.kind().scope() == ErrorScope::Collection
    }
}

/// Fault discriminant, one per taxonomy entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSourceFormat,
    MalformedVersion,
    MissingSharedAssets,
    NoCollectionsFound,
    DuplicateCollectionName,
    InvalidManifest,
    CollectionAssetConflict,
    IncompleteCollection,
    IncompatibleCollection,
    ObsoleteFormat,
    UnsupportedFormat,
    MissingBaseKeys,
    InvalidConstrainedValue,
    AuthMethodInconsistent,
    CollectionNotFound,
    SourceRequired,
    FetchTimeout,
    AuthFailure,
    NetworkFailure,
    RefNotFound,
    Io,
    Parse,
}

/// Where a fault stops the current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// User input that needs correcting before anything can run
    Input,
    /// Structural fault that aborts the whole catalog
    Catalog,
    /// Disqualifies one collection; skipped or reported by caller policy
    Collection,
    Template,
    Resolver,
    Transport,
    Io,
}

impl ErrorKind {
    pub fn scope(self) -> ErrorScope {
        match self {
            ErrorKind::InvalidSourceFormat | ErrorKind::MalformedVersion => ErrorScope::Input,
            ErrorKind::MissingSharedAssets
            | ErrorKind::NoCollectionsFound
            | ErrorKind::DuplicateCollectionName => ErrorScope::Catalog,
            ErrorKind::InvalidManifest
            | ErrorKind::CollectionAssetConflict
            | ErrorKind::IncompleteCollection
            | ErrorKind::IncompatibleCollection => ErrorScope::Collection,
            ErrorKind::ObsoleteFormat
            | ErrorKind::UnsupportedFormat
            | ErrorKind::MissingBaseKeys
            | ErrorKind::InvalidConstrainedValue
            | ErrorKind::AuthMethodInconsistent => ErrorScope::Template,
            ErrorKind::CollectionNotFound | ErrorKind::SourceRequired => ErrorScope::Resolver,
            ErrorKind::FetchTimeout
            | ErrorKind::AuthFailure
            | ErrorKind::NetworkFailure
            | ErrorKind::RefNotFound => ErrorScope::Transport,
            ErrorKind::Io | ErrorKind::Parse => ErrorScope::Io,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_faults_are_skippable() {
        let err = BerthError::invalid_manifest("collections/x/collection.yaml", "bad name");
        assert!(err.is_collection_fault());

        let err = BerthError::MissingSharedAssets {
            location: PathBuf::from("shared"),
            missing: vec!["postcreate.sh".to_string()],
        };
        assert!(!err.is_collection_fault());
        assert_eq!(err.kind().scope(), ErrorScope::Catalog);
    }

    #[test]
    fn test_kind_display_names_the_fault() {
        assert_eq!(ErrorKind::CollectionNotFound.to_string(), "CollectionNotFound");
    }

    #[test]
    fn test_not_found_message_suggests_listing() {
        let err = BerthError::CollectionNotFound {
            name: "smarsh-java-backend".to_string(),
            descriptor: "git@github.com:org/catalog.git".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("smarsh-java-backend"));
        assert!(msg.contains("berth catalog list"));
    }
}
