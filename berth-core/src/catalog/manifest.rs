//! Collection manifest parsing and validation (collection.yaml)
//!
//! A manifest names and describes one selectable collection. Validation
//! stops at the first failing rule:
//!
//! 1. `name` matches `^[a-z][a-z0-9-]*[a-z0-9]$`
//! 2. `description` is present and non-empty
//! 3. every tag is lowercase and dash-separated
//! 4. `minRequiredVersion`, if set, is a valid version
//! 5. the collection's `postCreateCommand` runs the shared postcreate script

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BerthError, Result};
use crate::version::Version;

/// Manifest file name inside a collection directory
pub const MANIFEST_FILE: &str = "collection.yaml";

/// Configuration file every complete collection carries
pub const CONFIG_FILE: &str = "devcontainer.json";

/// What a collection's startup invocation must reference
pub const POSTCREATE_REFERENCE: &str = "shared/postcreate.sh";

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*[a-z0-9]$").expect("valid name pattern"));

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid tag pattern"));

/// Raw manifest document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionManifest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub maintainer: Option<String>,

    /// Oldest berth release that can materialize this collection
    #[serde(default, alias = "min_required_version")]
    pub min_required_version: Option<String>,
}

/// A validated, discovered collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionEntry {
    pub name: String,
    pub description: String,
    /// Declaration order, duplicates removed
    pub tags: Vec<String>,
    pub maintainer: Option<String>,
    pub min_required_version: Option<Version>,
    pub has_config_file: bool,
    /// Collection directory, relative to the catalog root
    pub relative_path: PathBuf,
}

impl CollectionManifest {
    /// Load manifest from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BerthError::invalid_manifest(path, format!("unreadable: {e}")))?;

        Self::from_yaml(&content).map_err(|reason| BerthError::invalid_manifest(path, reason))
    }

    /// Parse manifest from YAML string
    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        serde_yaml_ng::from_str(content).map_err(|e| format!("invalid YAML: {e}"))
    }

    /// Rule 1: the name is well-formed
    pub fn check_name(&self) -> std::result::Result<(), String> {
        if self.name.len() < 2 || !NAME_PATTERN.is_match(&self.name) {
            return Err(format!(
                "name '{}' must be at least 2 characters, start with a lowercase letter, \
                 and contain only lowercase letters, digits and hyphens (not ending in a hyphen)",
                self.name
            ));
        }
        Ok(())
    }

    /// Check rules 1-4, returning the first violation
    pub fn check_fields(&self) -> std::result::Result<(), String> {
        self.check_name()?;

        match &self.description {
            Some(d) if !d.trim().is_empty() => {}
            _ => return Err("description is required".to_string()),
        }

        for tag in self.tags.iter().flatten() {
            if !TAG_PATTERN.is_match(tag) {
                return Err(format!(
                    "tag '{tag}' must be lowercase words separated by single dashes"
                ));
            }
        }

        if let Some(min) = &self.min_required_version {
            Version::parse(min).map_err(|e| format!("minRequiredVersion: {e}"))?;
        }

        Ok(())
    }
}

/// Name the manifest at `manifest_path` claims, when it parses and the name
/// is well-formed, regardless of its other fields or wiring
pub fn declared_name(manifest_path: &Path) -> Option<String> {
    let manifest = CollectionManifest::from_file(manifest_path).ok()?;
    manifest.check_name().ok()?;
    Some(manifest.name)
}

/// Validate the manifest at `manifest_path` and build its entry
///
/// `catalog_root` is only used to compute the entry's relative path.
pub fn validate_entry(catalog_root: &Path, manifest_path: &Path) -> Result<CollectionEntry> {
    let manifest = CollectionManifest::from_file(manifest_path)?;
    manifest
        .check_fields()
        .map_err(|reason| BerthError::invalid_manifest(manifest_path, reason))?;

    let dir = manifest_path.parent().unwrap_or(Path::new("."));
    let config_path = dir.join(CONFIG_FILE);
    let has_config_file = config_path.is_file();

    if has_config_file {
        check_postcreate_wiring(&config_path)
            .map_err(|reason| BerthError::invalid_manifest(manifest_path, reason))?;
    }

    let min_required_version = manifest
        .min_required_version
        .as_deref()
        .map(Version::parse)
        .transpose()?;

    let mut tags: Vec<String> = Vec::new();
    for tag in manifest.tags.unwrap_or_default() {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let relative_path = dir
        .strip_prefix(catalog_root)
        .unwrap_or(dir)
        .to_path_buf();

    Ok(CollectionEntry {
        name: manifest.name,
        description: manifest
            .description
            .map(|d| d.trim().to_string())
            .unwrap_or_default(),
        tags,
        maintainer: manifest.maintainer,
        min_required_version,
        has_config_file,
        relative_path,
    })
}

/// Rule 5: the declared startup invocation must run the shared postcreate script
fn check_postcreate_wiring(config_path: &Path) -> std::result::Result<(), String> {
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| format!("{CONFIG_FILE} unreadable: {e}"))?;
    let config: serde_json::Value = serde_json::from_str(&strip_jsonc_comments(&raw))
        .map_err(|e| format!("{CONFIG_FILE} is not valid JSON: {e}"))?;

    let invocation = config
        .get("postCreateCommand")
        .map(invocation_text)
        .unwrap_or_default();

    if invocation.trim().is_empty() {
        return Err(format!(
            "{CONFIG_FILE} declares no postCreateCommand; it must run {POSTCREATE_REFERENCE}"
        ));
    }

    if !invocation.contains(POSTCREATE_REFERENCE) {
        return Err(format!(
            "postCreateCommand '{invocation}' does not run {POSTCREATE_REFERENCE}"
        ));
    }

    Ok(())
}

/// Flatten the string, array and object forms of a lifecycle command
fn invocation_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(invocation_text)
            .collect::<Vec<_>>()
            .join(" "),
        serde_json::Value::Object(map) => map
            .values()
            .map(invocation_text)
            .collect::<Vec<_>>()
            .join(" && "),
        _ => String::new(),
    }
}

/// Remove `//` and `/* */` comments outside of string literals
fn strip_jsonc_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => out.push(c),
        }
    }

    out
}
