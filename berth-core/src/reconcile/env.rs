//! Project environment files
//!
//! A project's environment lives in dotenv files under `.devcontainer/`.
//! Reconciliation only needs to know which keys are present (and, for
//! conditional requirements, their values), so the file layout stays behind
//! [`PersistedEnvState`].

use anyhow::{Context, Result as AnyResult};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BerthError, Result};
use crate::project::DEVCONTAINER_DIR;

/// Env files read, in precedence order; the first is where new keys go
pub const ENV_FILES: [&str; 2] = [".env", "devcontainer.env"];

/// The project's current environment, however it is stored
pub trait PersistedEnvState {
    fn value(&self, key: &str) -> Option<&str>;

    fn all_keys(&self) -> BTreeSet<String>;

    fn contains_key(&self, key: &str) -> bool {
        self.value(key).is_some()
    }
}

impl PersistedEnvState for BTreeMap<String, String> {
    fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }

    fn all_keys(&self) -> BTreeSet<String> {
        self.keys().cloned().collect()
    }
}

/// Union of a project's env files
#[derive(Debug, Clone)]
pub struct EnvFileSet {
    primary: PathBuf,
    sources: Vec<PathBuf>,
    values: BTreeMap<String, String>,
}

impl EnvFileSet {
    /// Read every env file of the project rooted at `project_dir`
    ///
    /// Missing files contribute nothing. When a key appears in several files
    /// the first occurrence wins.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let dir = project_dir.join(DEVCONTAINER_DIR);
        let mut values = BTreeMap::new();
        let mut sources = Vec::new();

        for name in ENV_FILES {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| BerthError::io(&path, e))?;
            let entries = parse_dotenv(&content);
            debug!("Read {} keys from {}", entries.len(), path.display());
            for (key, value) in entries {
                values.entry(key).or_insert(value);
            }
            sources.push(path);
        }

        Ok(Self {
            primary: dir.join(ENV_FILES[0]),
            sources,
            values,
        })
    }

    /// File that [`Self::append_missing`] writes to
    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    /// Env files that existed when loaded
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Append `entries` whose keys are not yet present to the primary file
    ///
    /// Returns the number of keys written. Existing keys are never touched.
    pub fn append_missing(&mut self, entries: &BTreeMap<String, String>) -> AnyResult<usize> {
        let pending: Vec<(&String, &String)> = entries
            .iter()
            .filter(|(key, _)| !self.values.contains_key(*key))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.primary.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let needs_newline = std::fs::read(&self.primary)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.primary)
            .with_context(|| format!("Failed to open {}", self.primary.display()))?;

        let mut block = String::new();
        if needs_newline {
            block.push('\n');
        }
        for (key, value) in &pending {
            block.push_str(&format!("{key}={}\n", quote_value(value)));
        }
        file.write_all(block.as_bytes())
            .with_context(|| format!("Failed to write {}", self.primary.display()))?;

        for (key, value) in &pending {
            self.values.insert((*key).clone(), (*value).clone());
        }
        if !self.sources.contains(&self.primary) {
            self.sources.insert(0, self.primary.clone());
        }

        Ok(pending.len())
    }
}

impl PersistedEnvState for EnvFileSet {
    fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn all_keys(&self) -> BTreeSet<String> {
        self.values.keys().cloned().collect()
    }
}

/// Parse dotenv content into `(key, value)` pairs in file order
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if !is_valid_key(key) {
        return None;
    }

    Some((key.to_string(), unquote(raw.trim())))
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(raw: &str) -> String {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        return out;
    }

    if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        return inner.to_string();
    }

    // Unquoted values end at an inline comment
    match raw.find(" #") {
        Some(idx) => raw[..idx].trim_end().to_string(),
        None => raw.to_string(),
    }
}

fn quote_value(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '#' | '"' | '\'' | '\\' | '$' | '`'));
    if plain {
        return value.to_string();
    }

    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}
