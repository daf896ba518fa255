//! Catalog source descriptors (`<clone-url>[@<ref>]`)
//!
//! Clone URLs may carry their own `@` as an SSH user prefix
//! (`git@github.com:org/catalog.git`), so the ref delimiter is found by
//! position rather than by a plain split:
//!
//! 1. `...repo.git@<ref>`: split after the last `.git@`.
//! 2. `...repo.git`: the whole descriptor is the clone target.
//! 3. Anything else: split at the last `@` in the path portion, so a
//!    user prefix in front of the host is never taken for a ref.

use std::fmt;
use std::str::FromStr;

use crate::error::{BerthError, Result};

const GIT_SUFFIX: &str = ".git";

/// A parsed catalog source: where to clone from and which ref to check out
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogSource {
    clone_target: String,
    reference: Option<String>,
}

impl CatalogSource {
    /// Parse a descriptor string
    pub fn parse(descriptor: &str) -> Result<Self> {
        let d = descriptor.trim();

        if d.is_empty() {
            return Err(invalid(descriptor, "descriptor is empty"));
        }

        if d.chars().any(char::is_whitespace) {
            return Err(invalid(descriptor, "descriptor contains whitespace"));
        }

        let (clone_target, reference) = if let Some(idx) = d.rfind(".git@") {
            let split_at = idx + GIT_SUFFIX.len();
            (&d[..split_at], Some(&d[split_at + 1..]))
        } else if d.ends_with(GIT_SUFFIX) {
            (d, None)
        } else {
            let path_start = path_start(d);
            match d[path_start..].rfind('@').map(|i| i + path_start) {
                Some(at) => (&d[..at], Some(&d[at + 1..])),
                None => (d, None),
            }
        };

        if let Some(reference) = reference {
            if reference.is_empty() {
                return Err(invalid(descriptor, "ref after '@' is empty"));
            }
        }

        validate_clone_target(descriptor, clone_target)?;

        Ok(Self {
            clone_target: clone_target.to_string(),
            reference: reference.map(str::to_string),
        })
    }

    /// What to hand to the fetcher
    pub fn clone_target(&self) -> &str {
        &self.clone_target
    }

    /// Branch or tag; `None` means the remote's default branch
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Render back to descriptor form
    pub fn descriptor(&self) -> String {
        match &self.reference {
            Some(r) => format!("{}@{}", self.clone_target, r),
            None => self.clone_target.clone(),
        }
    }
}

impl FromStr for CatalogSource {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// Byte offset where the repository path begins.
///
/// Everything before it (scheme, user prefix, host) may legitimately
/// contain `@` and is never searched for a ref delimiter.
fn path_start(d: &str) -> usize {
    if let Some(scheme_end) = d.find("://") {
        let authority = scheme_end + 3;
        return d[authority..]
            .find('/')
            .map(|i| i + authority)
            .unwrap_or(d.len());
    }

    match ssh_user_prefix(d) {
        Some(at) => d[at..].find(':').map(|i| i + at + 1).unwrap_or(d.len()),
        None => 0,
    }
}

/// Position of the `@` in an scp-style `user@host:path` prefix
fn ssh_user_prefix(d: &str) -> Option<usize> {
    if d.contains("://") {
        return None;
    }
    let at = d.find('@')?;
    let user = &d[..at];
    if user.is_empty() || user.contains(['/', ':', '\\']) {
        return None;
    }
    Some(at)
}

fn validate_clone_target(descriptor: &str, target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(invalid(descriptor, "clone target is empty"));
    }

    if let Some(at) = ssh_user_prefix(target) {
        let rest = &target[at + 1..];
        let Some(colon) = rest.find(':') else {
            return Err(invalid(descriptor, "SSH source has no repository path"));
        };
        if colon == 0 {
            return Err(invalid(descriptor, "SSH source has no host"));
        }
        if rest[colon + 1..].is_empty() {
            return Err(invalid(descriptor, "SSH source has no repository path"));
        }
    }

    if let Some(scheme_end) = target.find("://") {
        if scheme_end == 0 || target[scheme_end + 3..].is_empty() {
            return Err(invalid(descriptor, "URL has no host"));
        }
    }

    Ok(())
}

fn invalid(descriptor: &str, reason: &str) -> BerthError {
    BerthError::InvalidSourceFormat {
        descriptor: descriptor.to_string(),
        reason: reason.to_string(),
    }
}
