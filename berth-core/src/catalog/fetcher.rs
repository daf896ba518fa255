//! Obtaining a local working copy of a catalog
//!
//! The engine only ever sees [`CatalogFetcher`]; why a fetch failed is
//! reported through the four-way [`FetchError`] taxonomy and passed through
//! unchanged. There are no retries here.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use super::CatalogSource;
use crate::error::ErrorKind;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Directory name the catalog is cloned into inside the working directory
const CHECKOUT_DIR: &str = "catalog";

/// Transport faults
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Authentication failed while fetching {target}: {detail}\n\nCheck your git credentials (SSH agent or credential helper) for this host.")]
    AuthFailure { target: String, detail: String },

    #[error("Could not fetch catalog from {target}: {detail}")]
    NetworkFailure { target: String, detail: String },

    #[error("Ref '{reference}' not found in {target}: {detail}")]
    RefNotFound {
        target: String,
        reference: String,
        detail: String,
    },

    #[error("Fetching {target} timed out after {}s", timeout.as_secs())]
    FetchTimeout { target: String, timeout: Duration },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::AuthFailure { .. } => ErrorKind::AuthFailure,
            FetchError::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            FetchError::RefNotFound { .. } => ErrorKind::RefNotFound,
            FetchError::FetchTimeout { .. } => ErrorKind::FetchTimeout,
        }
    }
}

/// Produces a local copy of a catalog source
pub trait CatalogFetcher {
    /// Fetch `source` into (or resolve it relative to) `workdir`.
    ///
    /// `workdir` is a fresh directory owned by the caller. Returns the
    /// catalog root.
    fn fetch(
        &self,
        source: &CatalogSource,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, FetchError>;
}

/// Shallow `git clone` with a hard deadline
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: OsString,
    base_args: Vec<OsString>,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            program: OsString::from("git"),
            base_args: Vec::new(),
        }
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git binary
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    fn command(&self, source: &CatalogSource, dest: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(["clone", "--depth", "1", "--quiet"]);
        if let Some(reference) = source.reference() {
            cmd.arg("--branch").arg(reference);
        }
        cmd.arg("--")
            .arg(source.clone_target())
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl CatalogFetcher for GitFetcher {
    fn fetch(
        &self,
        source: &CatalogSource,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, FetchError> {
        let target = source.clone_target().to_string();
        let dest = workdir.join(CHECKOUT_DIR);

        info!(
            "Cloning {} (ref: {})",
            target,
            source.reference().unwrap_or("default branch")
        );

        let mut child =
            self.command(source, &dest)
                .spawn()
                .map_err(|e| FetchError::NetworkFailure {
                    target: target.clone(),
                    detail: format!("failed to start git: {e}"),
                })?;

        // git blocks once the pipe buffer fills, so stderr is drained while
        // the clone runs rather than after it exits
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut stderr = String::new();
                let _ = pipe.read_to_string(&mut stderr);
                stderr
            })
        });

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let stderr = stderr_reader
                        .and_then(|reader| reader.join().ok())
                        .unwrap_or_default();
                    if status.success() {
                        debug!("Clone complete: {}", dest.display());
                        return Ok(dest);
                    }
                    return Err(classify_failure(source, stderr.trim()));
                }
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FetchError::FetchTimeout { target, timeout });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(FetchError::NetworkFailure {
                        target,
                        detail: format!("failed waiting for git: {e}"),
                    });
                }
            }
        }
    }
}

/// Map git's stderr onto the transport taxonomy
fn classify_failure(source: &CatalogSource, stderr: &str) -> FetchError {
    let target = source.clone_target().to_string();
    let detail = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("git exited with an error")
        .trim()
        .to_string();
    let lower = stderr.to_lowercase();

    const REF_MARKERS: &[&str] = &[
        "remote branch",
        "not found in upstream",
        "couldn't find remote ref",
        "did not match any",
    ];
    const AUTH_MARKERS: &[&str] = &[
        "authentication failed",
        "permission denied",
        "could not read username",
        "could not read password",
        "terminal prompts disabled",
        "access denied",
        "host key verification failed",
    ];

    if let Some(reference) = source.reference() {
        if REF_MARKERS.iter().any(|m| lower.contains(m)) {
            return FetchError::RefNotFound {
                target,
                reference: reference.to_string(),
                detail,
            };
        }
    }

    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        return FetchError::AuthFailure { target, detail };
    }

    FetchError::NetworkFailure { target, detail }
}

/// Uses a catalog that already exists on disk, in place
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    /// Filesystem path named by a clone target, if it is a local one
    pub fn local_path(clone_target: &str) -> PathBuf {
        PathBuf::from(
            clone_target
                .strip_prefix("file://")
                .unwrap_or(clone_target),
        )
    }
}

impl CatalogFetcher for LocalFetcher {
    fn fetch(
        &self,
        source: &CatalogSource,
        _workdir: &Path,
        _timeout: Duration,
    ) -> Result<PathBuf, FetchError> {
        let path = Self::local_path(source.clone_target());

        if !path.is_dir() {
            return Err(FetchError::NetworkFailure {
                target: source.clone_target().to_string(),
                detail: "no such directory".to_string(),
            });
        }

        if let Some(reference) = source.reference() {
            return Err(FetchError::RefNotFound {
                target: source.clone_target().to_string(),
                reference: reference.to_string(),
                detail: "refs are not supported for local directory catalogs".to_string(),
            });
        }

        debug!("Using local catalog at {}", path.display());
        Ok(path)
    }
}

/// Local directories in place, everything else through git
#[derive(Debug, Clone, Default)]
pub struct AutoFetcher {
    git: GitFetcher,
}

impl AutoFetcher {
    pub fn new(git: GitFetcher) -> Self {
        Self { git }
    }
}

impl CatalogFetcher for AutoFetcher {
    fn fetch(
        &self,
        source: &CatalogSource,
        workdir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, FetchError> {
        if LocalFetcher::local_path(source.clone_target()).is_dir() {
            LocalFetcher.fetch(source, workdir, timeout)
        } else {
            self.git.fetch(source, workdir, timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(d: &str) -> CatalogSource {
        CatalogSource::parse(d).unwrap()
    }

    #[test]
    fn test_classify_missing_ref() {
        let err = classify_failure(
            &source("https://github.com/org/catalog.git@v9"),
            "warning: Could not find remote branch v9 to clone.\nfatal: Remote branch v9 not found in upstream origin",
        );
        assert_eq!(err.kind(), ErrorKind::RefNotFound);
        assert!(err.to_string().contains("v9"));
    }

    #[test]
    fn test_classify_auth() {
        let err = classify_failure(
            &source("git@github.com:org/private.git"),
            "git@github.com: Permission denied (publickey).\nfatal: Could not read from remote repository.",
        );
        assert_eq!(err.kind(), ErrorKind::AuthFailure);
    }

    #[test]
    fn test_classify_network() {
        let err = classify_failure(
            &source("https://nowhere.invalid/org/catalog.git"),
            "fatal: unable to access 'https://nowhere.invalid/org/catalog.git/': Could not resolve host: nowhere.invalid",
        );
        assert_eq!(err.kind(), ErrorKind::NetworkFailure);
        assert!(err.to_string().contains("Could not resolve host"));
    }

    #[test]
    fn test_local_fetcher_uses_directory_in_place() {
        let catalog = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let src = source(&catalog.path().display().to_string());

        let root = LocalFetcher
            .fetch(&src, work.path(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(root, catalog.path());
    }

    #[test]
    fn test_local_fetcher_rejects_refs() {
        let catalog = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let src = source(&format!("{}@main", catalog.path().display()));

        let err = LocalFetcher
            .fetch(&src, work.path(), Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RefNotFound);
    }

    #[test]
    fn test_missing_git_binary_is_network_failure() {
        let work = TempDir::new().unwrap();
        let fetcher = GitFetcher::with_program("/nonexistent/bin/git-does-not-exist");
        let err = fetcher
            .fetch(
                &source("https://example.com/org/catalog.git"),
                work.path(),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkFailure);
    }

    #[cfg(unix)]
    fn scripted(script: &str) -> GitFetcher {
        GitFetcher {
            program: OsString::from("sh"),
            base_args: vec!["-c".into(), script.into(), "git".into()],
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_clone_times_out() {
        let work = TempDir::new().unwrap();
        let err = scripted("sleep 5")
            .fetch(
                &source("https://example.com/org/catalog.git"),
                work.path(),
                Duration::from_millis(200),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FetchTimeout);
    }

    #[cfg(unix)]
    #[test]
    fn test_clone_stderr_is_classified() {
        let work = TempDir::new().unwrap();
        let err = scripted("echo 'fatal: Remote branch nope not found in upstream origin' >&2; exit 128")
            .fetch(
                &source("https://example.com/org/catalog.git@nope"),
                work.path(),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RefNotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_verbose_stderr_does_not_stall_the_clone() {
        let work = TempDir::new().unwrap();
        // About 200KB of progress noise, well past a pipe buffer
        let script = "i=0; while [ $i -lt 4000 ]; do \
             echo 'remote: Counting objects: 100% (4000/4000), done. padding padding' >&2; \
             i=$((i+1)); done; \
             echo 'fatal: Authentication failed for the catalog host' >&2; exit 128";
        let err = scripted(script)
            .fetch(
                &source("https://github.com/org/catalog.git"),
                work.path(),
                Duration::from_secs(20),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailure);
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_clone_returns_checkout_dir() {
        let work = TempDir::new().unwrap();
        let root = scripted("exit 0")
            .fetch(
                &source("https://example.com/org/catalog.git"),
                work.path(),
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(root, work.path().join(CHECKOUT_DIR));
    }
}
