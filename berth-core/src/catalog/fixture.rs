//! On-disk catalog builder shared by the crate's tests

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::{CONFIG_FILE, MANIFEST_FILE, SHARED_ASSETS, SHARED_DIR};

pub(crate) const WIRED_CONFIG: &str = r#"{
  "name": "fixture",
  "build": { "dockerfile": "Dockerfile" },
  "postCreateCommand": "bash .devcontainer/shared/postcreate.sh"
}"#;

pub(crate) struct CatalogFixture {
    dir: TempDir,
}

impl CatalogFixture {
    /// Catalog with all shared assets and no collections
    pub fn new() -> Self {
        let fixture = Self::without_shared();
        for asset in SHARED_ASSETS {
            fixture.write(
                &format!("{SHARED_DIR}/{asset}"),
                &format!("#!/usr/bin/env bash\n# {asset}\n"),
            );
        }
        fixture
    }

    pub fn without_shared() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn descriptor(&self) -> String {
        self.root().display().to_string()
    }

    /// A complete, correctly wired collection
    pub fn add_collection(&self, rel: &str, name: &str) -> PathBuf {
        self.add_manifest(
            rel,
            &format!("name: {name}\ndescription: The {name} environment\ntags: [fixture]\n"),
            Some(WIRED_CONFIG),
        );
        self.write(&format!("{rel}/Dockerfile"), "FROM debian:bookworm\n");
        self.root().join(rel)
    }

    pub fn add_manifest(&self, rel: &str, manifest: &str, config: Option<&str>) {
        self.write(&format!("{rel}/{MANIFEST_FILE}"), manifest);
        if let Some(config) = config {
            self.write(&format!("{rel}/{CONFIG_FILE}"), config);
        }
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.root().join(rel)).unwrap();
    }
}
