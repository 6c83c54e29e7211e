//! Shared test helpers for core integration tests.

use featurekit_core::config::RepositoryConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway install: core repository, `usr` extension and cache file
pub struct Install {
    pub dir: TempDir,
}

impl Install {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("wlp")
    }

    pub fn usr_root(&self) -> PathBuf {
        self.dir.path().join("wlp/usr/extension")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.dir.path().join("state/feature.cache")
    }

    pub fn config(&self) -> RepositoryConfig {
        RepositoryConfig::new(self.root())
            .with_extension("usr", self.usr_root())
            .with_cache_file(self.cache_file())
    }

    pub fn write_core(&self, file: &str, body: &str) -> PathBuf {
        write_manifest(&self.root().join("lib/features"), file, body)
    }

    pub fn write_usr(&self, file: &str, body: &str) -> PathBuf {
        write_manifest(&self.usr_root().join("lib/features"), file, body)
    }

    pub fn write_kernel(&self, file: &str, body: &str) -> PathBuf {
        write_manifest(&self.root().join("lib/platform"), file, body)
    }
}

fn write_manifest(dir: &Path, file: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("Failed to create features directory");
    let path = dir.join(file);
    fs::write(&path, body).expect("Failed to write manifest");
    path
}

/// Manifest text for a feature
pub fn manifest(symbolic_name: &str, visibility: &str, version: &str, extra: &str) -> String {
    format!(
        "Manifest-Version: 1.0\n\
         Subsystem-SymbolicName: {symbolic_name}; visibility:={visibility}\n\
         Subsystem-Type: osgi.subsystem.feature\n\
         Subsystem-Version: {version}\n\
         {extra}"
    )
}

/// Public feature with a short name
pub fn public_feature(symbolic_name: &str, short_name: &str) -> String {
    manifest(
        symbolic_name,
        "public",
        "1.0.0",
        &format!("IBM-ShortName: {short_name}\n"),
    )
}
