//! Repository configuration
//!
//! A [`RepositoryConfig`] names the bundle repositories to scan, the cache file
//! location and runtime properties. It is built in code or loaded from TOML:
//!
//! ```toml
//! install_root = "wlp"
//! cache_file = "wlp/usr/servers/.cache/feature.cache"
//! platform_support = true
//!
//! [[extensions]]
//! repo_type = "usr"
//! root = "wlp/usr/extension"
//!
//! [properties]
//! "tolerates.com.example.servlet" = "4.0, 5.0"
//! ```
//!
//! Relative paths in a file resolve against the directory holding the file.

use crate::attributes::ProcessType;
use crate::errors::{ConfigError, FeatureKitError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Directory under a bundle repository root holding feature manifests
pub const FEATURES_DIR: &str = "lib/features";
/// Directory under the install root holding kernel feature manifests
pub const KERNEL_DIR: &str = "lib/platform";

/// An additional bundle repository, e.g. the `usr` extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRepositoryConfig {
    pub repo_type: String,
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Core bundle repository root (repository type `""`)
    pub install_root: PathBuf,
    #[serde(default)]
    pub extensions: Vec<BundleRepositoryConfig>,
    /// `None` disables caching
    #[serde(default)]
    pub cache_file: Option<PathBuf>,
    /// Selects cache version 4 and platform comparisons
    #[serde(default)]
    pub platform_support: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub process_type: ProcessType,
}

impl RepositoryConfig {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            extensions: Vec::new(),
            cache_file: None,
            platform_support: false,
            properties: BTreeMap::new(),
            process_type: ProcessType::default(),
        }
    }

    pub fn with_extension(mut self, repo_type: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.extensions.push(BundleRepositoryConfig {
            repo_type: repo_type.into(),
            root: root.into(),
        });
        self
    }

    pub fn with_cache_file(mut self, cache_file: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(cache_file.into());
        self
    }

    pub fn with_platform_support(mut self, enabled: bool) -> Self {
        self.platform_support = enabled;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Load a TOML configuration file
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FeatureKitError::Config(ConfigError::NotFound {
                path: path.display().to_string(),
            }));
        }
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut config = Self::parse(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        debug!(install_root = %config.install_root.display(), "Loaded repository configuration");
        Ok(config)
    }

    /// Parse TOML text without resolving relative paths
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            FeatureKitError::Config(ConfigError::Parsing {
                message: e.to_string(),
            })
        })
    }

    fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.install_root);
        for extension in &mut self.extensions {
            resolve(&mut extension.root);
        }
        if let Some(cache_file) = &mut self.cache_file {
            resolve(cache_file);
        }
    }

    /// `(repo_type, features dir)` for the core repository then each extension
    pub fn feature_directories(&self) -> Vec<(String, PathBuf)> {
        std::iter::once((String::new(), self.install_root.join(FEATURES_DIR)))
            .chain(
                self.extensions
                    .iter()
                    .map(|e| (e.repo_type.clone(), e.root.join(FEATURES_DIR))),
            )
            .collect()
    }

    pub fn kernel_directory(&self) -> PathBuf {
        self.install_root.join(KERNEL_DIR)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
