//! Command implementations
//!
//! Every command builds a [`RepositoryConfig`] from the global options, runs
//! one provisioning pass over the install and disposes the repository, which
//! stores the cache when anything changed.

pub mod cache;
pub mod list;
pub mod resolved;
pub mod show;

use anyhow::{bail, Context, Result};
use featurekit_core::config::RepositoryConfig;
use featurekit_core::repository::FeatureRepository;
use std::path::PathBuf;
use tracing::debug;

/// Repository selection shared by all subcommands
#[derive(Debug, Clone, Default)]
pub struct RepositoryOptions {
    pub config: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub usr_root: Option<PathBuf>,
    pub cache_file: Option<PathBuf>,
    pub platform_support: bool,
}

impl RepositoryOptions {
    /// Configuration file first, then flags layered on top
    pub fn build_config(&self) -> Result<RepositoryConfig> {
        let mut config = match (&self.config, &self.install_root) {
            (Some(path), _) => RepositoryConfig::load(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            (None, Some(root)) => RepositoryConfig::new(root),
            (None, None) => bail!("either --config or --install-root is required"),
        };

        if let (Some(_), Some(root)) = (&self.config, &self.install_root) {
            config.install_root = root.clone();
        }
        if let Some(usr_root) = &self.usr_root {
            config.extensions.retain(|e| e.repo_type != "usr");
            config = config.with_extension("usr", usr_root);
        }
        if let Some(cache_file) = &self.cache_file {
            config = config.with_cache_file(cache_file);
        }
        if self.platform_support {
            config.platform_support = true;
        }
        debug!(?config, "Effective repository configuration");
        Ok(config)
    }

    /// Build the configuration and run one `init` pass
    pub fn open(&self) -> Result<FeatureRepository> {
        let mut repository = FeatureRepository::new(self.build_config()?);
        repository.init();
        Ok(repository)
    }
}
