//! Kernel feature definitions
//!
//! Kernel features live under `<install root>/lib/platform`. They are read
//! once per [`KernelFeatures`] context and installed by the repository on
//! every initialization; they never enter the cache or the bad-file set.

use crate::config::KERNEL_DIR;
use crate::definition::FeatureDefinition;
use crate::manifest::manifest_files;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug)]
pub struct KernelFeatures {
    dir: PathBuf,
    definitions: OnceCell<Vec<Arc<FeatureDefinition>>>,
}

impl KernelFeatures {
    pub fn new(install_root: &Path) -> Self {
        Self {
            dir: install_root.join(KERNEL_DIR),
            definitions: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Kernel definitions, read on first call
    pub fn definitions(&self) -> &[Arc<FeatureDefinition>] {
        self.definitions.get_or_init(|| {
            let mut definitions = Vec::new();
            for path in manifest_files(&self.dir) {
                match FeatureDefinition::kernel_from_file(&path) {
                    Ok(definition) => {
                        debug!(feature = %definition, "Read kernel feature");
                        definitions.push(Arc::new(definition));
                    }
                    Err(e) => {
                        error!(error = %e, manifest = %path.display(), "Invalid kernel feature manifest")
                    }
                }
            }
            definitions
        })
    }
}
