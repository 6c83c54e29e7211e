//! Feature manifest access
//!
//! A feature is described by a manifest file (`lib/features/*.mf`). This
//! module reads the main section, parses header clauses and capability
//! filters, and exposes the lazily-evaluated [`ManifestDetails`] accessor.

pub mod details;
pub mod filter;
pub mod header;
pub mod raw;

pub use details::{CachedHeader, ManifestDetails};
pub use filter::Filter;
pub use header::{parse_header, split_list, HeaderClause};
pub use raw::RawManifest;

use std::path::{Path, PathBuf};

/// `*.mf` files directly inside `dir`, sorted by path
///
/// The extension match ignores case; a missing directory yields nothing.
pub fn manifest_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("mf"))
        })
        .collect();
    files.sort();
    files
}

/// Header names read from feature manifests
pub mod headers {
    pub const SYMBOLIC_NAME: &str = "Subsystem-SymbolicName";
    pub const SUBSYSTEM_TYPE: &str = "Subsystem-Type";
    pub const SUBSYSTEM_VERSION: &str = "Subsystem-Version";
    pub const SUBSYSTEM_CONTENT: &str = "Subsystem-Content";
    pub const SUBSYSTEM_CATEGORY: &str = "Subsystem-Category";
    pub const SHORT_NAME: &str = "IBM-ShortName";
    pub const FEATURE_VERSION: &str = "IBM-Feature-Version";
    pub const APP_FORCE_RESTART: &str = "IBM-App-ForceRestart";
    pub const PROCESS_TYPES: &str = "IBM-Process-Types";
    pub const PROVISION_CAPABILITY: &str = "IBM-Provision-Capability";
    pub const API_SERVICE: &str = "IBM-API-Service";
    pub const API_PACKAGE: &str = "IBM-API-Package";
    pub const SPI_PACKAGE: &str = "IBM-SPI-Package";
    pub const ACTIVATION_TYPE: &str = "WLP-Activation-Type";
    pub const DISABLE_ON_CONFLICT: &str = "WLP-DisableAllFeatures-OnConflict";
    pub const ALSO_KNOWN_AS: &str = "WLP-AlsoKnownAs";
    pub const PLATFORM: &str = "WLP-Platform";

    /// Subsystem-Type value identifying a feature manifest
    pub const FEATURE_SUBSYSTEM_TYPE: &str = "osgi.subsystem.feature";
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_files() {
        let dir = TempDir::new().unwrap();
        for name in ["b.mf", "a.MF", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.mf")).unwrap();

        let names: Vec<_> = manifest_files(dir.path())
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MF", "b.mf"]);
        assert!(manifest_files(&dir.path().join("missing")).is_empty());
    }
}
