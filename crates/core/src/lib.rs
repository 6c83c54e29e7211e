//! Core library for the feature repository
//!
//! This crate discovers feature manifests, caches their parsed attributes in a
//! binary cache, indexes them for lookup by a feature resolver, tracks the last
//! resolved feature sets and publishes resolved features to a service registry.

pub mod attributes;
pub mod cache;
pub mod config;
pub mod definition;
pub mod errors;
pub mod kernel;
pub mod logging;
pub mod manifest;
pub mod publication;
pub mod repository;
pub mod resource;
pub mod version;

pub use definition::{DetailsHandle, FeatureDefinition};
pub use repository::{FeatureRepository, Repository};

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
