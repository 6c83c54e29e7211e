//! Error types and handling
//!
//! This module provides domain-specific error types for the feature repository.
//! The error taxonomy is structured with specific error enums for each domain
//! (Manifest, Filter, Cache, Repository, Config) that are then wrapped in the main
//! FeatureKitError enum for unified error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest-related errors
///
/// Every variant except `Io` marks the manifest as invalid: the feature it
/// describes is never installed.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("Failed to read feature manifest {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Subsystem-SymbolicName header missing or empty
    #[error("Feature manifest {path} has no symbolic name")]
    MissingSymbolicName { path: String },

    /// IBM-Feature-Version outside the supported range
    #[error("Feature manifest {path} declares unsupported feature version {version}")]
    UnsupportedFeatureVersion { path: String, version: i32 },

    /// Subsystem-Type header missing or not a feature subsystem
    #[error("Feature manifest {path} has invalid subsystem type: {found}")]
    InvalidSubsystemType { path: String, found: String },

    /// Subsystem-Version header missing
    #[error("Feature manifest {path} has no version")]
    MissingVersion { path: String },

    /// Version string could not be parsed
    #[error("Invalid version: {value}")]
    InvalidVersion { value: String },
}

/// Capability filter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Filter expression could not be parsed
    #[error("Invalid filter {filter} at position {position}: {message}")]
    Parse {
        filter: String,
        position: usize,
        message: String,
    },
}

/// Binary cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache file I/O error
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),

    /// Cache was written with a different format version
    #[error("Cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: i32, found: i32 },

    /// String exceeds the short-string encoding limit
    #[error("String of {len} bytes exceeds the short string limit")]
    StringTooLong { len: usize },

    /// Stored enum value is unknown
    #[error("Unknown {kind} value in cache: {value}")]
    InvalidEnum { kind: &'static str, value: String },
}

/// Repository-related errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Operation is only valid while a provisioning pass is active
    #[error("Auto features are only available during an active provisioning operation")]
    NotProvisioning,

    /// Two different manifests declare the same symbolic name
    #[error("Feature {symbolic_name} from {rejected} collides with the one already installed from {incumbent}")]
    Collision {
        symbolic_name: String,
        incumbent: String,
        rejected: String,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file does not exist
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum FeatureKitError {
    /// Manifest-related errors
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Filter-related errors
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Cache-related errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Repository-related errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience type alias for Results with FeatureKitError
pub type Result<T> = std::result::Result<T, FeatureKitError>;
