//! Binary feature cache
//!
//! This module persists the parsed attributes of every installed feature,
//! the last resolved/configured feature sets and known-bad manifest files, so
//! a restart can skip re-parsing unchanged manifests.

mod codec;
mod file;

pub use codec::{
    cache_version, decode, encode, BadFileEntry, CacheContents, CachedFeature, CACHE_VERSION,
    CACHE_VERSION_PLATFORMS,
};
pub use file::CacheFile;
