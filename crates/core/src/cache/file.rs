//! Cache file with a sticky disable latch
//!
//! The first I/O failure while reading or writing disables the cache for the
//! lifetime of the [`CacheFile`]; later reads and writes become no-ops.

use super::codec::{self, CacheContents};
use crate::errors::CacheError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

#[derive(Debug)]
pub struct CacheFile {
    path: Option<PathBuf>,
    platform_support: bool,
    disabled: bool,
}

impl CacheFile {
    pub fn new(path: Option<PathBuf>, platform_support: bool) -> Self {
        Self {
            path,
            platform_support,
            disabled: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn version(&self) -> i32 {
        codec::cache_version(self.platform_support)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn disable(&mut self, error: &CacheError) {
        if !self.disabled {
            warn!(error = %error, path = ?self.path, "Feature cache disabled after I/O failure");
        }
        self.disabled = true;
    }

    pub fn is_readable(&self) -> bool {
        !self.disabled && self.path.as_ref().is_some_and(|p| p.is_file())
    }

    pub fn is_writable(&self) -> bool {
        if self.disabled {
            return false;
        }
        match &self.path {
            Some(path) => match fs::metadata(path) {
                Ok(metadata) => !metadata.permissions().readonly(),
                Err(_) => true,
            },
            None => false,
        }
    }

    /// Read and decode the cache; `None` when absent, stale, or unreadable
    #[instrument(level = "debug", skip(self), fields(path = ?self.path))]
    pub fn read(&mut self) -> Option<CacheContents> {
        if !self.is_readable() {
            return None;
        }
        let path = self.path.clone()?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.disable(&CacheError::Io(e));
                return None;
            }
        };
        match codec::decode(&bytes, self.platform_support) {
            Ok(contents) => {
                debug!(features = contents.features.len(), "Read feature cache");
                Some(contents)
            }
            Err(e @ CacheError::VersionMismatch { .. }) => {
                debug!(error = %e, "Ignoring feature cache written by another format version");
                None
            }
            Err(e @ CacheError::Io(_)) => {
                self.disable(&e);
                None
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable feature cache");
                None
            }
        }
    }

    /// Encode and write the cache; returns whether it was written
    #[instrument(level = "debug", skip_all, fields(path = ?self.path))]
    pub fn write(&mut self, contents: &CacheContents) -> bool {
        if !self.is_writable() {
            return false;
        }
        let Some(path) = self.path.clone() else {
            return false;
        };
        match Self::write_atomically(&path, contents, self.platform_support) {
            Ok(()) => {
                debug!(features = contents.features.len(), "Wrote feature cache");
                true
            }
            Err(e) => {
                self.disable(&e);
                false
            }
        }
    }

    fn write_atomically(
        path: &Path,
        contents: &CacheContents,
        platform_support: bool,
    ) -> Result<(), CacheError> {
        let bytes = codec::encode(contents, platform_support)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Delete the cache file, if any; returns whether a file was removed
    pub fn clear(&mut self) -> Result<bool, CacheError> {
        match &self.path {
            Some(path) if path.exists() => {
                fs::remove_file(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn contents() -> CacheContents {
        CacheContents {
            resolved: vec!["com.example.foo".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/feature.cache");
        let mut cache = CacheFile::new(Some(path.clone()), false);
        assert!(!cache.is_readable());
        assert!(cache.is_writable());

        assert!(cache.write(&contents()));
        assert!(path.is_file());
        let read = cache.read().unwrap();
        assert_eq!(read.resolved, vec!["com.example.foo"]);
    }

    #[test]
    fn test_no_path_is_never_used() {
        let mut cache = CacheFile::new(None, false);
        assert!(!cache.is_readable());
        assert!(!cache.is_writable());
        assert!(!cache.write(&contents()));
        assert!(cache.read().is_none());
        assert!(!cache.is_disabled());
    }

    #[test]
    fn test_corrupt_file_disables_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feature.cache");
        fs::write(&path, [0u8, 0, 0, 3, 0, 0]).unwrap();

        let mut cache = CacheFile::new(Some(path), false);
        assert!(cache.read().is_none());
        assert!(cache.is_disabled());
        assert!(!cache.is_writable());
        assert!(!cache.write(&contents()));
    }

    #[test]
    fn test_version_mismatch_keeps_cache_enabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feature.cache");
        CacheFile::new(Some(path.clone()), true).write(&contents());

        let mut cache = CacheFile::new(Some(path), false);
        assert!(cache.read().is_none());
        assert!(!cache.is_disabled());
        assert!(cache.write(&contents()));
        assert!(cache.read().is_some());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feature.cache");
        let mut cache = CacheFile::new(Some(path.clone()), false);
        assert!(!cache.clear().unwrap());
        cache.write(&contents());
        assert!(cache.clear().unwrap());
        assert!(!path.exists());
    }
}
