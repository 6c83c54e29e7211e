//! Manifest main-section reader
//!
//! Reads the `Name: value` lines of a manifest up to the first blank line.
//! Lines starting with a single space continue the previous value. Header
//! names compare case-insensitively.

use crate::errors::ManifestError;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Main attributes of one manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawManifest {
    // keyed by lower-cased header name; value keeps the original name
    headers: IndexMap<String, (String, String)>,
}

impl RawManifest {
    /// Read the manifest at `path`
    ///
    /// The file handle is dropped before returning, on success or failure.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let io_err = |source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        Self::from_reader(file).map_err(io_err)
    }

    pub fn from_reader<R: Read>(reader: R) -> std::io::Result<Self> {
        let mut manifest = RawManifest::default();
        let mut current: Option<(String, String)> = None;

        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(continuation);
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                manifest.insert(name, value);
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    let value = value.strip_prefix(' ').unwrap_or(value);
                    current = Some((name.trim().to_string(), value.to_string()));
                }
                None => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("invalid manifest line: {line}"),
                    ))
                }
            }
        }
        if let Some((name, value)) = current.take() {
            manifest.insert(name, value);
        }

        Ok(manifest)
    }

    pub fn insert(&mut self, name: String, value: String) {
        self.headers.insert(name.to_ascii_lowercase(), (name, value));
    }

    /// Raw value of `name`, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Header names in file order, with their original spelling
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.headers.values().map(|(name, _)| name.as_str())
    }
}
