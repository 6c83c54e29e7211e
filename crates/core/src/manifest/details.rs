//! Lazily evaluated manifest details
//!
//! [`ManifestDetails`] wraps one feature manifest and computes derived values
//! (symbolic name clause, content resources, capability filters, supersession)
//! on first use, memoizing each one. Values restored from the binary cache are
//! pre-seeded so the manifest file is only re-read when something not held in
//! the cache is requested.
//!
//! Memo cells are `once_cell::sync::OnceCell`: concurrent first callers may
//! race to compute a value but all observe the single stored result.

use super::filter::Filter;
use super::header::{parse_header, split_list, HeaderClause};
use super::headers;
use super::raw::RawManifest;
use crate::errors::ManifestError;
use crate::resource::{ContentType, FeatureResource};
use once_cell::sync::OnceCell;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

/// Highest supported IBM-Feature-Version
pub const MAX_FEATURE_VERSION: i32 = 2;

/// Raw headers kept verbatim in the binary cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedHeader {
    ProvisionCapability,
    ApiService,
    ApiPackage,
    SpiPackage,
}

impl CachedHeader {
    pub const ALL: [CachedHeader; 4] = [
        CachedHeader::ProvisionCapability,
        CachedHeader::ApiService,
        CachedHeader::ApiPackage,
        CachedHeader::SpiPackage,
    ];

    pub fn header_name(self) -> &'static str {
        match self {
            CachedHeader::ProvisionCapability => headers::PROVISION_CAPABILITY,
            CachedHeader::ApiService => headers::API_SERVICE,
            CachedHeader::ApiPackage => headers::API_PACKAGE,
            CachedHeader::SpiPackage => headers::SPI_PACKAGE,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Default)]
struct Supersession {
    superseded: bool,
    superseded_by: Option<String>,
}

/// Manifest detail accessor for one feature
#[derive(Debug)]
pub struct ManifestDetails {
    file: Option<PathBuf>,
    manifest: OnceCell<Arc<RawManifest>>,
    symbolic_name: OnceCell<HeaderClause>,
    raw_headers: [OnceCell<Option<String>>; 4],
    constituents: OnceCell<Arc<Vec<Arc<FeatureResource>>>>,
    capability_filters: OnceCell<Arc<Vec<Filter>>>,
    supersession: OnceCell<Supersession>,
}

impl ManifestDetails {
    fn empty(file: Option<PathBuf>) -> Self {
        Self {
            file,
            manifest: OnceCell::new(),
            symbolic_name: OnceCell::new(),
            raw_headers: Default::default(),
            constituents: OnceCell::new(),
            capability_filters: OnceCell::new(),
            supersession: OnceCell::new(),
        }
    }

    /// Read the manifest at `path` now; the file is closed before returning
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let manifest = RawManifest::read(path)?;
        Ok(Self::from_manifest(Some(path.to_path_buf()), manifest))
    }

    /// Read a manifest from a stream with no backing file
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ManifestError> {
        let manifest = RawManifest::from_reader(reader).map_err(|source| ManifestError::Io {
            path: PathBuf::from("<stream>"),
            source,
        })?;
        Ok(Self::from_manifest(None, manifest))
    }

    pub fn from_manifest(file: Option<PathBuf>, manifest: RawManifest) -> Self {
        let details = Self::empty(file);
        let _ = details.manifest.set(Arc::new(manifest));
        details
    }

    /// Details restored from the cache: raw headers are known, the manifest
    /// itself is read only if something else is asked for
    pub fn from_cache(file: Option<PathBuf>, raw_headers: [Option<String>; 4]) -> Self {
        let details = Self::empty(file);
        for (cell, value) in details.raw_headers.iter().zip(raw_headers) {
            let _ = cell.set(value);
        }
        details
    }

    /// Details for `file` that read nothing until first use
    pub fn deferred(file: PathBuf) -> Self {
        Self::empty(Some(file))
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn display_path(&self) -> String {
        self.file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<stream>".to_string())
    }

    fn manifest(&self) -> Result<&Arc<RawManifest>, ManifestError> {
        self.manifest.get_or_try_init(|| match &self.file {
            Some(path) => RawManifest::read(path).map(Arc::new),
            None => Err(ManifestError::Io {
                path: PathBuf::from("<stream>"),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "manifest has no backing file",
                ),
            }),
        })
    }

    /// Raw header lookup
    pub fn main_attribute_value(&self, key: &str) -> Result<Option<String>, ManifestError> {
        Ok(self.manifest()?.get(key).map(str::to_string))
    }

    fn symbolic_name_clause(&self) -> Result<&HeaderClause, ManifestError> {
        self.symbolic_name.get_or_try_init(|| {
            let missing = || ManifestError::MissingSymbolicName {
                path: self.display_path(),
            };
            let value = self
                .main_attribute_value(headers::SYMBOLIC_NAME)?
                .ok_or_else(missing)?;
            parse_header(&value)
                .into_iter()
                .next()
                .filter(|clause| !clause.name().is_empty())
                .ok_or_else(missing)
        })
    }

    /// Value from the symbolic name header
    ///
    /// `None` returns the name itself; otherwise the directive (or, failing
    /// that, the attribute) named `key`.
    pub fn name_attribute(&self, key: Option<&str>) -> Result<Option<String>, ManifestError> {
        let clause = self.symbolic_name_clause()?;
        Ok(match key {
            None => Some(clause.name().to_string()),
            Some(key) => clause
                .directive(key)
                .or_else(|| clause.attribute(key))
                .map(str::to_string),
        })
    }

    /// IBM-Feature-Version; negative or malformed values count as unset (0)
    pub fn feature_version(&self) -> Result<i32, ManifestError> {
        let value = self.main_attribute_value(headers::FEATURE_VERSION)?;
        Ok(value
            .and_then(|v| v.trim().parse::<i32>().ok())
            .filter(|v| *v >= 0)
            .unwrap_or(0))
    }

    /// Check the headers every feature manifest must carry
    pub fn ensure_valid(&self) -> Result<(), ManifestError> {
        let path = self.display_path();

        self.name_attribute(None)?;

        let version = self.feature_version()?;
        if version > MAX_FEATURE_VERSION {
            return Err(ManifestError::UnsupportedFeatureVersion { path, version });
        }

        let subsystem_type = self
            .main_attribute_value(headers::SUBSYSTEM_TYPE)?
            .unwrap_or_default();
        let type_name = parse_header(&subsystem_type)
            .first()
            .map(|c| c.name().to_string())
            .unwrap_or_default();
        if type_name != headers::FEATURE_SUBSYSTEM_TYPE {
            return Err(ManifestError::InvalidSubsystemType {
                path,
                found: subsystem_type,
            });
        }

        match self.main_attribute_value(headers::SUBSYSTEM_VERSION)? {
            Some(v) if !v.trim().is_empty() => Ok(()),
            _ => Err(ManifestError::MissingVersion { path }),
        }
    }

    /// Memoized raw value of a cached header; read failures count as absent
    pub fn cached_raw_header(&self, header: CachedHeader) -> Option<String> {
        self.raw_headers[header.index()]
            .get_or_init(
                || match self.main_attribute_value(header.header_name()) {
                    Ok(value) => value.filter(|v| !v.trim().is_empty()),
                    Err(e) => {
                        warn!(error = %e, header = header.header_name(), "Failed to read cached header; treating as absent");
                        None
                    }
                },
            )
            .clone()
    }

    /// Content resources, optionally restricted to one content type
    pub fn constituents(&self, filter: Option<ContentType>) -> Vec<Arc<FeatureResource>> {
        let all = self.constituents.get_or_init(|| {
            let content = match self.main_attribute_value(headers::SUBSYSTEM_CONTENT) {
                Ok(content) => content.unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "Failed to read feature content");
                    String::new()
                }
            };
            Arc::new(
                parse_header(&content)
                    .into_iter()
                    .map(|clause| Arc::new(FeatureResource::from_clause(clause)))
                    .collect(),
            )
        });

        match filter {
            None => all.as_ref().clone(),
            Some(wanted) => all
                .iter()
                .filter(|r| r.content_type() == wanted)
                .cloned()
                .collect(),
        }
    }

    /// Filters from the provisioning capability header; malformed ones are skipped
    pub fn capability_filters(&self) -> Arc<Vec<Filter>> {
        self.capability_filters
            .get_or_init(|| {
                let Some(raw) = self.cached_raw_header(CachedHeader::ProvisionCapability) else {
                    return Arc::new(Vec::new());
                };
                let mut filters = Vec::new();
                for clause in parse_header(&raw) {
                    let Some(expression) = clause.directive("filter") else {
                        continue;
                    };
                    match Filter::parse(expression) {
                        Ok(filter) => filters.push(filter),
                        Err(e) => {
                            warn!(error = %e, manifest = %self.display_path(), "Skipping malformed capability filter")
                        }
                    }
                }
                Arc::new(filters)
            })
            .clone()
    }

    fn supersession(&self) -> &Supersession {
        self.supersession.get_or_init(|| {
            let superseded = self
                .name_attribute(Some("superseded"))
                .ok()
                .flatten()
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
            let superseded_by = self
                .name_attribute(Some("superseded-by"))
                .ok()
                .flatten()
                .map(|v| split_list(&v).join(","))
                .filter(|v| !v.is_empty());

            if !superseded && superseded_by.is_some() {
                error!(
                    manifest = %self.display_path(),
                    superseded_by = ?superseded_by,
                    "Feature names a superseding feature but is not marked superseded"
                );
            }
            Supersession {
                superseded,
                superseded_by,
            }
        })
    }

    pub fn is_superseded(&self) -> bool {
        self.supersession().superseded
    }

    /// Comma-separated list of superseding features, if declared
    pub fn superseded_by(&self) -> Option<String> {
        self.supersession().superseded_by.clone()
    }
}
