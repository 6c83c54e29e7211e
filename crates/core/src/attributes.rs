//! Immutable feature attributes
//!
//! [`ImmutableAttributes`] captures everything needed to identify, index and
//! sort a feature without holding its manifest open: names, version,
//! visibility, process types, classification flags, and the file signature
//! used to detect manifest changes.

use crate::errors::{CacheError, ManifestError};
use crate::manifest::details::CachedHeader;
use crate::manifest::header::split_list;
use crate::manifest::{headers, ManifestDetails};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;

/// Visibility of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Install,
}

impl Visibility {
    /// Parse a `visibility:=` directive; anything unknown is private
    pub fn from_directive(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("public") => Visibility::Public,
            Some("protected") => Visibility::Protected,
            Some("install") => Visibility::Install,
            _ => Visibility::Private,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "PUBLIC",
            Visibility::Private => "PRIVATE",
            Visibility::Protected => "PROTECTED",
            Visibility::Install => "INSTALL",
        }
    }

    pub fn from_cache(value: &str) -> Result<Self, CacheError> {
        match value {
            "PUBLIC" => Ok(Visibility::Public),
            "PRIVATE" => Ok(Visibility::Private),
            "PROTECTED" => Ok(Visibility::Protected),
            "INSTALL" => Ok(Visibility::Install),
            other => Err(CacheError::InvalidEnum {
                kind: "visibility",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of process a feature applies to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    #[default]
    Server,
    Client,
}

impl ProcessType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "server" => Some(ProcessType::Server),
            "client" => Some(ProcessType::Client),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessType::Server => "SERVER",
            ProcessType::Client => "CLIENT",
        }
    }
}

/// Applications that must restart when this feature changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppForceRestart {
    Never,
    Install,
    Uninstall,
    Always,
}

impl AppForceRestart {
    /// Parse the comma-separated `IBM-App-ForceRestart` header
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return AppForceRestart::Never;
        };
        let items: Vec<String> = split_list(value)
            .into_iter()
            .map(|v| v.to_ascii_lowercase())
            .collect();
        let install = items.iter().any(|v| v == "install");
        let uninstall = items.iter().any(|v| v == "uninstall");
        match (install, uninstall) {
            (true, true) => AppForceRestart::Always,
            (true, false) => AppForceRestart::Install,
            (false, true) => AppForceRestart::Uninstall,
            (false, false) => AppForceRestart::Never,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppForceRestart::Never => "NEVER",
            AppForceRestart::Install => "INSTALL",
            AppForceRestart::Uninstall => "UNINSTALL",
            AppForceRestart::Always => "ALWAYS",
        }
    }

    pub fn from_cache(value: &str) -> Result<Self, CacheError> {
        match value {
            "NEVER" => Ok(AppForceRestart::Never),
            "INSTALL" => Ok(AppForceRestart::Install),
            "UNINSTALL" => Ok(AppForceRestart::Uninstall),
            "ALWAYS" => Ok(AppForceRestart::Always),
            other => Err(CacheError::InvalidEnum {
                kind: "app restart",
                value: other.to_string(),
            }),
        }
    }
}

/// How a feature's bundles are started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    Sequential,
    Parallel,
}

impl ActivationType {
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("parallel") => ActivationType::Parallel,
            _ => ActivationType::Sequential,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivationType::Sequential => "SEQUENTIAL",
            ActivationType::Parallel => "PARALLEL",
        }
    }

    pub fn from_cache(value: &str) -> Result<Self, CacheError> {
        match value {
            "SEQUENTIAL" => Ok(ActivationType::Sequential),
            "PARALLEL" => Ok(ActivationType::Parallel),
            other => Err(CacheError::InvalidEnum {
                kind: "activation type",
                value: other.to_string(),
            }),
        }
    }
}

/// Last-modified time (milliseconds) and length of a manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct FileSignature {
    pub last_modified: i64,
    pub length: i64,
}

impl FileSignature {
    pub fn new(last_modified: i64, length: i64) -> Self {
        Self {
            last_modified,
            length,
        }
    }

    /// Signature of the file at `path`, or `None` if it cannot be stat'ed
    pub fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Some(Self::new(last_modified, metadata.len() as i64))
    }

    /// Compare at whole-second precision
    ///
    /// Filesystems shared between containers and hosts do not agree on
    /// sub-second timestamps.
    pub fn matches(&self, other: &FileSignature) -> bool {
        self.length == other.length
            && self.last_modified / 1000 * 1000 == other.last_modified / 1000 * 1000
    }
}

/// Frozen identity and classification of one feature
#[derive(Debug, Clone, Serialize)]
pub struct ImmutableAttributes {
    pub bundle_repository_type: String,
    pub symbolic_name: String,
    pub short_name: Option<String>,
    pub feature_name: String,
    pub feature_version: i32,
    pub visibility: Visibility,
    pub app_restart: AppForceRestart,
    pub version: Version,
    pub feature_file: Option<PathBuf>,
    pub signature: FileSignature,
    pub process_types: BTreeSet<ProcessType>,
    pub is_auto_feature: bool,
    pub has_api_services: bool,
    pub has_api_packages: bool,
    pub has_spi_packages: bool,
    pub is_singleton: bool,
    pub disable_on_conflict: bool,
    pub activation_type: ActivationType,
    pub alternate_names: Vec<String>,
    pub platforms: Vec<String>,
}

impl ImmutableAttributes {
    /// Display/lookup name: `repoType:` prefix (if any) plus short or symbolic name
    pub fn build_feature_name(repo_type: &str, symbolic_name: &str, short_name: Option<&str>) -> String {
        let base = short_name.unwrap_or(symbolic_name);
        if repo_type.is_empty() {
            base.to_string()
        } else {
            format!("{repo_type}:{base}")
        }
    }

    /// Derive attributes from a validated manifest
    ///
    /// Callers must run [`ManifestDetails::ensure_valid`] first.
    pub fn from_details(
        repo_type: &str,
        feature_file: Option<PathBuf>,
        signature: FileSignature,
        details: &ManifestDetails,
    ) -> Result<Self, ManifestError> {
        let symbolic_name = details.name_attribute(None)?.unwrap_or_default();
        let header = |name: &str| -> Result<Option<String>, ManifestError> {
            Ok(details
                .main_attribute_value(name)?
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()))
        };

        let short_name = header(headers::SHORT_NAME)?;
        let visibility = Visibility::from_directive(details.name_attribute(Some("visibility"))?.as_deref());
        let is_singleton = details
            .name_attribute(Some("singleton"))?
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        let raw_version = header(headers::SUBSYSTEM_VERSION)?.unwrap_or_default();
        let version = Version::parse(&raw_version)?;

        let mut process_types = BTreeSet::new();
        if let Some(value) = header(headers::PROCESS_TYPES)? {
            for item in split_list(&value) {
                match ProcessType::parse(&item) {
                    Some(pt) => {
                        process_types.insert(pt);
                    }
                    None => warn!(feature = %symbolic_name, process_type = %item, "Ignoring unknown process type"),
                }
            }
        }
        if process_types.is_empty() {
            process_types.insert(ProcessType::Server);
        }

        let feature_name = Self::build_feature_name(repo_type, &symbolic_name, short_name.as_deref());

        Ok(Self {
            bundle_repository_type: repo_type.to_string(),
            feature_name,
            short_name,
            feature_version: details.feature_version()?,
            visibility,
            app_restart: AppForceRestart::from_header(header(headers::APP_FORCE_RESTART)?.as_deref()),
            version,
            feature_file,
            signature,
            process_types,
            is_auto_feature: details
                .cached_raw_header(CachedHeader::ProvisionCapability)
                .is_some(),
            has_api_services: details.cached_raw_header(CachedHeader::ApiService).is_some(),
            has_api_packages: details.cached_raw_header(CachedHeader::ApiPackage).is_some(),
            has_spi_packages: details.cached_raw_header(CachedHeader::SpiPackage).is_some(),
            is_singleton,
            disable_on_conflict: !header(headers::DISABLE_ON_CONFLICT)?
                .is_some_and(|v| v.eq_ignore_ascii_case("false")),
            activation_type: ActivationType::from_header(header(headers::ACTIVATION_TYPE)?.as_deref()),
            alternate_names: header(headers::ALSO_KNOWN_AS)?
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            platforms: header(headers::PLATFORM)?
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            symbolic_name,
        })
    }

    /// Every field equal, including file signature and flags
    pub fn is_identical(&self, other: &ImmutableAttributes) -> bool {
        self == other
            && self.feature_name == other.feature_name
            && self.feature_version == other.feature_version
            && self.visibility == other.visibility
            && self.app_restart == other.app_restart
            && self.feature_file == other.feature_file
            && self.signature == other.signature
            && self.process_types == other.process_types
            && self.is_auto_feature == other.is_auto_feature
            && self.has_api_services == other.has_api_services
            && self.has_api_packages == other.has_api_packages
            && self.has_spi_packages == other.has_spi_packages
            && self.is_singleton == other.is_singleton
            && self.disable_on_conflict == other.disable_on_conflict
            && self.activation_type == other.activation_type
            && self.alternate_names == other.alternate_names
            && self.platforms == other.platforms
    }
}

/// Identity: symbolic name, version, short name and repository type
impl PartialEq for ImmutableAttributes {
    fn eq(&self, other: &Self) -> bool {
        self.symbolic_name == other.symbolic_name
            && self.version == other.version
            && self.short_name == other.short_name
            && self.bundle_repository_type == other.bundle_repository_type
    }
}

impl Eq for ImmutableAttributes {}

impl std::hash::Hash for ImmutableAttributes {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.symbolic_name.hash(state);
        self.version.hash(state);
        self.short_name.hash(state);
        self.bundle_repository_type.hash(state);
    }
}

impl fmt::Display for ImmutableAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.feature_name, self.version)
    }
}
