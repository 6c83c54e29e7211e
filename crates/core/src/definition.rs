//! Feature definitions
//!
//! A [`FeatureDefinition`] couples one [`ImmutableAttributes`] with an
//! optional [`ManifestDetails`]. The details are reference counted through
//! [`DetailsHandle`]s: while at least one handle is open (an active
//! provisioning pass or a published service consumer) the details stay
//! attached; closing the last handle releases them.

use crate::attributes::{FileSignature, ImmutableAttributes, Visibility};
use crate::errors::ManifestError;
use crate::manifest::ManifestDetails;
use crate::resource::{ContentType, FeatureResource};
use crate::version::Version;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Identity property names used when matching capability filters
pub const IDENTITY_TYPE: &str = "type";
pub const IDENTITY_NAME: &str = "osgi.identity";

/// One installed feature
#[derive(Debug)]
pub struct FeatureDefinition {
    attributes: Arc<ImmutableAttributes>,
    details: Mutex<Option<Arc<ManifestDetails>>>,
    ref_count: AtomicUsize,
    kernel: bool,
}

impl FeatureDefinition {
    pub fn new(attributes: ImmutableAttributes, details: Option<ManifestDetails>) -> Self {
        Self::with_shared(Arc::new(attributes), details.map(Arc::new), false)
    }

    /// Definition for a kernel feature; never cached
    pub fn kernel(attributes: ImmutableAttributes, details: ManifestDetails) -> Self {
        Self::with_shared(Arc::new(attributes), Some(Arc::new(details)), true)
    }

    /// Parse and validate the manifest at `path`
    ///
    /// The file signature is taken before reading so a concurrent edit is
    /// picked up by the next scan.
    pub fn from_file(repo_type: &str, path: &Path) -> Result<Self, ManifestError> {
        let (attributes, details) = Self::parse_file(repo_type, path)?;
        Ok(Self::new(attributes, Some(details)))
    }

    /// Kernel definition for the manifest at `path`
    pub fn kernel_from_file(path: &Path) -> Result<Self, ManifestError> {
        let (attributes, details) = Self::parse_file("", path)?;
        Ok(Self::kernel(attributes, details))
    }

    fn parse_file(
        repo_type: &str,
        path: &Path,
    ) -> Result<(ImmutableAttributes, ManifestDetails), ManifestError> {
        let signature = FileSignature::of(path).ok_or_else(|| ManifestError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "cannot stat manifest"),
        })?;
        let details = ManifestDetails::load(path)?;
        details.ensure_valid()?;
        let attributes =
            ImmutableAttributes::from_details(repo_type, Some(path.to_path_buf()), signature, &details)?;
        Ok((attributes, details))
    }

    fn with_shared(
        attributes: Arc<ImmutableAttributes>,
        details: Option<Arc<ManifestDetails>>,
        kernel: bool,
    ) -> Self {
        Self {
            attributes,
            details: Mutex::new(details),
            ref_count: AtomicUsize::new(0),
            kernel,
        }
    }

    pub fn attributes(&self) -> &ImmutableAttributes {
        &self.attributes
    }

    pub fn symbolic_name(&self) -> &str {
        &self.attributes.symbolic_name
    }

    pub fn feature_name(&self) -> &str {
        &self.attributes.feature_name
    }

    pub fn version(&self) -> &Version {
        &self.attributes.version
    }

    pub fn visibility(&self) -> Visibility {
        self.attributes.visibility
    }

    pub fn is_auto_feature(&self) -> bool {
        self.attributes.is_auto_feature
    }

    pub fn is_kernel(&self) -> bool {
        self.kernel
    }

    pub fn feature_file(&self) -> Option<&Path> {
        self.attributes.feature_file.as_deref()
    }

    fn lock_details(&self) -> MutexGuard<'_, Option<Arc<ManifestDetails>>> {
        // the guarded value is a plain Option, poisoning leaves it consistent
        self.details.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Details currently attached, without materializing them
    pub fn attached_details(&self) -> Option<Arc<ManifestDetails>> {
        self.lock_details().clone()
    }

    /// Attach details (e.g. restored from the cache) if none are attached
    pub fn attach_details(&self, details: ManifestDetails) {
        let mut slot = self.lock_details();
        if slot.is_none() {
            *slot = Some(Arc::new(details));
        }
    }

    /// Attached details, creating deferred ones from the feature file if absent
    pub fn details(&self) -> Option<Arc<ManifestDetails>> {
        let mut slot = self.lock_details();
        Self::materialize(&mut slot, &self.attributes)
    }

    fn materialize(
        slot: &mut Option<Arc<ManifestDetails>>,
        attributes: &ImmutableAttributes,
    ) -> Option<Arc<ManifestDetails>> {
        if slot.is_none() {
            let file = attributes.feature_file.clone()?;
            *slot = Some(Arc::new(ManifestDetails::deferred(file)));
        }
        slot.clone()
    }

    /// Drop attached details unless a handle still needs them
    pub fn release_details(&self) {
        let mut slot = self.lock_details();
        if self.ref_count.load(Ordering::SeqCst) == 0 {
            *slot = None;
        }
    }

    /// Open a handle keeping the details attached until it is dropped
    pub fn open(self: &Arc<Self>) -> DetailsHandle {
        let mut slot = self.lock_details();
        self.ref_count.fetch_add(1, Ordering::SeqCst);
        let details = Self::materialize(&mut slot, &self.attributes);
        DetailsHandle {
            definition: Arc::clone(self),
            details,
        }
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    fn close(&self) {
        let mut slot = self.lock_details();
        if self.ref_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            *slot = None;
        }
    }

    /// Content resources; empty if the manifest cannot be read
    pub fn constituents(&self, filter: Option<ContentType>) -> Vec<Arc<FeatureResource>> {
        self.details()
            .map(|d| d.constituents(filter))
            .unwrap_or_default()
    }

    /// Value of a raw manifest header; `None` when absent or unreadable
    pub fn header(&self, name: &str) -> Option<String> {
        self.details()?.main_attribute_value(name).ok().flatten()
    }

    pub fn is_superseded(&self) -> bool {
        self.details().is_some_and(|d| d.is_superseded())
    }

    pub fn superseded_by(&self) -> Option<String> {
        self.details()?.superseded_by()
    }

    /// Properties a capability filter is matched against
    pub fn identity_properties(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                IDENTITY_TYPE.to_string(),
                crate::manifest::headers::FEATURE_SUBSYSTEM_TYPE.to_string(),
            ),
            (IDENTITY_NAME.to_string(), self.symbolic_name().to_string()),
        ])
    }

    /// Whether every capability filter matches at least one candidate
    ///
    /// Always false for features that are not auto features.
    pub fn is_capability_satisfied(&self, candidates: &[Arc<FeatureDefinition>]) -> bool {
        if !self.is_auto_feature() {
            return false;
        }
        let Some(details) = self.details() else {
            return false;
        };
        let filters = details.capability_filters();
        if filters.is_empty() {
            return false;
        }
        let identities: Vec<_> = candidates.iter().map(|c| c.identity_properties()).collect();
        filters
            .iter()
            .all(|filter| identities.iter().any(|props| filter.matches(props)))
    }

    fn features_dir(&self) -> Option<&Path> {
        self.feature_file()?.parent()
    }

    /// `<features dir>/checksums/<symbolicName>.cs`
    pub fn checksum_file(&self) -> Option<PathBuf> {
        Some(
            self.features_dir()?
                .join("checksums")
                .join(format!("{}.cs", self.symbolic_name())),
        )
    }

    /// `<features dir>/l10n/<symbolicName>[_<locale>].properties`
    pub fn localization_file(&self, locale: Option<&str>) -> Option<PathBuf> {
        let name = match locale.filter(|l| !l.is_empty()) {
            Some(locale) => format!("{}_{}.properties", self.symbolic_name(), locale),
            None => format!("{}.properties", self.symbolic_name()),
        };
        Some(self.features_dir()?.join("l10n").join(name))
    }
}

/// Identity delegates to the immutable attributes
impl PartialEq for FeatureDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }
}

impl Eq for FeatureDefinition {}

impl fmt::Display for FeatureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.attributes, f)
    }
}

/// Open reference to a definition's manifest details
///
/// Dropping the last handle for a definition releases its details.
#[derive(Debug)]
pub struct DetailsHandle {
    definition: Arc<FeatureDefinition>,
    details: Option<Arc<ManifestDetails>>,
}

impl DetailsHandle {
    pub fn definition(&self) -> &Arc<FeatureDefinition> {
        &self.definition
    }

    /// `None` only for definitions without a backing file
    pub fn details(&self) -> Option<&Arc<ManifestDetails>> {
        self.details.as_ref()
    }
}

impl Drop for DetailsHandle {
    fn drop(&mut self) {
        self.definition.close();
    }
}
