//! Feature repository
//!
//! [`FeatureRepository`] owns every installed [`FeatureDefinition`], the lookup
//! indexes derived from them, the binary cache and the last resolved feature
//! sets. It is driven from a single provisioning thread:
//!
//! 1. [`FeatureRepository::init`] reads the cache, installs kernel features and
//!    scans each bundle repository's `lib/features` directory, re-parsing only
//!    manifests whose file signature changed.
//! 2. The resolver queries the repository through the [`Repository`] trait and
//!    records its outcome with [`FeatureRepository::set_resolved_features`].
//! 3. [`FeatureRepository::dispose`] writes the cache if anything changed and
//!    releases provisioning-scope state.
//!
//! The resolved state is the one piece read from other threads; it is held in
//! an [`ArcSwap`] and always replaced wholesale (see [`ResolvedView`]).

use crate::attributes::{FileSignature, Visibility};
use crate::cache::{BadFileEntry, CacheContents, CacheFile, CachedFeature};
use crate::config::RepositoryConfig;
use crate::definition::{DetailsHandle, FeatureDefinition};
use crate::errors::RepositoryError;
use crate::kernel::KernelFeatures;
use crate::manifest::details::CachedHeader;
use crate::manifest::{manifest_files, ManifestDetails};
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};

/// Read-only view the feature resolver works against
pub trait Repository {
    /// All installed features
    fn get_features(&self) -> Vec<Arc<FeatureDefinition>>;

    /// Lookup by symbolic name or public name (public names ignore case)
    fn get_feature(&self, name: &str) -> Option<Arc<FeatureDefinition>>;

    fn select(&self, predicate: &dyn Fn(&FeatureDefinition) -> bool) -> Vec<Arc<FeatureDefinition>>;

    /// Auto features; only available during a provisioning pass
    fn get_auto_features(&self) -> Result<Vec<Arc<FeatureDefinition>>, RepositoryError>;

    /// Versions listed in the `tolerates.<base symbolic name>` property
    fn get_configured_tolerates(&self, base_symbolic_name: &str) -> Vec<String>;
}

/// Outcome of the last successful resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedState {
    pub resolved: BTreeSet<String>,
    pub configured: BTreeSet<String>,
    pub platforms: BTreeSet<String>,
    pub platform_env_var: Option<String>,
    pub configuration_error: bool,
}

/// Cloneable handle for reading the resolved state from other threads
#[derive(Debug, Clone)]
pub struct ResolvedView(Arc<ArcSwap<ResolvedState>>);

impl ResolvedView {
    pub fn snapshot(&self) -> Arc<ResolvedState> {
        self.0.load_full()
    }
}

#[derive(Debug, Clone, Copy)]
struct BadFeature {
    signature: FileSignature,
}

impl BadFeature {
    fn same_as(&self, signature: &FileSignature) -> bool {
        self.signature.matches(signature)
    }
}

/// Lower-case a feature name, keeping any `repoType:` prefix as written
pub fn lower_feature(name: &str) -> String {
    match name.find(':') {
        Some(i) => format!("{}{}", &name[..=i], name[i + 1..].to_lowercase()),
        None => name.to_lowercase(),
    }
}

fn normalize_env_var(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub struct FeatureRepository {
    config: RepositoryConfig,
    cache: CacheFile,
    kernel: KernelFeatures,
    installed: IndexMap<String, Arc<FeatureDefinition>>,
    /// lower-cased feature name or public symbolic name -> symbolic name
    public_names: HashMap<String, String>,
    /// lower-cased alternate name -> feature name
    alternate_names: HashMap<String, String>,
    /// lower-cased platform -> compatibility feature
    compatibility: BTreeMap<String, Arc<FeatureDefinition>>,
    /// `None` outside a provisioning pass
    auto_features: Option<Vec<Arc<FeatureDefinition>>>,
    known_good: HashMap<PathBuf, Arc<FeatureDefinition>>,
    known_bad: HashMap<PathBuf, BadFeature>,
    resolved: Arc<ArcSwap<ResolvedState>>,
    provisioning: Vec<DetailsHandle>,
    dirty: bool,
    initialized: bool,
}

impl FeatureRepository {
    pub fn new(config: RepositoryConfig) -> Self {
        let cache = CacheFile::new(config.cache_file.clone(), config.platform_support);
        let kernel = KernelFeatures::new(&config.install_root);
        Self {
            config,
            cache,
            kernel,
            installed: IndexMap::new(),
            public_names: HashMap::new(),
            alternate_names: HashMap::new(),
            compatibility: BTreeMap::new(),
            auto_features: None,
            known_good: HashMap::new(),
            known_bad: HashMap::new(),
            resolved: Arc::new(ArcSwap::from_pointee(ResolvedState::default())),
            provisioning: Vec::new(),
            dirty: false,
            initialized: false,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheFile {
        &self.cache
    }

    /// Delete the cache file; the next `init` starts from the manifests
    pub fn clear_cache(&mut self) -> crate::errors::Result<bool> {
        Ok(self.cache.clear()?)
    }

    pub fn kernel(&self) -> &KernelFeatures {
        &self.kernel
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a provisioning pass is active (between `init` and `dispose`)
    pub fn is_provisioning(&self) -> bool {
        self.auto_features.is_some()
    }

    /// Start a provisioning pass
    #[instrument(skip(self), fields(first = !self.initialized))]
    pub fn init(&mut self) {
        let first_init = !self.initialized;
        self.reset_provisioning_state();

        self.read_cache(first_init);
        // Before the scan, so a renamed manifest does not collide with its old self
        self.remove_deleted_features();

        for definition in self.kernel.definitions().to_vec() {
            self.update_maps(definition);
        }

        self.read_feature_manifests();

        if first_init && self.dirty {
            debug!("Discarding resolved features from a stale or missing cache");
            self.resolved.store(Arc::new(ResolvedState::default()));
        }

        self.provisioning = self.installed.values().map(|d| d.open()).collect();
        self.initialized = true;
        info!(
            installed = self.installed.len(),
            dirty = self.dirty,
            "Feature repository initialized"
        );
    }

    fn reset_provisioning_state(&mut self) {
        self.provisioning.clear();
        self.auto_features = Some(Vec::new());
        self.known_good.clear();
        self.known_bad.clear();
        self.compatibility.clear();
        self.public_names.clear();
        self.alternate_names.clear();

        let installed: Vec<_> = self.installed.values().cloned().collect();
        for definition in installed {
            self.index(&definition);
        }
    }

    /// Merge the cache into the installed set
    #[instrument(skip(self))]
    fn read_cache(&mut self, first_init: bool) {
        let Some(contents) = self.cache.read() else {
            return;
        };

        for cached in contents.features {
            let attributes = cached.attributes;
            let Some(file) = attributes.feature_file.clone().filter(|f| f.is_file()) else {
                trace!(feature = %attributes, "Dropping cached feature whose manifest is gone");
                self.dirty = true;
                continue;
            };
            let details = ManifestDetails::from_cache(Some(file), cached.raw_headers);

            match self.installed.get(&attributes.symbolic_name).cloned() {
                Some(existing) if existing.attributes().is_identical(&attributes) => {
                    existing.attach_details(details);
                    self.update_maps(existing);
                }
                Some(existing) => {
                    trace!(feature = %existing, "Cached feature differs from the installed one");
                    self.dirty = true;
                }
                None => {
                    let definition = Arc::new(FeatureDefinition::new(attributes, Some(details)));
                    if self.update_maps(definition) && !first_init {
                        self.dirty = true;
                    }
                }
            }
        }

        for bad in contents.bad_files {
            self.known_bad.insert(
                bad.path,
                BadFeature {
                    signature: bad.signature,
                },
            );
        }

        if first_init {
            self.resolved.store(Arc::new(ResolvedState {
                resolved: contents.resolved.into_iter().collect(),
                configured: contents.configured.into_iter().collect(),
                platforms: contents.platforms.into_iter().collect(),
                platform_env_var: normalize_env_var(contents.platform_env_var),
                configuration_error: contents.configuration_error,
            }));
        }
    }

    /// Scan every bundle repository for new or changed manifests
    #[instrument(skip(self))]
    fn read_feature_manifests(&mut self) {
        for (repo_type, dir) in self.config.feature_directories() {
            for path in manifest_files(&dir) {
                self.read_feature_manifest(&repo_type, path);
            }
        }
    }

    fn read_feature_manifest(&mut self, repo_type: &str, path: PathBuf) {
        let Some(signature) = FileSignature::of(&path) else {
            return;
        };

        if self
            .known_bad
            .get(&path)
            .is_some_and(|bad| bad.same_as(&signature))
        {
            trace!(manifest = %path.display(), "Skipping unchanged invalid manifest");
            return;
        }

        let previous = self.known_good.get(&path).cloned();
        if let Some(previous) = &previous {
            if previous.attributes().signature.matches(&signature) {
                trace!(manifest = %path.display(), "Skipping unchanged manifest");
                return;
            }
        }

        self.dirty = true;
        if let Some(previous) = &previous {
            debug!(feature = %previous, "Manifest changed; reloading");
            self.remove_from_maps(previous);
        }

        match FeatureDefinition::from_file(repo_type, &path) {
            Ok(definition) => {
                self.known_bad.remove(&path);
                let definition = Arc::new(definition);
                if self.update_maps(Arc::clone(&definition)) {
                    debug!(feature = %definition, manifest = %path.display(), "Installed feature");
                }
            }
            Err(e) => {
                error!(error = %e, manifest = %path.display(), "Invalid feature manifest");
                self.known_bad.insert(path, BadFeature { signature });
            }
        }
    }

    fn remove_deleted_features(&mut self) {
        let deleted: Vec<_> = self
            .installed
            .values()
            .filter(|d| !d.is_kernel() && !d.feature_file().is_some_and(Path::is_file))
            .cloned()
            .collect();
        for definition in deleted {
            debug!(feature = %definition, "Manifest deleted; removing feature");
            self.remove_from_maps(&definition);
            self.dirty = true;
        }

        let before = self.known_bad.len();
        self.known_bad.retain(|path, _| path.is_file());
        if self.known_bad.len() != before {
            self.dirty = true;
        }
    }

    /// Install `definition` and index it; returns false on a collision
    ///
    /// The first definition seen for a symbolic name wins. A different
    /// definition (or the same one from another file) is rejected and its
    /// file recorded as bad until it changes.
    fn update_maps(&mut self, definition: Arc<FeatureDefinition>) -> bool {
        let symbolic_name = definition.symbolic_name().to_string();
        if let Some(existing) = self.installed.get(&symbolic_name) {
            let same = Arc::ptr_eq(existing, &definition)
                || (**existing == *definition && existing.feature_file() == definition.feature_file());
            if !same {
                let collision = RepositoryError::Collision {
                    symbolic_name,
                    incumbent: describe_file(existing.feature_file()),
                    rejected: describe_file(definition.feature_file()),
                };
                error!(error = %collision, "Feature symbolic name collision");
                if let (false, Some(file)) = (definition.is_kernel(), definition.feature_file()) {
                    self.known_bad.insert(
                        file.to_path_buf(),
                        BadFeature {
                            signature: definition.attributes().signature,
                        },
                    );
                    self.dirty = true;
                }
                return false;
            }
        }

        self.installed.insert(symbolic_name, Arc::clone(&definition));
        self.index(&definition);
        true
    }

    fn index(&mut self, definition: &Arc<FeatureDefinition>) {
        let attributes = definition.attributes();
        let symbolic_name = &attributes.symbolic_name;

        if let (false, Some(file)) = (definition.is_kernel(), definition.feature_file()) {
            self.known_good
                .insert(file.to_path_buf(), Arc::clone(definition));
        }

        if attributes.feature_name != *symbolic_name {
            self.public_names
                .insert(lower_feature(&attributes.feature_name), symbolic_name.clone());
        }

        match attributes.visibility {
            Visibility::Public => {
                self.public_names
                    .insert(lower_feature(symbolic_name), symbolic_name.clone());
                for alternate in &attributes.alternate_names {
                    self.alternate_names
                        .insert(lower_feature(alternate), attributes.feature_name.clone());
                }
            }
            Visibility::Private => {
                for platform in &attributes.platforms {
                    let key = platform.to_lowercase();
                    if let Some(previous) = self.compatibility.insert(key, Arc::clone(definition)) {
                        if !Arc::ptr_eq(&previous, definition) {
                            warn!(
                                platform = %platform,
                                replaced = %previous,
                                feature = %definition,
                                "Compatibility feature for platform replaced"
                            );
                        }
                    }
                }
            }
            _ => {}
        }

        if attributes.is_auto_feature {
            if let Some(auto) = self.auto_features.as_mut() {
                if !auto.iter().any(|a| Arc::ptr_eq(a, definition)) {
                    auto.push(Arc::clone(definition));
                }
            }
        }
    }

    fn remove_from_maps(&mut self, definition: &Arc<FeatureDefinition>) {
        let attributes = definition.attributes();
        let symbolic_name = &attributes.symbolic_name;

        if self
            .installed
            .get(symbolic_name)
            .is_some_and(|d| Arc::ptr_eq(d, definition))
        {
            self.installed.shift_remove(symbolic_name);
        }
        if let Some(file) = definition.feature_file() {
            if self
                .known_good
                .get(file)
                .is_some_and(|d| Arc::ptr_eq(d, definition))
            {
                self.known_good.remove(file);
            }
        }

        for key in [
            lower_feature(&attributes.feature_name),
            lower_feature(symbolic_name),
        ] {
            if self.public_names.get(&key) == Some(symbolic_name) {
                self.public_names.remove(&key);
            }
        }
        for alternate in &attributes.alternate_names {
            let key = lower_feature(alternate);
            if self.alternate_names.get(&key) == Some(&attributes.feature_name) {
                self.alternate_names.remove(&key);
            }
        }
        self.compatibility
            .retain(|_, d| !Arc::ptr_eq(d, definition));
        if let Some(auto) = self.auto_features.as_mut() {
            auto.retain(|d| !Arc::ptr_eq(d, definition));
        }
    }

    /// Write the cache when anything changed since the last write
    #[instrument(skip(self), fields(dirty = self.dirty))]
    pub fn store_cache(&mut self) {
        if !self.dirty || !self.cache.is_writable() {
            return;
        }
        let contents = self.cache_contents();
        if self.cache.write(&contents) {
            self.dirty = false;
        }
    }

    fn cache_contents(&self) -> CacheContents {
        let features = self
            .installed
            .values()
            .filter(|d| !d.is_kernel())
            .map(|definition| {
                let handle = definition.open();
                let raw_headers = CachedHeader::ALL.map(|header| {
                    handle
                        .details()
                        .and_then(|details| details.cached_raw_header(header))
                });
                CachedFeature {
                    attributes: definition.attributes().clone(),
                    raw_headers,
                }
            })
            .collect();

        let mut bad_files: Vec<_> = self
            .known_bad
            .iter()
            .map(|(path, bad)| BadFileEntry {
                path: path.clone(),
                signature: bad.signature,
            })
            .collect();
        bad_files.sort_by(|a, b| a.path.cmp(&b.path));

        let state = self.resolved.load();
        CacheContents {
            features,
            resolved: state.resolved.iter().cloned().collect(),
            configured: state.configured.iter().cloned().collect(),
            configuration_error: state.configuration_error,
            bad_files,
            platforms: state.platforms.iter().cloned().collect(),
            platform_env_var: state.platform_env_var.clone(),
        }
    }

    /// End the provisioning pass
    ///
    /// Installed features and resolved state survive for the next `init`.
    pub fn dispose(&mut self) {
        self.store_cache();
        self.auto_features = None;
        self.known_good.clear();
        self.known_bad.clear();
        self.compatibility.clear();
        self.provisioning.clear();
        for definition in self.installed.values() {
            definition.release_details();
        }
        debug!("Feature repository disposed");
    }

    /// Record the outcome of a resolution
    ///
    /// Marks the repository dirty when the resolved, configured or platform
    /// sets or the platform env var change. An empty env var counts as unset.
    pub fn set_resolved_features(
        &mut self,
        resolved: BTreeSet<String>,
        configured: BTreeSet<String>,
        configuration_error: bool,
        platforms: BTreeSet<String>,
        platform_env_var: Option<String>,
    ) {
        let platform_env_var = normalize_env_var(platform_env_var);
        let current = self.resolved.load();
        if current.resolved != resolved
            || current.configured != configured
            || current.platforms != platforms
            || current.platform_env_var != platform_env_var
        {
            self.dirty = true;
        }
        self.resolved.store(Arc::new(ResolvedState {
            resolved,
            configured,
            platforms,
            platform_env_var,
            configuration_error,
        }));
    }

    /// Whether the previous resolution can be reused for this configuration
    pub fn are_configured_features_good(
        &self,
        configured: &BTreeSet<String>,
        platforms: &BTreeSet<String>,
        platform_env_var: Option<&str>,
    ) -> bool {
        if self.dirty {
            return false;
        }
        let state = self.resolved.load();
        if state.configuration_error || state.configured != *configured {
            return false;
        }
        if self.config.platform_support
            && (state.platforms != *platforms
                || state.platform_env_var.as_deref() != platform_env_var.filter(|v| !v.is_empty()))
        {
            return false;
        }
        state
            .resolved
            .iter()
            .all(|name| self.get_feature(name).is_some())
    }

    /// Drop a feature rejected after resolution; flags a configuration error
    pub fn remove_resolved_feature(&mut self, name: &str) {
        let current = self.resolved.load_full();
        let mut next = (*current).clone();
        next.resolved.remove(name);
        next.configuration_error = true;
        self.resolved.store(Arc::new(next));
    }

    pub fn resolved_view(&self) -> ResolvedView {
        ResolvedView(Arc::clone(&self.resolved))
    }

    pub fn resolved_state(&self) -> Arc<ResolvedState> {
        self.resolved.load_full()
    }

    pub fn resolved_features(&self) -> BTreeSet<String> {
        self.resolved.load().resolved.clone()
    }

    pub fn configured_features(&self) -> BTreeSet<String> {
        self.resolved.load().configured.clone()
    }

    pub fn platforms(&self) -> BTreeSet<String> {
        self.resolved.load().platforms.clone()
    }

    pub fn platform_env_var(&self) -> Option<String> {
        self.resolved.load().platform_env_var.clone()
    }

    pub fn has_resolved_features(&self) -> bool {
        !self.resolved.load().resolved.is_empty()
    }

    pub fn feature_set_equals(&self, features: &BTreeSet<String>) -> bool {
        self.resolved.load().resolved == *features
    }

    pub fn has_configuration_error(&self) -> bool {
        self.resolved.load().configuration_error
    }

    /// Public feature name registered for an alternate name
    pub fn matches_alternate(&self, name: &str) -> Option<&str> {
        self.alternate_names
            .get(&lower_feature(name))
            .map(String::as_str)
    }

    /// Unknown features disable everything on conflict
    pub fn disable_all_features_on_conflict(&self, name: &str) -> bool {
        self.get_feature(name)
            .map_or(true, |d| d.attributes().disable_on_conflict)
    }

    pub fn compatibility_feature(&self, platform: &str) -> Option<Arc<FeatureDefinition>> {
        self.compatibility.get(&platform.to_lowercase()).cloned()
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.compatibility.keys().cloned().collect()
    }

    /// Manifest files currently known to be invalid, with their signatures
    pub fn bad_files(&self) -> Vec<(PathBuf, FileSignature)> {
        let mut files: Vec<_> = self
            .known_bad
            .iter()
            .map(|(path, bad)| (path.clone(), bad.signature))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
    }

    /// Symbolic name for a public name, falling back to `name` itself
    pub fn symbolic_name_for(&self, name: &str) -> Option<&str> {
        self.public_names
            .get(&lower_feature(name))
            .map(String::as_str)
            .or_else(|| self.installed.get_key_value(name).map(|(k, _)| k.as_str()))
    }
}

fn describe_file(file: Option<&Path>) -> String {
    file.map(|f| f.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string())
}

impl Repository for FeatureRepository {
    fn get_features(&self) -> Vec<Arc<FeatureDefinition>> {
        self.installed.values().cloned().collect()
    }

    fn get_feature(&self, name: &str) -> Option<Arc<FeatureDefinition>> {
        let symbolic_name = self.symbolic_name_for(name)?;
        self.installed.get(symbolic_name).cloned()
    }

    fn select(&self, predicate: &dyn Fn(&FeatureDefinition) -> bool) -> Vec<Arc<FeatureDefinition>> {
        self.installed
            .values()
            .filter(|d| predicate(d))
            .cloned()
            .collect()
    }

    fn get_auto_features(&self) -> Result<Vec<Arc<FeatureDefinition>>, RepositoryError> {
        self.auto_features
            .clone()
            .ok_or(RepositoryError::NotProvisioning)
    }

    fn get_configured_tolerates(&self, base_symbolic_name: &str) -> Vec<String> {
        self.config
            .property(&format!("tolerates.{base_symbolic_name}"))
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
