//! Feature publication
//!
//! Keeps one service registration per resolved feature. Each call to
//! [`FeaturePublisher::publish`] reconciles the registrations against the
//! repository's current resolved set: features no longer resolved are
//! unregistered, new ones registered, and holders whose definition changed
//! are repointed.

use crate::definition::{DetailsHandle, FeatureDefinition};
use crate::manifest::{headers, split_list};
use crate::repository::{FeatureRepository, Repository};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Externally visible metadata of a published feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureProperties {
    pub name: String,
    pub symbolic_name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<String>,
}

impl FeatureProperties {
    pub fn of(definition: &FeatureDefinition) -> Self {
        Self {
            name: definition.feature_name().to_string(),
            symbolic_name: definition.symbolic_name().to_string(),
            version: definition.version().to_string(),
            category: definition
                .header(headers::SUBSYSTEM_CATEGORY)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        }
    }
}

/// Published value handed to consumers
#[derive(Debug)]
pub struct FeatureService {
    definition: ArcSwap<FeatureDefinition>,
}

impl FeatureService {
    fn new(definition: Arc<FeatureDefinition>) -> Self {
        Self {
            definition: ArcSwap::new(definition),
        }
    }

    pub fn definition(&self) -> Arc<FeatureDefinition> {
        self.definition.load_full()
    }

    /// Take a reference on the current definition's manifest details
    pub fn acquire(&self) -> DetailsHandle {
        self.definition.load_full().open()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(pub u64);

/// Boundary to the hosting service registry
pub trait ServiceRegistry {
    fn register(&self, properties: &FeatureProperties, service: Arc<FeatureService>) -> RegistrationId;

    fn set_properties(&self, id: RegistrationId, properties: &FeatureProperties);

    fn unregister(&self, id: RegistrationId);
}

/// Registry kept in memory, for tooling and tests
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<RegistrationId, (FeatureProperties, Arc<FeatureService>)>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<RegistrationId, (FeatureProperties, Arc<FeatureService>)>>
    {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Properties of every registration, in registration order
    pub fn properties(&self) -> Vec<FeatureProperties> {
        self.entries().values().map(|(p, _)| p.clone()).collect()
    }

    pub fn service(&self, symbolic_name: &str) -> Option<Arc<FeatureService>> {
        self.entries()
            .values()
            .find(|(p, _)| p.symbolic_name == symbolic_name)
            .map(|(_, s)| Arc::clone(s))
    }
}

impl ServiceRegistry for InMemoryRegistry {
    fn register(&self, properties: &FeatureProperties, service: Arc<FeatureService>) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.entries().insert(id, (properties.clone(), service));
        id
    }

    fn set_properties(&self, id: RegistrationId, properties: &FeatureProperties) {
        if let Some(entry) = self.entries().get_mut(&id) {
            entry.0 = properties.clone();
        }
    }

    fn unregister(&self, id: RegistrationId) {
        self.entries().remove(&id);
    }
}

#[derive(Debug)]
struct Holder {
    id: RegistrationId,
    service: Arc<FeatureService>,
    definition: Arc<FeatureDefinition>,
}

/// Counts from one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub registered: usize,
    pub updated: usize,
    pub unregistered: usize,
}

pub struct FeaturePublisher<R: ServiceRegistry> {
    registry: R,
    holders: HashMap<String, Holder>,
}

impl<R: ServiceRegistry> FeaturePublisher<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            holders: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn published(&self) -> usize {
        self.holders.len()
    }

    /// Reconcile registrations with the repository's resolved features
    #[instrument(skip_all)]
    pub fn publish(&mut self, repository: &FeatureRepository) -> PublishSummary {
        let mut wanted: HashMap<String, Arc<FeatureDefinition>> = HashMap::new();
        for name in repository.resolved_features() {
            match repository.get_feature(&name) {
                Some(definition) => {
                    wanted.insert(definition.symbolic_name().to_string(), definition);
                }
                None => debug!(feature = %name, "Resolved feature is not installed; not publishing"),
            }
        }

        let mut summary = PublishSummary::default();

        let stale: Vec<String> = self
            .holders
            .keys()
            .filter(|name| !wanted.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            if let Some(holder) = self.holders.remove(&name) {
                self.registry.unregister(holder.id);
                summary.unregistered += 1;
            }
        }

        for (symbolic_name, definition) in wanted {
            match self.holders.get_mut(&symbolic_name) {
                Some(holder) if Arc::ptr_eq(&holder.definition, &definition) => {}
                Some(holder) => {
                    holder.service.definition.store(Arc::clone(&definition));
                    self.registry
                        .set_properties(holder.id, &FeatureProperties::of(&definition));
                    holder.definition = definition;
                    summary.updated += 1;
                }
                None => {
                    let service = Arc::new(FeatureService::new(Arc::clone(&definition)));
                    let id = self
                        .registry
                        .register(&FeatureProperties::of(&definition), Arc::clone(&service));
                    self.holders.insert(
                        symbolic_name,
                        Holder {
                            id,
                            service,
                            definition,
                        },
                    );
                    summary.registered += 1;
                }
            }
        }

        debug!(?summary, "Published resolved features");
        summary
    }

    /// Remove every registration
    pub fn unpublish_all(&mut self) -> usize {
        let count = self.holders.len();
        for (_, holder) in self.holders.drain() {
            self.registry.unregister(holder.id);
        }
        count
    }
}
