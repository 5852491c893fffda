//! Process-wide plugin registry.
//!
//! Populated by explicit registration calls before the first graph build
//! (convention, not enforced). Enumeration order is insertion order so
//! command responses stay deterministic.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::descriptor::PluginDescriptor;
use crate::plugin::Plugin;

/// Registration entry: one per plugin type.
#[derive(Clone)]
pub struct PluginRegistration {
    pub id: String,
    pub factory: fn() -> Box<dyn Plugin>,
}

impl PluginRegistration {
    /// Build a registration by instantiating the factory once and reading
    /// the descriptor id from it.
    pub fn from_factory(factory: fn() -> Box<dyn Plugin>) -> Self {
        let id = factory().descriptor().id;
        Self { id, factory }
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<PluginRegistration>,
    /// Descriptor cache, built lazily on first lookup.
    descriptors: HashMap<String, PluginDescriptor>,
}

fn registry() -> &'static Mutex<RegistryInner> {
    static REGISTRY: OnceLock<Mutex<RegistryInner>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(RegistryInner::default()))
}

/// Global plugin registry. All operations run on the control thread.
pub struct PluginRegistry;

impl PluginRegistry {
    /// Add one registration. Duplicate ids are allowed; the newest entry
    /// wins lookups.
    pub fn add(registration: PluginRegistration) {
        tracing::debug!(id = %registration.id, "registering plugin");
        let mut inner = registry().lock();
        inner.descriptors.remove(&registration.id);
        inner.entries.push(registration);
    }

    /// All registered plugins in insertion order.
    pub fn all() -> Vec<PluginRegistration> {
        registry().lock().entries.clone()
    }

    /// Create a plugin instance by id.
    pub fn create(id: &str) -> Option<Box<dyn Plugin>> {
        let inner = registry().lock();
        inner
            .entries
            .iter()
            .rev()
            .find(|reg| reg.id == id)
            .map(|reg| (reg.factory)())
    }

    /// Look up a descriptor by id. Cached after the first call.
    pub fn find_descriptor(id: &str) -> Option<PluginDescriptor> {
        {
            let inner = registry().lock();
            if let Some(desc) = inner.descriptors.get(id) {
                return Some(desc.clone());
            }
        }
        // Instantiate outside the lock; plugin constructors may be heavy.
        let descriptor = Self::create(id)?.descriptor();
        let mut inner = registry().lock();
        inner.descriptors.insert(id.to_owned(), descriptor.clone());
        Some(descriptor)
    }

    pub fn contains(id: &str) -> bool {
        registry().lock().entries.iter().any(|reg| reg.id == id)
    }
}
