//! Context Registry
//!
//! Owns every context slot of a runtime plus the queue of definitions aimed
//! at contexts that do not exist yet.

use crate::config::ContextConfig;
use crate::identifier::normalize;
use crate::module::{Factory, ModuleKey, ModuleRecord, ModuleTable};
use crate::paths::Location;
use crate::readiness::{InitState, PreProcess};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A definition waiting for its context to be instantiated
pub(crate) struct DeferredDefinition {
    pub(crate) id: String,
    pub(crate) deps: Vec<String>,
    pub(crate) factory: Factory,
}

/// Everything a runtime knows about one context
pub(crate) struct ContextSlot {
    pub(crate) config: ContextConfig,
    pub(crate) table: ModuleTable,
    pub(crate) init: InitState,
    pub(crate) pre_process: Option<PreProcess>,
    /// `scheme://host` resources resolve against
    pub(crate) domain: String,
    /// Prefix of module locators
    pub(crate) base_path: String,
}

impl ContextSlot {
    pub(crate) fn new(config: ContextConfig, location: &Location) -> Self {
        let domain = match config.base_domain.as_deref() {
            Some(domain) if !domain.is_empty() => location.add_protocol(domain),
            _ => location.domain(),
        };
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| location.directory());
        let base_path = location.base_path(&domain, &base_url);

        Self {
            config,
            table: ModuleTable::new(),
            init: InitState::default(),
            pre_process: None,
            domain,
            base_path,
        }
    }

    /// Register shim declarations as module records, after any deferred definitions.
    fn register_shims(&mut self, context: &str) {
        for shim in self.config.shim.clone() {
            let id = normalize(&shim.id, &self.config.paths);
            if !self.table.define(&id, ModuleRecord::shim(shim)) {
                warn!(context, module = %id, "Shim id already defined, keeping existing definition");
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct ContextRegistry {
    contexts: HashMap<String, ContextSlot>,
    deferred: HashMap<String, Vec<DeferredDefinition>>,
}

impl ContextRegistry {
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.contexts.contains_key(id)
    }

    pub(crate) fn slot(&self, id: &str) -> Option<&ContextSlot> {
        self.contexts.get(id)
    }

    pub(crate) fn slot_mut(&mut self, id: &str) -> Option<&mut ContextSlot> {
        self.contexts.get_mut(id)
    }

    pub(crate) fn record_mut(&mut self, key: &ModuleKey) -> Option<&mut ModuleRecord> {
        self.contexts.get_mut(&key.context)?.table.get_mut(&key.id)
    }

    pub(crate) fn context_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.contexts.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Insert a new slot, flushing queued definitions and shims into it.
    ///
    /// Returns false (and changes nothing) when the id is already registered.
    pub(crate) fn insert(&mut self, id: &str, mut slot: ContextSlot) -> bool {
        if self.contexts.contains_key(id) {
            return false;
        }

        for item in self.deferred.remove(id).unwrap_or_default() {
            let module_id = normalize(&item.id, &slot.config.paths);
            if slot.table.define(&module_id, ModuleRecord::new(item.deps, item.factory)) {
                debug!(context = id, module = %module_id, "Flushed deferred definition");
            } else {
                debug!(context = id, module = %module_id, "Deferred definition ignored, id already defined");
            }
        }
        slot.register_shims(id);

        self.contexts.insert(id.to_string(), slot);
        true
    }

    pub(crate) fn defer(&mut self, context: &str, definition: DeferredDefinition) {
        debug!(context, module = %definition.id, "Queued definition for uninstantiated context");
        self.deferred
            .entry(context.to_string())
            .or_default()
            .push(definition);
    }

    pub(crate) fn deferred_count(&self, context: &str) -> usize {
        self.deferred.get(context).map(Vec::len).unwrap_or(0)
    }
}
