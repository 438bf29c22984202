//! Processor registry.
//!
//! Binds macro type identifiers to processors with a priority. The registry
//! is read-mostly: every conversion takes an immutable [`RegistrySnapshot`],
//! and mutations build a new state and swap it in, so readers never observe
//! a partial update.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use ce_config::ConvertConfig;

use crate::element::MacroElement;
use crate::processor::ContentProcessor;
use crate::processors;

/// Priority used by the default processors unless noted otherwise.
pub const DEFAULT_PRIORITY: i32 = 100;

/// One active registration.
#[derive(Clone)]
pub struct Registration {
    type_id: String,
    processor: Arc<dyn ContentProcessor>,
    priority: i32,
    sequence: u64,
}

impl Registration {
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn processor(&self) -> &Arc<dyn ContentProcessor> {
        &self.processor
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("type_id", &self.type_id)
            .field("processor", &self.processor.name())
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Immutable registry state shared by in-flight conversions.
#[derive(Clone, Debug, Default)]
pub struct RegistryState {
    /// Sorted by priority descending, then registration sequence.
    entries: Vec<Registration>,
    blacklist: HashSet<String>,
    enabled: Option<HashSet<String>>,
    disabled: HashSet<String>,
}

/// Snapshot handed to one conversion.
pub type RegistrySnapshot = Arc<RegistryState>;

impl RegistryState {
    pub fn lookup(&self, type_id: &str) -> Option<&Arc<dyn ContentProcessor>> {
        let type_id = normalize(type_id);
        if self.is_blacklisted(&type_id) {
            return None;
        }
        self.entries
            .iter()
            .find(|r| r.type_id == type_id)
            .map(|r| &r.processor)
    }

    pub fn is_blacklisted(&self, type_id: &str) -> bool {
        self.blacklist.contains(&normalize(type_id))
    }

    /// Registrations in dispatch order.
    pub fn ordered(&self) -> &[Registration] {
        &self.entries
    }

    /// First processor, in priority order, whose predicate accepts the element.
    pub fn scan(&self, element: &MacroElement<'_>) -> Option<&Arc<dyn ContentProcessor>> {
        self.entries
            .iter()
            .find(|r| r.processor.can_handle(element))
            .map(|r| &r.processor)
    }

    fn excluded(&self, type_id: &str) -> bool {
        self.blacklist.contains(type_id)
            || self.disabled.contains(type_id)
            || self.enabled.as_ref().is_some_and(|e| !e.contains(type_id))
    }

    fn evict_excluded(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .filter(|r| {
                let keep = !self.excluded(&r.type_id);
                if !keep {
                    tracing::debug!(macro_type = %r.type_id, "Evicting excluded processor");
                }
                keep
            })
            .collect();
    }
}

/// Injectable registry of content processors.
///
/// # Thread Safety
///
/// Lookups go through an `Arc` snapshot taken under a short read lock;
/// mutations clone the state, modify the clone and swap it in under the
/// write lock.
pub struct ProcessorRegistry {
    state: RwLock<Arc<RegistryState>>,
    sequence: AtomicU64,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(RegistryState::default())),
            sequence: AtomicU64::new(0),
        }
    }

    /// Registry holding the statically linked default processors.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        processors::register_defaults(&registry);
        registry
    }

    /// Registry configured from `[convert]`: policy first, so excluded
    /// defaults are never registered.
    pub fn from_config(config: &ConvertConfig) -> Self {
        let registry = Self::new();
        registry.set_blacklist(config.blacklist.iter().cloned());
        registry.set_policy(
            config.enabled.as_ref().map(|e| e.iter().cloned().collect()),
            config.disabled.iter().cloned().collect(),
        );
        processors::register_defaults(&registry);
        registry
    }

    /// Current immutable state.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().unwrap().clone()
    }

    /// Register a processor for a type.
    ///
    /// Replaces an existing registration for the same type (which then gets a
    /// fresh sequence number). Blacklisted or policy-excluded types are not
    /// registered; returns whether the registration took effect.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn register(
        &self,
        type_id: &str,
        processor: Arc<dyn ContentProcessor>,
        priority: i32,
    ) -> bool {
        let type_id = normalize(type_id);
        let mut guard = self.state.write().unwrap();
        if guard.excluded(&type_id) {
            tracing::debug!(macro_type = %type_id, "Ignoring registration of excluded macro type");
            return false;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let state = Arc::make_mut(&mut guard);
        state.entries.retain(|r| r.type_id != type_id);
        let position = state
            .entries
            .iter()
            .position(|r| r.priority < priority)
            .unwrap_or(state.entries.len());
        state.entries.insert(
            position,
            Registration {
                type_id,
                processor,
                priority,
                sequence,
            },
        );
        true
    }

    /// Look up the processor registered for a type.
    pub fn lookup(&self, type_id: &str) -> Option<Arc<dyn ContentProcessor>> {
        self.snapshot().lookup(type_id).cloned()
    }

    /// Registrations in dispatch order: priority descending, ties in
    /// registration order.
    pub fn ordered_by_priority(&self) -> Vec<Registration> {
        self.snapshot().ordered().to_vec()
    }

    /// Remove a registration. Returns whether one existed.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn unregister(&self, type_id: &str) -> bool {
        let type_id = normalize(type_id);
        let mut guard = self.state.write().unwrap();
        if !guard.entries.iter().any(|r| r.type_id == type_id) {
            return false;
        }
        Arc::make_mut(&mut guard).entries.retain(|r| r.type_id != type_id);
        true
    }

    /// Remove every registration. Blacklist and policy are kept.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn clear(&self) {
        let mut guard = self.state.write().unwrap();
        Arc::make_mut(&mut guard).entries.clear();
    }

    /// Replace the blacklist, evicting registrations for listed types.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn set_blacklist(&self, types: impl IntoIterator<Item = String>) {
        let mut guard = self.state.write().unwrap();
        let state = Arc::make_mut(&mut guard);
        state.blacklist = types.into_iter().map(|t| normalize(&t)).collect();
        state.evict_excluded();
    }

    /// Install the enabled/disabled policy, evicting newly excluded types.
    ///
    /// With `enabled` set, only listed types may be registered; `disabled`
    /// always wins.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn set_policy(&self, enabled: Option<HashSet<String>>, disabled: HashSet<String>) {
        let mut guard = self.state.write().unwrap();
        let state = Arc::make_mut(&mut guard);
        state.enabled = enabled.map(|e| e.iter().map(|t| normalize(t)).collect());
        state.disabled = disabled.iter().map(|t| normalize(t)).collect();
        state.evict_excluded();
    }
}

fn normalize(type_id: &str) -> String {
    type_id.trim().to_ascii_lowercase()
}
