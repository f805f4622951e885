//! Per-type association configuration with memoized selection.

use super::config::{select_associations, CloneAssociations};
use crate::error::Result;
use crate::types::TypeTag;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Default number of memoized selections.
pub const DEFAULT_ASSOCIATION_CACHE_SIZE: usize = 256;

/// Declared associations and clone configuration, keyed by type name.
///
/// Owned by a store instance. Selections are memoized per type and dropped
/// whenever that type's declaration or configuration changes.
pub struct AssociationRegistry {
    declared: RwLock<HashMap<String, Vec<String>>>,
    configs: RwLock<HashMap<String, CloneAssociations>>,
    cache: Mutex<LruCache<String, Arc<BTreeSet<String>>>>,
}

impl AssociationRegistry {
    pub fn new(cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            declared: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Declare the associations a type carries, replacing any earlier list.
    pub fn declare<I, S>(&self, type_name: &str, associations: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = associations.into_iter().map(Into::into).collect();
        self.declared.write().insert(type_name.to_string(), names);
        self.invalidate(type_name);
    }

    pub fn configure(&self, type_name: &str, config: CloneAssociations) {
        debug!(type_name, ?config, "configuring association cloning");
        self.configs.write().insert(type_name.to_string(), config);
        self.invalidate(type_name);
    }

    /// Parse and install a JSON configuration. A malformed value leaves the
    /// previous configuration in place.
    pub fn configure_json(&self, type_name: &str, value: serde_json::Value) -> Result<()> {
        let config = CloneAssociations::try_from(value)?;
        self.configure(type_name, config);
        Ok(())
    }

    pub fn declared(&self, type_name: &str) -> Vec<String> {
        self.declared
            .read()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn config(&self, type_name: &str) -> CloneAssociations {
        self.configs
            .read()
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    /// The association names to clone for `type_name`.
    pub fn selected(&self, type_name: &str) -> Arc<BTreeSet<String>> {
        // Held across the computation so a concurrent reconfigure cannot be
        // overwritten by a stale result.
        let mut cache = self.cache.lock();
        if let Some(hit) = cache.get(type_name) {
            return Arc::clone(hit);
        }

        let selection = Arc::new(select_associations(
            &self.declared(type_name),
            &self.config(type_name),
        ));
        cache.put(type_name.to_string(), Arc::clone(&selection));
        selection
    }

    /// Selection for a type tag: the derived variant when it has been
    /// configured or declared, otherwise its base type.
    pub fn selected_for(&self, type_tag: &TypeTag) -> Arc<BTreeSet<String>> {
        let name = type_tag.name();
        if type_tag.is_derived() && !self.is_known(name) {
            return self.selected(type_tag.base_name());
        }
        self.selected(name)
    }

    pub fn invalidate(&self, type_name: &str) {
        self.cache.lock().pop(type_name);
    }

    /// Forget every declaration, configuration and memoized selection.
    pub fn reset(&self) {
        self.declared.write().clear();
        self.configs.write().clear();
        self.cache.lock().clear();
    }

    fn is_known(&self, type_name: &str) -> bool {
        self.declared.read().contains_key(type_name) || self.configs.read().contains_key(type_name)
    }
}

impl Default for AssociationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ASSOCIATION_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_is_memoized_until_reconfigured() {
        let registry = AssociationRegistry::default();
        registry.declare("Post", ["comments", "tags", "owner"]);
        registry.configure("Post", CloneAssociations::All);

        let first = registry.selected("Post");
        let second = registry.selected("Post");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 3);

        registry
            .configure_json("Post", json!({"except": ["comments"]}))
            .unwrap();
        let third = registry.selected("Post");
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(!third.contains("comments"));
    }

    #[test]
    fn test_redeclaring_recomputes() {
        let registry = AssociationRegistry::default();
        registry.configure("Post", CloneAssociations::All);
        assert!(registry.selected("Post").is_empty());

        registry.declare("Post", ["tags"]);
        assert_eq!(registry.selected("Post").len(), 1);
    }

    #[test]
    fn test_bad_json_keeps_previous_config() {
        let registry = AssociationRegistry::default();
        registry.configure("Post", CloneAssociations::All);
        assert!(registry
            .configure_json("Post", json!({"only": ["a"], "except": ["b"]}))
            .is_err());
        assert_eq!(registry.config("Post"), CloneAssociations::All);
    }

    #[test]
    fn test_derived_type_falls_back_to_base() {
        let registry = AssociationRegistry::default();
        registry.declare("Project", ["members", "files"]);
        registry.configure("Project", CloneAssociations::All);

        let tag = TypeTag::derived("Project", "InternalProject");
        assert_eq!(registry.selected_for(&tag).len(), 2);

        registry.configure("InternalProject", CloneAssociations::List(vec!["files".into()]));
        let selected = registry.selected_for(&tag);
        assert_eq!(selected.len(), 1);
        assert!(selected.contains("files"));
    }

    #[test]
    fn test_reset() {
        let registry = AssociationRegistry::new(1);
        registry.declare("Post", ["tags"]);
        registry.configure("Post", CloneAssociations::All);
        assert_eq!(registry.selected("Post").len(), 1);

        registry.reset();
        assert!(registry.selected("Post").is_empty());
        assert!(registry.declared("Post").is_empty());
    }
}
