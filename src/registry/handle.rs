//! Named-instance slot for one component kind.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LegoError, Result};

/// Instance name substituted when callers pass an empty name.
pub const DEFAULT_INSTANCE: &str = "app";

/// Resolves the empty name to [`DEFAULT_INSTANCE`].
pub fn resolve_instance(instance: &str) -> &str {
    if instance.is_empty() {
        DEFAULT_INSTANCE
    } else {
        instance
    }
}

struct Slot<T: ?Sized> {
    instances: HashMap<String, Arc<T>>,
    enabled: bool,
}

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self {
            instances: HashMap::new(),
            enabled: false,
        }
    }
}

/// Zero or more named instances of one component kind plus an enabled flag.
///
/// Writers take the write lock for the whole insert-and-enable step; readers
/// take the read lock, so a reader never sees a half-applied `set`. A
/// disabled handle reports `NotInitialized` whatever the map still holds.
pub struct ComponentHandle<T: ?Sized> {
    kind: &'static str,
    slot: RwLock<Slot<T>>,
}

impl<T: ?Sized> ComponentHandle<T> {
    /// Creates an empty, disabled handle for `kind`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slot: RwLock::new(Slot::default()),
        }
    }

    /// Component kind name used in errors and logs.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Inserts or replaces an instance and enables the kind.
    pub fn set(&self, instance: &str, value: Arc<T>) {
        let instance = resolve_instance(instance);
        let mut slot = self.slot.write();
        slot.instances.insert(instance.to_string(), value);
        slot.enabled = true;
    }

    /// Returns the named instance.
    pub fn get(&self, instance: &str) -> Result<Arc<T>> {
        let instance = resolve_instance(instance);
        let slot = self.slot.read();
        if !slot.enabled {
            return Err(LegoError::not_initialized(self.kind));
        }
        slot.instances
            .get(instance)
            .cloned()
            .ok_or_else(|| LegoError::instance_not_found(self.kind, instance))
    }

    /// Returns a snapshot of every instance.
    pub fn get_all(&self) -> Result<HashMap<String, Arc<T>>> {
        let slot = self.slot.read();
        if !slot.enabled {
            return Err(LegoError::not_initialized(self.kind));
        }
        Ok(slot.instances.clone())
    }

    /// Sorted instance names; empty when disabled.
    pub fn instance_names(&self) -> Vec<String> {
        let slot = self.slot.read();
        if !slot.enabled {
            return Vec::new();
        }
        let mut names: Vec<String> = slot.instances.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true once any instance has been set.
    pub fn is_enabled(&self) -> bool {
        self.slot.read().enabled
    }

    /// Drops every instance and disables the kind.
    pub fn reset(&self) {
        *self.slot.write() = Slot::default();
    }
}

impl<T: ?Sized> fmt::Debug for ComponentHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("ComponentHandle")
            .field("kind", &self.kind)
            .field("enabled", &slot.enabled)
            .field("instances", &slot.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::thread;

    #[test]
    fn test_get_before_set_is_not_initialized() {
        let handle: ComponentHandle<String> = ComponentHandle::new("logger");

        assert_eq!(handle.get("").unwrap_err().kind(), ErrorKind::NotInitialized);
        assert_eq!(handle.get("any").unwrap_err().kind(), ErrorKind::NotInitialized);
        assert_eq!(handle.get_all().unwrap_err().kind(), ErrorKind::NotInitialized);
        assert!(!handle.is_enabled());
        assert!(handle.instance_names().is_empty());
    }

    #[test]
    fn test_set_then_get_returns_same_value() {
        let handle = ComponentHandle::new("document_store");
        let value = Arc::new("primary-client".to_string());

        handle.set("primary", Arc::clone(&value));

        let got = handle.get("primary").unwrap();
        assert!(Arc::ptr_eq(&got, &value));
        assert!(handle.is_enabled());
    }

    #[test]
    fn test_empty_name_is_default_alias() {
        let handle = ComponentHandle::new("logger");
        handle.set("", Arc::new(1u32));

        assert_eq!(*handle.get(DEFAULT_INSTANCE).unwrap(), 1);
        assert_eq!(*handle.get("").unwrap(), 1);

        handle.set(DEFAULT_INSTANCE, Arc::new(2u32));
        assert_eq!(*handle.get("").unwrap(), 2);
        assert_eq!(handle.instance_names(), vec![DEFAULT_INSTANCE.to_string()]);
    }

    #[test]
    fn test_set_twice_overwrites() {
        let handle = ComponentHandle::new("coordination");
        handle.set("zk", Arc::new("first"));
        handle.set("zk", Arc::new("second"));

        assert_eq!(*handle.get("zk").unwrap(), "second");
        assert_eq!(handle.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_instance() {
        let handle = ComponentHandle::new("document_store");
        handle.set("primary", Arc::new(1u8));

        let err = handle.get("replica").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstanceNotFound);
        assert!(err.to_string().contains("document_store/replica"));
    }

    #[test]
    fn test_get_all_exact_entries() {
        let handle = ComponentHandle::new("document_store");
        handle.set("a", Arc::new(10));
        handle.set("b", Arc::new(20));

        let all = handle.get_all().unwrap();
        let mut entries: Vec<(String, i32)> =
            all.iter().map(|(k, v)| (k.clone(), **v)).collect();
        entries.sort();
        assert_eq!(entries, vec![("a".to_string(), 10), ("b".to_string(), 20)]);
    }

    #[test]
    fn test_reset_disables() {
        let handle = ComponentHandle::new("scheduler");
        handle.set("", Arc::new(()));
        handle.reset();

        assert_eq!(handle.get("").unwrap_err().kind(), ErrorKind::NotInitialized);
        assert!(!handle.is_enabled());

        handle.set("", Arc::new(()));
        assert!(handle.get("").is_ok());
    }

    #[test]
    fn test_unsized_values() {
        let handle: ComponentHandle<dyn Fn() -> u8 + Send + Sync> = ComponentHandle::new("fn");
        handle.set("seven", Arc::new(|| 7));
        assert_eq!((handle.get("seven").unwrap())(), 7);
    }

    #[test]
    fn test_concurrent_sets_are_not_lost() {
        let handle = Arc::new(ComponentHandle::new("document_store"));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    for i in 0..50 {
                        handle.set(&format!("db-{}-{}", t, i), Arc::new(t * 100 + i));
                        assert!(handle.get_all().is_ok());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let all = handle.get_all().unwrap();
        assert_eq!(all.len(), 8 * 50);
        assert_eq!(*all["db-3-17"], 317);
    }
}
