//! Keyed entity registry: one shared, pointer-stable instance per string key.
//!
//! Contacts and dispatchers are identified by their key. Reconfiguring a key
//! mutates the existing instance in place, so anything already holding the
//! `Arc` keeps seeing the live object across configuration reloads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::core::errors::{BodewellError, Result};

/// A type that can live in a [`KeyedRegistry`].
pub trait Keyed: Send + Sync + 'static {
    /// Configuration payload applied by [`KeyedRegistry::get_or_create`].
    type Config;

    /// Build the default instance for a fresh key.
    fn create(id: &str) -> Self;

    /// Apply a configuration payload to this instance.
    fn configure(&mut self, id: &str, config: Self::Config) -> Result<()>;
}

/// A registry-managed entity. Identity is the `Arc` pointer.
pub struct Entity<T> {
    id: String,
    inner: RwLock<T>,
    frozen: AtomicBool,
}

impl<T: Keyed> Entity<T> {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            inner: RwLock::new(T::create(id)),
            frozen: AtomicBool::new(false),
        }
    }

    /// Immutable identifier (the registry key).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read access to the current configuration.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Whether the entity has been purged.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    fn configure(&self, config: T::Config) -> Result<()> {
        let mut inner = self.inner.write();
        if self.is_frozen() {
            return Err(BodewellError::Frozen {
                id: self.id.clone(),
            });
        }
        inner.configure(&self.id, config)
    }

    fn freeze(&self) {
        // Taking the write lock orders the freeze after any in-flight configure.
        let _guard = self.inner.write();
        self.frozen.store(true, Ordering::Release);
    }
}

impl<T: fmt::Debug> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("inner", &*self.inner.read())
            .field("frozen", &self.frozen.load(Ordering::Relaxed))
            .finish()
    }
}

/// Identity cache mapping keys to shared entities.
pub struct KeyedRegistry<T> {
    entries: Mutex<HashMap<String, Arc<Entity<T>>>>,
}

impl<T: Keyed> Default for KeyedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed> KeyedRegistry<T> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the entity for `key`, creating it if needed, then apply `config`.
    ///
    /// A fresh entity that rejects its first configuration is not kept.
    pub fn get_or_create(&self, key: &str, config: T::Config) -> Result<Arc<Entity<T>>> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            let existing = Arc::clone(existing);
            existing.configure(config)?;
            return Ok(existing);
        }

        let entity = Arc::new(Entity::new(key));
        entity.configure(config)?;
        entries.insert(key.to_string(), Arc::clone(&entity));
        Ok(entity)
    }

    /// Look up without creating.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Entity<T>>> {
        self.entries.lock().get(key).cloned()
    }

    /// Resolve each key, creating default entities for unknown ones.
    /// Existing entities are returned untouched.
    pub fn select<I, S>(&self, keys: I) -> Vec<Arc<Entity<T>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = self.entries.lock();
        keys.into_iter()
            .map(|key| {
                let key = key.as_ref();
                Arc::clone(
                    entries
                        .entry(key.to_string())
                        .or_insert_with(|| Arc::new(Entity::new(key))),
                )
            })
            .collect()
    }

    /// Drop the registry entry for `entity` (only if it is the registered
    /// instance for its key) and freeze it.
    pub fn purge(&self, entity: &Arc<Entity<T>>) {
        {
            let mut entries = self.entries.lock();
            if entries
                .get(entity.id())
                .is_some_and(|current| Arc::ptr_eq(current, entity))
            {
                entries.remove(entity.id());
            }
        }
        entity.freeze();
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// No keys registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T> fmt::Debug for KeyedRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("KeyedRegistry").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Keyed, KeyedRegistry};
    use crate::core::errors::{BodewellError, Result};

    #[derive(Debug, Default)]
    struct Counter {
        label: String,
        applied: u32,
    }

    impl Keyed for Counter {
        type Config = Option<String>;

        fn create(_id: &str) -> Self {
            Self::default()
        }

        fn configure(&mut self, id: &str, config: Self::Config) -> Result<()> {
            match config.as_deref() {
                Some("reject") => Err(BodewellError::InvalidConfig {
                    details: format!("{id} rejected"),
                }),
                Some(label) => {
                    self.label = label.to_string();
                    self.applied += 1;
                    Ok(())
                }
                None => Ok(()),
            }
        }
    }

    #[test]
    fn same_key_returns_same_instance_and_reconfigures() {
        let registry = KeyedRegistry::<Counter>::new();
        let first = registry
            .get_or_create("a", Some("one".to_string()))
            .expect("create");
        let second = registry
            .get_or_create("a", Some("two".to_string()))
            .expect("reconfigure");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.read().label, "two");
        assert_eq!(first.read().applied, 2);
        assert_eq!(first.id(), "a");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn select_creates_defaults_and_keeps_existing_config() {
        let registry = KeyedRegistry::<Counter>::new();
        let configured = registry
            .get_or_create("x", Some("set".to_string()))
            .expect("create");

        let selected = registry.select(["x", "y"]);
        assert_eq!(selected.len(), 2);
        assert!(Arc::ptr_eq(&selected[0], &configured));
        assert_eq!(selected[0].read().label, "set");
        assert_eq!(selected[1].id(), "y");
        assert_eq!(selected[1].read().applied, 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn purge_removes_and_freezes() {
        let registry = KeyedRegistry::<Counter>::new();
        let entity = registry.get_or_create("k", None).expect("create");
        registry.purge(&entity);

        assert!(entity.is_frozen());
        assert!(registry.get("k").is_none());

        let fresh = registry
            .get_or_create("k", Some("new".to_string()))
            .expect("recreate");
        assert!(!Arc::ptr_eq(&entity, &fresh));
    }

    #[test]
    fn purging_stale_instance_keeps_current_entry() {
        let registry = KeyedRegistry::<Counter>::new();
        let stale = registry.get_or_create("k", None).expect("create");
        registry.purge(&stale);
        let current = registry.get_or_create("k", None).expect("recreate");

        registry.purge(&stale);
        let looked_up = registry.get("k").expect("current entry survives");
        assert!(Arc::ptr_eq(&looked_up, &current));
    }

    #[test]
    fn rejected_first_config_does_not_register() {
        let registry = KeyedRegistry::<Counter>::new();
        let err = registry
            .get_or_create("bad", Some("reject".to_string()))
            .expect_err("rejected");
        assert_eq!(err.code(), "BW-1005");
        assert!(registry.is_empty());
    }
}
