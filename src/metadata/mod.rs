//! Type-keyed metadata store.
//!
//! Definitions (controllers, middleware, websocket controllers, injectables) write their
//! routing and injection facts here when they are registered; the container and the
//! bootstrapper read them back. The store is an explicit value, usually shared as
//! `Arc<MetadataStore>`, so independent applications never observe each other's metadata.

use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use strum_macros::Display;

/// Identity of a registered type.
///
/// Equality and hashing only consider the `TypeId`; the name is kept for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Keys under which metadata is attached to a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MetadataKey {
    ControllerPath,
    ControllerRoutes,
    ControllerMiddleware,
    DependencyKey,
    DependencyLifecycle,
    DependencyFactory,
    DependencyParameters,
    MiddlewareConfig,
    WebSocketNamespace,
    WebSocketEventHandlers,
    WebSocketConnectionHandler,
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Concurrent `(type, key) -> value` store.
#[derive(Default)]
pub struct MetadataStore {
    entries: DashMap<(TypeKey, MetadataKey), Entry>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value, cloning it out of the store.
    ///
    /// Returns `None` when nothing is attached or when the attached value has a different
    /// type than `V`.
    pub fn get<V: Clone + 'static>(&self, target: TypeKey, key: MetadataKey) -> Option<V> {
        let entry = self.entries.get(&(target, key))?;
        entry.value().downcast_ref::<V>().cloned()
    }

    /// Attach a value, replacing any previous value for the same key.
    pub fn set<V: Send + Sync + 'static>(&self, target: TypeKey, key: MetadataKey, value: V) {
        tracing::trace!(target_type = %target, key = %key, "Attaching metadata");
        self.entries.insert((target, key), Arc::new(value));
    }

    pub fn has(&self, target: TypeKey, key: MetadataKey) -> bool {
        self.entries.contains_key(&(target, key))
    }

    /// All types carrying a value for `key`.
    pub fn types_with(&self, key: MetadataKey) -> Vec<TypeKey> {
        self.entries
            .iter()
            .filter(|entry| entry.key().1 == key)
            .map(|entry| entry.key().0)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Users;
    struct Orders;

    #[test]
    fn test_set_and_get() {
        let store = MetadataStore::new();
        store.set(
            TypeKey::of::<Users>(),
            MetadataKey::ControllerPath,
            "users".to_string(),
        );

        let path: Option<String> =
            store.get(TypeKey::of::<Users>(), MetadataKey::ControllerPath);
        assert_eq!(path.as_deref(), Some("users"));
        assert!(store.has(TypeKey::of::<Users>(), MetadataKey::ControllerPath));
        assert!(!store.has(TypeKey::of::<Orders>(), MetadataKey::ControllerPath));
    }

    #[test]
    fn test_get_with_wrong_type_is_none() {
        let store = MetadataStore::new();
        store.set(TypeKey::of::<Users>(), MetadataKey::ControllerPath, 42u32);
        let path: Option<String> =
            store.get(TypeKey::of::<Users>(), MetadataKey::ControllerPath);
        assert!(path.is_none());
    }

    #[test]
    fn test_type_key_identity_ignores_name() {
        assert_eq!(TypeKey::of::<Users>(), TypeKey::of::<Users>());
        assert_ne!(TypeKey::of::<Users>(), TypeKey::of::<Orders>());
        assert!(TypeKey::of::<Users>().name().ends_with("Users"));
    }

    #[test]
    fn test_types_with_key() {
        let store = MetadataStore::new();
        store.set(TypeKey::of::<Users>(), MetadataKey::ControllerPath, String::new());
        store.set(TypeKey::of::<Orders>(), MetadataKey::WebSocketNamespace, String::new());
        assert_eq!(
            store.types_with(MetadataKey::ControllerPath),
            vec![TypeKey::of::<Users>()]
        );
    }
}
