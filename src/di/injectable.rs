use crate::di::Container;
use crate::error::{Result, SwitchyardError};
use crate::metadata::{MetadataKey, MetadataStore, TypeKey};
use std::fmt;
use std::sync::Arc;
use strum_macros::Display;

/// Trait for types that can be constructed by the DI container.
///
/// This trait is typically implemented automatically via `#[derive(Injectable)]`, which
/// resolves every `Arc<T>` field from the container and fills the remaining fields with
/// `Default::default()`.
///
/// Implementing the trait does not make a type resolvable by itself: the type still has
/// to be marked in a [`MetadataStore`] (see [`MetadataStore::mark_injectable`]), usually
/// together with the rest of the application's declarations.
///
/// # Example
/// ```
/// use switchyard::{Injectable, InjectableConfig, MetadataStore};
/// use std::sync::Arc;
///
/// #[derive(Default, switchyard::DeriveInjectable)]
/// pub struct Clock;
///
/// #[derive(switchyard::DeriveInjectable)]
/// pub struct ReportService {
///     clock: Arc<Clock>,
/// }
///
/// let store = MetadataStore::new();
/// store.mark_injectable::<Clock>(InjectableConfig::singleton()).unwrap();
/// store.mark_injectable::<ReportService>(InjectableConfig::per_use()).unwrap();
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Create an instance by resolving dependencies from the container
    ///
    /// # Errors
    /// Returns an error if any required dependency cannot be resolved.
    fn inject(container: &Container) -> Result<Self>;

    /// Types resolved by [`Injectable::inject`], in constructor order.
    fn dependencies() -> Vec<TypeKey> {
        Vec::new()
    }
}

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Lifecycle {
    /// One instance per container, created on first resolution.
    Singleton,
    /// A fresh instance for every resolution.
    #[default]
    PerUse,
}

/// Process-unique identifier of an injectable type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DependencyKey(Arc<str>);

impl DependencyKey {
    pub fn new(identifier: impl AsRef<str>) -> Self {
        Self(Arc::from(identifier.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DependencyKey({})", self.0)
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options used when marking a type as injectable.
#[derive(Debug, Clone, Default)]
pub struct InjectableConfig {
    identifier: Option<String>,
    lifecycle: Lifecycle,
}

impl InjectableConfig {
    pub fn singleton() -> Self {
        Self {
            identifier: None,
            lifecycle: Lifecycle::Singleton,
        }
    }

    pub fn per_use() -> Self {
        Self::default()
    }

    /// Use an explicit identifier instead of the type name as dependency key.
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

/// Constructor stored in the metadata store for every injectable type.
pub(crate) type Factory<T> = Arc<dyn Fn(&Container) -> Result<Arc<T>> + Send + Sync>;

impl MetadataStore {
    /// Mark `T` as injectable, constructed through [`Injectable::inject`].
    pub fn mark_injectable<T: Injectable>(&self, config: InjectableConfig) -> Result<DependencyKey> {
        self.mark_provider::<T, _>(config, T::dependencies(), |container| {
            T::inject(container).map(Arc::new)
        })
    }

    /// Mark a trait object type as injectable, backed by `Impl`.
    ///
    /// `Impl` is resolved through the container, so it has to be marked injectable as
    /// well; a singleton `Impl` is shared between the binding and direct resolutions.
    pub fn bind<Trait, Impl, F>(&self, config: InjectableConfig, cast: F) -> Result<DependencyKey>
    where
        Trait: ?Sized + Send + Sync + 'static,
        Impl: Send + Sync + 'static,
        F: Fn(Arc<Impl>) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.mark_provider::<Trait, _>(config, vec![TypeKey::of::<Impl>()], move |container| {
            container.resolve::<Impl>().map(&cast)
        })
    }

    /// Mark `T` as injectable with an explicit factory.
    ///
    /// Re-marking the same type replaces its previous metadata. Claiming a dependency key
    /// that already belongs to another type fails with
    /// [`SwitchyardError::DuplicateDependencyKey`].
    pub fn mark_provider<T, F>(
        &self,
        config: InjectableConfig,
        dependencies: Vec<TypeKey>,
        factory: F,
    ) -> Result<DependencyKey>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let target = TypeKey::of::<T>();
        let key = DependencyKey::new(config.identifier.as_deref().unwrap_or(target.name()));

        for owner in self.types_with(MetadataKey::DependencyKey) {
            if owner == target {
                continue;
            }
            if self.get::<DependencyKey>(owner, MetadataKey::DependencyKey).as_ref() == Some(&key) {
                return Err(SwitchyardError::DuplicateDependencyKey {
                    key: key.to_string(),
                    owner: owner.name().to_string(),
                    type_name: target.name().to_string(),
                });
            }
        }

        let factory: Factory<T> = Arc::new(factory);
        self.set(target, MetadataKey::DependencyKey, key.clone());
        self.set(target, MetadataKey::DependencyLifecycle, config.lifecycle);
        self.set(target, MetadataKey::DependencyFactory, factory);
        self.set(target, MetadataKey::DependencyParameters, dependencies);

        tracing::debug!(
            dependency = %key,
            lifecycle = %config.lifecycle,
            "Marked type as injectable"
        );
        Ok(key)
    }

    pub fn dependency_key(&self, target: TypeKey) -> Option<DependencyKey> {
        self.get(target, MetadataKey::DependencyKey)
    }

    pub fn is_injectable<T: ?Sized + 'static>(&self) -> bool {
        self.has(TypeKey::of::<T>(), MetadataKey::DependencyKey)
    }

    /// Lifecycle attached to `target`, `PerUse` unless marked otherwise.
    pub fn lifecycle_of(&self, target: TypeKey) -> Lifecycle {
        self.get(target, MetadataKey::DependencyLifecycle)
            .unwrap_or_default()
    }

    pub fn dependency_parameters(&self, target: TypeKey) -> Vec<TypeKey> {
        self.get(target, MetadataKey::DependencyParameters)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mailer;

    impl Injectable for Mailer {
        fn inject(_container: &Container) -> Result<Self> {
            Ok(Mailer)
        }
    }

    struct Notifier;

    impl Injectable for Notifier {
        fn inject(_container: &Container) -> Result<Self> {
            Ok(Notifier)
        }
    }

    #[test]
    fn test_default_key_is_type_name() {
        let store = MetadataStore::new();
        let key = store.mark_injectable::<Mailer>(InjectableConfig::default()).unwrap();
        assert!(key.as_str().ends_with("Mailer"));
        assert_eq!(store.lifecycle_of(TypeKey::of::<Mailer>()), Lifecycle::PerUse);
    }

    #[test]
    fn test_two_types_cannot_share_a_key() {
        let store = MetadataStore::new();
        store
            .mark_injectable::<Mailer>(InjectableConfig::singleton().identifier("outbox"))
            .unwrap();
        let err = store
            .mark_injectable::<Notifier>(InjectableConfig::singleton().identifier("outbox"))
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::DuplicateDependencyKey { .. }));
    }

    #[test]
    fn test_re_marking_same_type_is_allowed() {
        let store = MetadataStore::new();
        store
            .mark_injectable::<Mailer>(InjectableConfig::per_use().identifier("outbox"))
            .unwrap();
        store
            .mark_injectable::<Mailer>(InjectableConfig::singleton().identifier("outbox"))
            .unwrap();
        assert_eq!(store.lifecycle_of(TypeKey::of::<Mailer>()), Lifecycle::Singleton);
    }
}
