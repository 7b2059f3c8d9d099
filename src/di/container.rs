use crate::di::injectable::{DependencyKey, Factory, Lifecycle};
use crate::error::{Result, SwitchyardError};
use crate::metadata::{MetadataKey, MetadataStore, TypeKey};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Thread-safe dependency injection container.
///
/// The container reads dependency keys, lifecycles and factories from its
/// [`MetadataStore`] and keeps one [`DependencyRecord`] per key. Singleton instances live
/// as long as the container; dropping the container releases them.
pub struct Container {
    metadata: Arc<MetadataStore>,
    records: DashMap<DependencyKey, Arc<DependencyRecord>>,
}

struct DependencyRecord {
    key: DependencyKey,
    provider: &'static str,
    lifecycle: Lifecycle,
    /// A `Factory<T>` for the type the record was created for.
    factory: Arc<dyn Any + Send + Sync>,
    /// An `Arc<T>`, only ever set for singletons.
    instance: OnceLock<Box<dyn Any + Send + Sync>>,
    init_lock: Mutex<()>,
    resolved: AtomicBool,
}

impl DependencyRecord {
    fn new<T: ?Sized + Send + Sync + 'static>(
        key: DependencyKey,
        provider: &'static str,
        lifecycle: Lifecycle,
        factory: Factory<T>,
    ) -> Self {
        Self {
            key,
            provider,
            lifecycle,
            factory: Arc::new(factory),
            instance: OnceLock::new(),
            init_lock: Mutex::new(()),
            resolved: AtomicBool::new(false),
        }
    }

    fn cached<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        match self.instance.get() {
            None => Ok(None),
            Some(instance) => instance
                .downcast_ref::<Arc<T>>()
                .cloned()
                .map(Some)
                .ok_or_else(|| SwitchyardError::DowncastFailed {
                    type_name: std::any::type_name::<T>().to_string(),
                }),
        }
    }
}

thread_local! {
    static RESOLVING: RefCell<Vec<DependencyKey>> = const { RefCell::new(Vec::new()) };
}

/// Marks a key as under construction on the current thread.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(key: &DependencyKey) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(key) {
                let cycle = stack
                    .iter()
                    .chain(std::iter::once(key))
                    .map(DependencyKey::as_str)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(SwitchyardError::CircularDependency { cycle });
            }
            stack.push(key.clone());
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Container {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        tracing::debug!("Creating new DI container");
        Self {
            metadata,
            records: DashMap::new(),
        }
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    /// Resolve `T` according to its lifecycle.
    ///
    /// `T` may be a concrete type or a trait object bound with [`MetadataStore::bind`].
    ///
    /// # Errors
    /// [`SwitchyardError::NotInjectable`] if `T` carries no dependency key, and any error
    /// raised while constructing it or its dependencies.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let target = TypeKey::of::<T>();
        let key = self
            .metadata
            .dependency_key(target)
            .ok_or_else(SwitchyardError::not_injectable::<T>)?;

        let record = self.record_for::<T>(target, &key)?;
        record.resolved.store(true, Ordering::Release);

        match record.lifecycle {
            Lifecycle::Singleton => {
                if let Some(instance) = record.cached::<T>()? {
                    tracing::trace!(dependency = %key, "Returning existing instance");
                    return Ok(instance);
                }

                let _guard = ResolutionGuard::enter(&record.key)?;
                let _lock = record
                    .init_lock
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);

                // Another caller may have finished construction while we waited.
                if let Some(instance) = record.cached::<T>()? {
                    return Ok(instance);
                }

                let instance = self.construct::<T>(&record)?;
                let _ = record.instance.set(Box::new(Arc::clone(&instance)));
                tracing::debug!(
                    dependency = %key,
                    provider = record.provider,
                    "Created singleton instance"
                );
                Ok(instance)
            }
            Lifecycle::PerUse => {
                let _guard = ResolutionGuard::enter(&record.key)?;
                tracing::trace!(dependency = %key, "Returning new instance");
                self.construct::<T>(&record)
            }
        }
    }

    /// Replace the registration of `A` with `B`, presented as `A` through `cast`.
    ///
    /// Must happen before `A` is resolved for the first time. The replacement keeps its
    /// own lifecycle and is cached under `A`'s key.
    ///
    /// # Errors
    /// [`SwitchyardError::NotInjectable`] if either type is not injectable,
    /// [`SwitchyardError::AlreadyResolved`] if `A` has been resolved already.
    pub fn override_dependency<A, B, F>(&self, cast: F) -> Result<()>
    where
        A: ?Sized + Send + Sync + 'static,
        B: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<B>) -> Arc<A> + Send + Sync + 'static,
    {
        let original = TypeKey::of::<A>();
        let replacement = TypeKey::of::<B>();

        let key = self
            .metadata
            .dependency_key(original)
            .ok_or_else(SwitchyardError::not_injectable::<A>)?;
        let replacement_factory: Factory<B> = self
            .metadata
            .get(replacement, MetadataKey::DependencyFactory)
            .ok_or_else(SwitchyardError::not_injectable::<B>)?;

        let factory: Factory<A> =
            Arc::new(move |container: &Container| replacement_factory(container).map(&cast));
        let record = Arc::new(DependencyRecord::new::<A>(
            key.clone(),
            replacement.name(),
            self.metadata.lifecycle_of(replacement),
            factory,
        ));

        match self.records.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().resolved.load(Ordering::Acquire) {
                    return Err(SwitchyardError::AlreadyResolved {
                        type_name: original.name().to_string(),
                    });
                }
                entry.insert(record);
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }

        tracing::info!(
            dependency = %key,
            replacement = replacement.name(),
            "Dependency overridden"
        );
        Ok(())
    }

    /// Whether a record exists for `T`, i.e. it was resolved or overridden.
    pub fn has_registration<T: ?Sized + 'static>(&self) -> bool {
        self.metadata
            .dependency_key(TypeKey::of::<T>())
            .is_some_and(|key| self.records.contains_key(&key))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_for<T: ?Sized + Send + Sync + 'static>(
        &self,
        target: TypeKey,
        key: &DependencyKey,
    ) -> Result<Arc<DependencyRecord>> {
        if let Some(record) = self.records.get(key) {
            return Ok(Arc::clone(record.value()));
        }

        let factory: Factory<T> = self
            .metadata
            .get(target, MetadataKey::DependencyFactory)
            .ok_or_else(SwitchyardError::not_injectable::<T>)?;
        let lifecycle = self.metadata.lifecycle_of(target);
        let record = Arc::new(DependencyRecord::new::<T>(
            key.clone(),
            target.name(),
            lifecycle,
            factory,
        ));

        let record = Arc::clone(self.records.entry(key.clone()).or_insert(record).value());
        tracing::debug!(
            dependency = %key,
            lifecycle = %lifecycle,
            parameters = ?self.metadata.dependency_parameters(target),
            "Registered dependency"
        );
        Ok(record)
    }

    fn construct<T: ?Sized + Send + Sync + 'static>(
        &self,
        record: &DependencyRecord,
    ) -> Result<Arc<T>> {
        let factory = record.factory.downcast_ref::<Factory<T>>().ok_or_else(|| {
            SwitchyardError::DowncastFailed {
                type_name: std::any::type_name::<T>().to_string(),
            }
        })?;
        factory(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Injectable, InjectableConfig};
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default, crate::DeriveInjectable)]
    struct Config {
        retries: u32,
    }

    #[derive(crate::DeriveInjectable)]
    struct Repository {
        config: Arc<Config>,
    }

    #[derive(crate::DeriveInjectable)]
    struct Service {
        repository: Arc<Repository>,
        config: Arc<Config>,
    }

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Default, crate::DeriveInjectable)]
    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[derive(Default, crate::DeriveInjectable)]
    struct French;

    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }

    fn container_with(store: MetadataStore) -> Container {
        Container::new(Arc::new(store))
    }

    #[test]
    fn test_singleton_returns_same_instance() {
        let store = MetadataStore::new();
        store.mark_injectable::<Config>(InjectableConfig::singleton()).unwrap();
        let container = container_with(store);

        let first = container.resolve::<Config>().unwrap();
        let second = container.resolve::<Config>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.retries, 0);
    }

    #[test]
    fn test_per_use_returns_fresh_instances() {
        let store = MetadataStore::new();
        store.mark_injectable::<Config>(InjectableConfig::per_use()).unwrap();
        let container = container_with(store);

        let first = container.resolve::<Config>().unwrap();
        let second = container.resolve::<Config>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_recursive_construction_shares_singletons() {
        let store = MetadataStore::new();
        store.mark_injectable::<Config>(InjectableConfig::singleton()).unwrap();
        store.mark_injectable::<Repository>(InjectableConfig::per_use()).unwrap();
        store.mark_injectable::<Service>(InjectableConfig::singleton()).unwrap();
        let container = container_with(store);

        let service = container.resolve::<Service>().unwrap();
        assert!(Arc::ptr_eq(&service.config, &service.repository.config));
        assert_eq!(
            Service::dependencies(),
            vec![TypeKey::of::<Repository>(), TypeKey::of::<Config>()]
        );
    }

    #[test]
    fn test_unmarked_type_is_not_injectable() {
        let store = MetadataStore::new();
        store.mark_injectable::<Repository>(InjectableConfig::singleton()).unwrap();
        let container = container_with(store);

        // Resolving the dependency directly and through a dependent both fail.
        assert!(matches!(
            container.resolve::<Config>(),
            Err(SwitchyardError::NotInjectable { .. })
        ));
        assert!(matches!(
            container.resolve::<Repository>(),
            Err(SwitchyardError::NotInjectable { .. })
        ));
        assert!(matches!(
            container.resolve::<Config>(),
            Err(SwitchyardError::NotInjectable { .. })
        ));
    }

    #[test]
    fn test_concurrent_first_resolution_constructs_once() {
        static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

        struct Slow;

        impl Injectable for Slow {
            fn inject(_container: &Container) -> Result<Self> {
                CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                Ok(Slow)
            }
        }

        let store = MetadataStore::new();
        store.mark_injectable::<Slow>(InjectableConfig::singleton()).unwrap();
        let container = container_with(store);
        let barrier = Barrier::new(8);

        let instances: Vec<Arc<Slow>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        container.resolve::<Slow>().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_trait_binding_and_override_before_resolution() {
        let store = MetadataStore::new();
        store.mark_injectable::<English>(InjectableConfig::singleton()).unwrap();
        store.mark_injectable::<French>(InjectableConfig::singleton()).unwrap();
        store
            .bind::<dyn Greeter, English, _>(InjectableConfig::singleton(), |g| g as Arc<dyn Greeter>)
            .unwrap();
        let container = container_with(store);

        container
            .override_dependency::<dyn Greeter, French, _>(|g| g as Arc<dyn Greeter>)
            .unwrap();
        assert!(container.has_registration::<dyn Greeter>());

        let greeter = container.resolve::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "bonjour");
        assert!(Arc::ptr_eq(
            &greeter,
            &container.resolve::<dyn Greeter>().unwrap()
        ));
    }

    #[test]
    fn test_override_after_resolution_is_rejected() {
        let store = MetadataStore::new();
        store.mark_injectable::<English>(InjectableConfig::singleton()).unwrap();
        store.mark_injectable::<French>(InjectableConfig::singleton()).unwrap();
        store
            .bind::<dyn Greeter, English, _>(InjectableConfig::per_use(), |g| g as Arc<dyn Greeter>)
            .unwrap();
        let container = container_with(store);

        assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "hello");
        let err = container
            .override_dependency::<dyn Greeter, French, _>(|g| g as Arc<dyn Greeter>)
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::AlreadyResolved { .. }));
        assert_eq!(container.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn test_override_requires_injectable_types() {
        let store = MetadataStore::new();
        store.mark_injectable::<English>(InjectableConfig::singleton()).unwrap();
        store
            .bind::<dyn Greeter, English, _>(InjectableConfig::singleton(), |g| g as Arc<dyn Greeter>)
            .unwrap();
        let container = container_with(store);

        let err = container
            .override_dependency::<dyn Greeter, French, _>(|g| g as Arc<dyn Greeter>)
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::NotInjectable { .. }));

        let err = container
            .override_dependency::<Config, English, _>(|_| Arc::new(Config { retries: 1 }))
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::NotInjectable { .. }));
        assert!(!container.has_registration::<dyn Greeter>());
    }

    #[test]
    fn test_circular_dependency_is_reported() {
        struct Ping;
        struct Pong;

        impl Injectable for Ping {
            fn inject(container: &Container) -> Result<Self> {
                container.resolve::<Pong>()?;
                Ok(Ping)
            }
        }

        impl Injectable for Pong {
            fn inject(container: &Container) -> Result<Self> {
                container.resolve::<Ping>()?;
                Ok(Pong)
            }
        }

        let store = MetadataStore::new();
        store.mark_injectable::<Ping>(InjectableConfig::singleton()).unwrap();
        store.mark_injectable::<Pong>(InjectableConfig::singleton()).unwrap();
        let container = container_with(store);

        let err = container.resolve::<Ping>().err().unwrap();
        assert!(matches!(err, SwitchyardError::CircularDependency { .. }));
    }
}
