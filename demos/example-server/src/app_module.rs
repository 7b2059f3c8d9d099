use crate::infrastructure::{Database, RequestLogger};
use crate::modules::chat::ChatController;
use crate::modules::user::{self, UserRepository, UserRepositoryImpl, UserService};
use switchyard::prelude::*;

/// Declares every injectable, middleware and controller of the application.
pub fn declare(store: &MetadataStore) -> Result<()> {
    store.mark_injectable::<Database>(InjectableConfig::singleton())?;
    store.mark_injectable::<UserRepositoryImpl>(InjectableConfig::singleton())?;
    store.bind::<dyn UserRepository, UserRepositoryImpl, _>(
        InjectableConfig::singleton().identifier("UserRepository"),
        |repository| repository as Arc<dyn UserRepository>,
    )?;
    store.mark_injectable::<UserService>(InjectableConfig::per_use())?;

    store.mark_middleware::<RequestLogger>(MiddlewareConfig::new().route("/*").singleton())?;

    user::declare_controller(store)?;
    ChatController::declare(store)?;
    Ok(())
}
