use switchyard::prelude::*;
use switchyard::validation::{BearerTokenValidator, RequiredFieldsValidator};

mod app_module;
mod infrastructure;
mod modules;

use infrastructure::{RequestLogger, TokenSocketAuth};
use modules::chat::ChatController;
use modules::user::UserController;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting example server");

    let store = Arc::new(MetadataStore::new());
    app_module::declare(&store)?;

    let tokens = std::env::var("API_TOKENS").unwrap_or_else(|_| "dev-token".to_string());
    let tokens: Vec<String> = tokens.split(',').map(str::to_string).collect();

    let app = ApplicationBuilder::new(store)
        .config(ApplicationConfig::from_env()?)
        .controller::<UserController>()
        .websocket_controller::<ChatController>()
        .before_controllers::<RequestLogger>()
        .auth_validator(BearerTokenValidator::new(tokens.clone()))
        .body_validator(RequiredFieldsValidator)
        .params_validator(RequiredFieldsValidator)
        .socket_data_validator(RequiredFieldsValidator)
        .socket_auth_validator(TokenSocketAuth::new(tokens))
        .bootstrap()?;

    for (method, path) in app.routes() {
        tracing::info!("{method} {path}");
    }

    app.listen().await
}
