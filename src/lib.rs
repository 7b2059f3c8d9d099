//! # Switchyard
//!
//! Declarative request routing with dependency injection for axum.
//!
//! Switchyard assembles an axum application from declarations: controllers and
//! websocket controllers list their routes and events, middleware and validators are
//! attached where they are needed, and bootstrap composes every route into a chain that
//! runs in a fixed order.
//!
//! ## Features
//!
//! - **Dependency Injection**: singleton and per-use lifecycles, trait bindings and
//!   overrides, with `#[derive(Injectable)]` for constructor injection
//! - **Controller-based Routing**: base path plus per-route method, path, auth and
//!   validation shapes
//! - **Composed Chains**: controller middleware, auth, body/query/params validation,
//!   route middleware and handler, always in that order
//! - **WebSockets**: namespaced event handlers with payload validation and
//!   acknowledgements
//! - **Fail-fast Bootstrap**: missing validators, malformed controllers and duplicate
//!   routes stop the application before it serves anything
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchyard::prelude::*;
//!
//! #[derive(Default, DeriveInjectable)]
//! pub struct UserService;
//!
//! impl UserService {
//!     pub fn name_of(&self, id: &str) -> String {
//!         format!("user-{id}")
//!     }
//! }
//!
//! #[derive(DeriveInjectable)]
//! pub struct UserController {
//!     users: Arc<UserService>,
//! }
//!
//! impl UserController {
//!     async fn find(self: Arc<Self>, request: Request<Body>) -> HandlerResult<Json<String>> {
//!         let id = request.uri().path().rsplit('/').next().unwrap_or_default();
//!         Ok(Json(self.users.name_of(id)))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> switchyard::Result<()> {
//!     let store = Arc::new(MetadataStore::new());
//!     store.mark_injectable::<UserService>(InjectableConfig::singleton())?;
//!     ControllerDefinition::<UserController>::new("users")
//!         .route(RouteDefinition::get("/:id").auth_required(false), UserController::find)
//!         .register(&store)?;
//!
//!     ApplicationBuilder::new(store)
//!         .controller::<UserController>()
//!         .config(ApplicationConfig::from_env()?)
//!         .bootstrap()?
//!         .listen()
//!         .await
//! }
//! ```

extern crate self as switchyard;

pub mod application;
pub mod chain;
pub mod config;
pub mod controller;
pub mod di;
pub mod error;
pub mod exception;
pub mod metadata;
pub mod middleware;
pub mod validation;
pub mod websocket;

// Re-export core types
pub use di::{Container, DependencyKey, Injectable, InjectableConfig, Lifecycle};
pub use error::{Result, SwitchyardError};
pub use metadata::{MetadataKey, MetadataStore, TypeKey};

// Re-export macros
pub use switchyard_macro::Injectable as DeriveInjectable;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use switchyard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::application::{Application, ApplicationBuilder, shutdown_signal};
    pub use crate::config::{ApplicationConfig, ConfigService};
    pub use crate::controller::{ControllerDefinition, HttpMethod, RouteDefinition};
    pub use crate::di::{Container, Injectable, InjectableConfig, Lifecycle};
    pub use crate::error::{Result, SwitchyardError};
    pub use crate::exception::{ErrorIdentifier, HandlerError, HandlerResult};
    pub use crate::metadata::MetadataStore;
    pub use crate::middleware::{Middleware, MiddlewareConfig, Next};
    pub use crate::validation::{
        AuthValidator, Handshake, RequestValidator, Shape, SocketAuthValidator,
        ValidationOutcome,
    };
    pub use crate::websocket::{
        Acknowledgement, EventDefinition, SocketContext, WebSocketControllerDefinition,
    };
    pub use crate::DeriveInjectable;
    pub use async_trait::async_trait;
    pub use axum::{
        Json, Router,
        body::Body,
        http::{Request, StatusCode},
        response::{IntoResponse, Response},
    };
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
