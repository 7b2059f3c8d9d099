//! HTTP controllers: declarations, descriptors and route metadata.
//!
//! A controller is an injectable singleton whose routes are declared with a
//! [`ControllerDefinition`]. Registering the definition writes the base path, the
//! controller-level middleware and the route list into the [`MetadataStore`]; bootstrap
//! reads them back as a [`ControllerDescriptor`].

use crate::di::{Container, Injectable};
use crate::error::{Result, SwitchyardError};
use crate::exception::HandlerResult;
use crate::metadata::{MetadataKey, MetadataStore, TypeKey};
use crate::middleware::MiddlewareRef;
use crate::validation::Shape;
use axum::{body::Body, http::Request, routing::MethodFilter};
use futures::future::BoxFuture;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

mod definition;

pub use definition::{ControllerDefinition, RouteDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn method_filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Put => MethodFilter::PUT,
            Self::Patch => MethodFilter::PATCH,
            Self::Delete => MethodFilter::DELETE,
        }
    }
}

/// Whether a route runs the auth step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    Required,
    NotRequired,
    /// Nothing declared on the route. Treated as required.
    #[default]
    Inherit,
}

impl AuthRequirement {
    pub fn is_required(self) -> bool {
        !matches!(self, Self::NotRequired)
    }
}

impl From<bool> for AuthRequirement {
    fn from(required: bool) -> Self {
        if required {
            Self::Required
        } else {
            Self::NotRequired
        }
    }
}

pub type RouteHandler<C> =
    Arc<dyn Fn(Arc<C>, Request<Body>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// One declared route of controller `C`.
pub struct RouteDescriptor<C> {
    pub method: HttpMethod,
    pub path: Option<String>,
    pub auth: AuthRequirement,
    pub body_shape: Option<Shape>,
    pub query_shape: Option<Shape>,
    pub params_shape: Option<Shape>,
    pub middleware: Vec<MiddlewareRef>,
    pub handler: RouteHandler<C>,
}

impl<C> Clone for RouteDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            method: self.method,
            path: self.path.clone(),
            auth: self.auth,
            body_shape: self.body_shape.clone(),
            query_shape: self.query_shape.clone(),
            params_shape: self.params_shape.clone(),
            middleware: self.middleware.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C> std::fmt::Debug for RouteDescriptor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("auth", &self.auth)
            .field("body_shape", &self.body_shape)
            .field("query_shape", &self.query_shape)
            .field("params_shape", &self.params_shape)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

/// Everything bootstrap needs to know about controller `C`.
pub struct ControllerDescriptor<C> {
    pub path: String,
    pub middleware: Vec<MiddlewareRef>,
    pub routes: Vec<RouteDescriptor<C>>,
}

impl<C> Clone for ControllerDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            middleware: self.middleware.clone(),
            routes: self.routes.clone(),
        }
    }
}

impl<C: 'static> ControllerDescriptor<C> {
    /// Read the descriptor of `C` from the store.
    ///
    /// # Errors
    /// [`SwitchyardError::MalformedController`] when the base path or the route list is
    /// missing.
    pub fn load(store: &MetadataStore) -> Result<Self> {
        let target = TypeKey::of::<C>();
        let path: String = store
            .get(target, MetadataKey::ControllerPath)
            .ok_or_else(|| SwitchyardError::malformed_controller(target.name(), "missing base path"))?;
        let routes: Vec<RouteDescriptor<C>> = store
            .get(target, MetadataKey::ControllerRoutes)
            .ok_or_else(|| SwitchyardError::malformed_controller(target.name(), "missing route list"))?;
        let middleware: Vec<MiddlewareRef> = store
            .get(target, MetadataKey::ControllerMiddleware)
            .unwrap_or_default();

        Ok(Self {
            path,
            middleware,
            routes,
        })
    }
}

/// A resolved controller instance together with its descriptor.
pub struct BoundController<C> {
    pub instance: Arc<C>,
    pub descriptor: ControllerDescriptor<C>,
}

impl<C: Injectable> BoundController<C> {
    pub fn resolve(container: &Container) -> Result<Self> {
        let descriptor = ControllerDescriptor::<C>::load(container.metadata())?;
        let instance = container.resolve::<C>()?;
        Ok(Self {
            instance,
            descriptor,
        })
    }
}
