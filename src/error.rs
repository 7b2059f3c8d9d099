use thiserror::Error;

pub type Result<T> = std::result::Result<T, SwitchyardError>;

/// Configuration-shape errors.
///
/// Every variant describes a programming mistake detected while declaring types or
/// bootstrapping the application. None of them are recoverable per request; they are
/// meant to stop the service before it accepts traffic.
#[derive(Debug, Error)]
pub enum SwitchyardError {
    #[error("Type is not marked as injectable: {type_name}")]
    NotInjectable { type_name: String },

    #[error("Dependency {type_name} was already resolved and can no longer be overridden")]
    AlreadyResolved { type_name: String },

    #[error("Dependency key '{key}' is already owned by {owner}, cannot mark {type_name}")]
    DuplicateDependencyKey {
        key: String,
        owner: String,
        type_name: String,
    },

    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Type is not marked as middleware: {type_name}")]
    NotMiddleware { type_name: String },

    #[error("Controller {type_name} is not declared correctly: {reason}")]
    MalformedController { type_name: String, reason: String },

    #[error("WebSocket controller {type_name} is not declared correctly: {reason}")]
    MalformedWebSocketController { type_name: String, reason: String },

    #[error("No {collaborator} registered but {target} requires it")]
    MissingCollaborator {
        collaborator: crate::chain::Collaborator,
        target: String,
    },

    #[error("WebSocket controller {type_name} declares more than one connection handler")]
    DuplicateConnectionHandler { type_name: String },

    #[error("Route {method} {path} is declared more than once")]
    DuplicateRoute { method: String, path: String },

    #[error("Route {path} conflicts with {existing}: parameter names or a wildcard overlap")]
    ConflictingRoute { path: String, existing: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SwitchyardError {
    pub fn not_injectable<T: ?Sized>() -> Self {
        Self::NotInjectable {
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    pub fn malformed_controller(type_name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedController {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed_websocket_controller(type_name: &str, reason: impl Into<String>) -> Self {
        Self::MalformedWebSocketController {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}
