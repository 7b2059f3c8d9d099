//! Environment-backed configuration.

use crate::error::{Result, SwitchyardError};
use crate::exception::{ErrorHandlerConfig, NotFoundConfig};
use dashmap::DashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

/// Prefix of the environment variables read by [`ConfigService::from_env`].
pub const ENV_PREFIX: &str = "SWITCHYARD_";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `SWITCHYARD_*` variable, stored without the prefix.
    pub fn from_env() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            if let Some(key) = key.strip_prefix(ENV_PREFIX) {
                service.set(key, &value);
            }
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parse the value of `key`.
    ///
    /// # Errors
    /// [`SwitchyardError::InvalidConfig`] when the value is present but does not parse.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SwitchyardError::InvalidConfig {
                key: key.to_string(),
                value,
            })
    }

    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(SwitchyardError::InvalidConfig {
                key: key.to_string(),
                value,
            }),
        }
    }
}

/// Framework-provided middleware in front of every request.
#[derive(Debug, Clone, Default)]
pub struct CommonMiddlewareConfig {
    /// Allowed CORS origins. Empty disables CORS handling, `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// Emit a tracing span per request.
    pub request_tracing: bool,
}

#[derive(Debug, Clone)]
pub struct ApplicationConfig {
    pub global_prefix: Option<String>,
    pub bind_address: String,
    /// Mount point of the websocket endpoint. Namespaces live below it.
    pub socket_path: String,
    pub body_limit: usize,
    pub error_handler: ErrorHandlerConfig,
    pub not_found: NotFoundConfig,
    pub common: CommonMiddlewareConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            global_prefix: None,
            bind_address: "0.0.0.0:3000".to_string(),
            socket_path: "/ws".to_string(),
            body_limit: crate::chain::DEFAULT_BODY_LIMIT,
            error_handler: ErrorHandlerConfig::default(),
            not_found: NotFoundConfig::default(),
            common: CommonMiddlewareConfig::default(),
        }
    }
}

impl ApplicationConfig {
    /// Defaults overridden by the values present in `config`.
    ///
    /// Keys: `GLOBAL_PREFIX`, `BIND_ADDRESS`, `SOCKET_PATH`, `BODY_LIMIT`,
    /// `EXPOSE_INTERNAL_ERRORS`, `ERROR_TIMESTAMPS`, `NOT_FOUND_MESSAGE`,
    /// `CORS_ORIGINS` (comma separated) and `REQUEST_TRACING`.
    pub fn from_config(config: &ConfigService) -> Result<Self> {
        let mut app = Self::default();

        if let Some(prefix) = config.get("GLOBAL_PREFIX").filter(|p| !p.is_empty()) {
            app.global_prefix = Some(prefix);
        }
        if let Some(address) = config.get("BIND_ADDRESS") {
            address
                .parse::<std::net::SocketAddr>()
                .map_err(|_| SwitchyardError::InvalidConfig {
                    key: "BIND_ADDRESS".to_string(),
                    value: address.clone(),
                })?;
            app.bind_address = address;
        }
        if let Some(path) = config.get("SOCKET_PATH") {
            app.socket_path = path;
        }
        if let Some(limit) = config.parse("BODY_LIMIT")? {
            app.body_limit = limit;
        }
        if let Some(expose) = config.flag("EXPOSE_INTERNAL_ERRORS")? {
            app.error_handler.expose_internal_errors = expose;
        }
        if let Some(timestamps) = config.flag("ERROR_TIMESTAMPS")? {
            app.error_handler.include_timestamp = timestamps;
        }
        if let Some(message) = config.get("NOT_FOUND_MESSAGE") {
            app.not_found.message = message;
        }
        if let Some(origins) = config.get("CORS_ORIGINS") {
            app.common.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(tracing) = config.flag("REQUEST_TRACING")? {
            app.common.request_tracing = tracing;
        }

        Ok(app)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(&ConfigService::from_env())
    }
}
