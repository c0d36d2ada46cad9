//! Adapter configuration file.
//!
//! The file uses the kebab-case keys of the classic adapter JSON. YAML is
//! accepted as well since JSON is a subset of it. Before deserialisation every
//! string value goes through `${...}` placeholder resolution
//! (see [`secrets::DefaultSecretResolver`]); [`AdapterConfig::load`] reads a
//! `.env` file into the process environment first.

mod builder;
pub mod secrets;

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::constants::{DEFAULT_MIN_TIME_BETWEEN_JWKS_REQUESTS, DEFAULT_PUBLIC_KEY_CACHE_TTL};
use crate::deployment::{SslRequired, TokenStore};

pub use builder::DeploymentBuilder;
pub use secrets::{DefaultSecretResolver, SecretResolver};

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationDetail {
    pub key: String,
    pub message: String,
}

impl ConfigValidationDetail {
    fn new(key: &str, message: &str) -> Self {
        Self {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Error type for loading and validating adapter configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O or parse error occurred while reading the configuration.
    Load(String),
    /// A `${...}` placeholder references an unset variable.
    Placeholder(String),
    /// The configuration parsed but is not usable. All violations are listed.
    Validation(Vec<ConfigValidationDetail>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Placeholder(name) => write!(f, "Unresolved config placeholder: {name}"),
            ConfigError::Validation(details) => {
                write!(f, "Config validation errors:")?;
                for detail in details {
                    write!(f, "\n  - {}: {}", detail.key, detail.message)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Deserialised adapter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdapterConfig {
    pub realm: Option<String>,
    pub resource: Option<String>,
    pub auth_server_url: Option<String>,
    pub auth_server_url_for_backend_requests: Option<String>,
    pub realm_public_key: Option<String>,
    pub ssl_required: SslRequired,
    #[serde(deserialize_with = "lenient")]
    pub confidential_port: i32,
    #[serde(deserialize_with = "lenient")]
    pub bearer_only: bool,
    #[serde(deserialize_with = "lenient")]
    pub autodetect_bearer_only: bool,
    #[serde(deserialize_with = "lenient")]
    pub enable_basic_auth: bool,
    #[serde(deserialize_with = "lenient")]
    pub public_client: bool,
    pub credentials: HashMap<String, serde_json::Value>,
    #[serde(deserialize_with = "lenient")]
    pub use_resource_role_mappings: bool,
    #[serde(deserialize_with = "lenient")]
    pub enable_cors: bool,
    #[serde(deserialize_with = "lenient")]
    pub cors_max_age: i32,
    pub cors_allowed_headers: Option<String>,
    pub cors_allowed_methods: Option<String>,
    pub cors_exposed_headers: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub expose_token: bool,
    #[serde(deserialize_with = "lenient")]
    pub always_refresh_token: bool,
    #[serde(deserialize_with = "lenient")]
    pub register_node_at_startup: bool,
    #[serde(deserialize_with = "lenient")]
    pub register_node_period: i32,
    pub token_store: TokenStore,
    pub adapter_state_cookie_path: Option<String>,
    pub principal_attribute: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub turn_off_change_session_id_on_login: bool,
    #[serde(deserialize_with = "lenient")]
    pub token_minimum_time_to_live: u64,
    #[serde(deserialize_with = "lenient")]
    pub min_time_between_jwks_requests: u64,
    #[serde(deserialize_with = "lenient")]
    pub public_key_cache_ttl: u64,
    #[serde(rename = "enable-pkce", deserialize_with = "lenient")]
    pub pkce: bool,
    #[serde(deserialize_with = "lenient")]
    pub ignore_oauth_query_parameter: bool,
    pub redirect_rewrite_rules: HashMap<String, String>,
    #[serde(deserialize_with = "lenient")]
    pub verify_token_audience: bool,
    #[serde(deserialize_with = "lenient")]
    pub delegate_bearer_error_response_sending: bool,
    pub scope: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    pub connection_timeout_millis: Option<u64>,
    #[serde(deserialize_with = "lenient_opt")]
    pub socket_timeout_millis: Option<u64>,
    #[serde(deserialize_with = "lenient")]
    pub disable_trust_manager: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            realm: None,
            resource: None,
            auth_server_url: None,
            auth_server_url_for_backend_requests: None,
            realm_public_key: None,
            ssl_required: SslRequired::External,
            confidential_port: -1,
            bearer_only: false,
            autodetect_bearer_only: false,
            enable_basic_auth: false,
            public_client: false,
            credentials: HashMap::new(),
            use_resource_role_mappings: false,
            enable_cors: false,
            cors_max_age: -1,
            cors_allowed_headers: None,
            cors_allowed_methods: None,
            cors_exposed_headers: None,
            expose_token: false,
            always_refresh_token: false,
            register_node_at_startup: false,
            register_node_period: -1,
            token_store: TokenStore::Session,
            adapter_state_cookie_path: None,
            principal_attribute: None,
            turn_off_change_session_id_on_login: false,
            token_minimum_time_to_live: 0,
            min_time_between_jwks_requests: DEFAULT_MIN_TIME_BETWEEN_JWKS_REQUESTS,
            public_key_cache_ttl: DEFAULT_PUBLIC_KEY_CACHE_TTL,
            pkce: false,
            ignore_oauth_query_parameter: false,
            redirect_rewrite_rules: HashMap::new(),
            verify_token_audience: false,
            delegate_bearer_error_response_sending: false,
            scope: None,
            connection_timeout_millis: None,
            socket_timeout_millis: None,
            disable_trust_manager: false,
        }
    }
}

impl AdapterConfig {
    /// Parse a YAML or JSON document, resolving placeholders from the
    /// environment and secret files.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_str_with_resolver(content, &DefaultSecretResolver)
    }

    pub fn from_yaml_str_with_resolver(
        content: &str,
        resolver: &dyn SecretResolver,
    ) -> Result<Self, ConfigError> {
        let mut tree: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
        secrets::resolve_tree(&mut tree, resolver)?;
        serde_yaml::from_value(tree).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Load `.env` (never overriding variables already set), then read and
    /// parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded adapter configuration");
        Self::from_yaml_str(&content)
    }

    /// Check that the configuration describes a usable deployment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if is_blank(&self.realm) {
            errors.push(ConfigValidationDetail::new("realm", "must be set"));
        }
        if is_blank(&self.resource) {
            errors.push(ConfigValidationDetail::new("resource", "must be set"));
        }
        if is_blank(&self.auth_server_url) {
            if !self.bearer_only {
                errors.push(ConfigValidationDetail::new(
                    "auth-server-url",
                    "must be set unless bearer-only",
                ));
            } else if is_blank(&self.realm_public_key) {
                errors.push(ConfigValidationDetail::new(
                    "realm-public-key",
                    "required for bearer-only clients without auth-server-url",
                ));
            }
        }
        if !self.bearer_only && !self.public_client && self.credentials.is_empty() {
            errors.push(ConfigValidationDetail::new(
                "credentials",
                "must be set for confidential clients",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw<T> {
    Value(T),
    Text(String),
}

/// Accept either the native YAML scalar or its string form, which is what a
/// resolved placeholder produces.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: std::fmt::Display,
{
    match Raw::<T>::deserialize(deserializer)? {
        Raw::Value(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: std::fmt::Display,
{
    match Option::<Raw<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Value(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => text.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}
