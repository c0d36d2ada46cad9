use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{AdapterConfig, ConfigError, ConfigValidationDetail};
use crate::credentials::ClientIdAndSecretCredentials;
use crate::deployment::{CorsSettings, DeploymentConfig};
use crate::error::{AdapterError, Collaborator};
use crate::keys::{HardcodedKeyLocator, JwksKeyLocator, KeyLocator};

/// Turns an [`AdapterConfig`] into a ready-to-share [`DeploymentConfig`].
pub struct DeploymentBuilder;

impl DeploymentBuilder {
    /// Validate `config` and assemble the deployment.
    ///
    /// The realm is set before any base URL so endpoint templates are expanded
    /// with it. A single HTTP client honouring the configured timeouts is built
    /// up front and handed out by every call to
    /// [`DeploymentConfig::http_client`].
    pub fn build(config: &AdapterConfig) -> Result<DeploymentConfig, AdapterError> {
        config.validate()?;

        let mut deployment = DeploymentConfig::new();
        if let Some(realm) = &config.realm {
            deployment.set_realm(realm.as_str());
        }
        if let Some(resource) = &config.resource {
            deployment.set_resource_name(resource.as_str());
        }

        deployment.set_key_locator(key_locator(config)?);
        deployment.set_http_client(http_client(config)?);

        deployment.set_bearer_only(config.bearer_only);
        deployment.set_autodetect_bearer_only(config.autodetect_bearer_only);
        deployment.set_enable_basic_auth(config.enable_basic_auth);
        deployment.set_public_client(config.public_client);
        deployment.set_resource_credentials(config.credentials.clone());
        deployment.set_client_authenticator(Arc::new(ClientIdAndSecretCredentials::from_credentials(
            &config.credentials,
        )));

        deployment.set_ssl_required(config.ssl_required);
        deployment.set_confidential_port(config.confidential_port);
        deployment.set_token_store(config.token_store);
        if let Some(path) = &config.adapter_state_cookie_path {
            deployment.set_adapter_state_cookie_path(path.as_str());
        }
        if let Some(attribute) = &config.principal_attribute {
            deployment.set_principal_attribute(attribute.as_str());
        }
        deployment.set_scope(config.scope.clone());
        deployment.set_use_resource_role_mappings(config.use_resource_role_mappings);
        deployment.set_cors(CorsSettings {
            enabled: config.enable_cors,
            max_age: config.cors_max_age,
            allowed_headers: config.cors_allowed_headers.clone(),
            allowed_methods: config.cors_allowed_methods.clone(),
            exposed_headers: config.cors_exposed_headers.clone(),
        });
        deployment.set_expose_token(config.expose_token);
        deployment.set_always_refresh_token(config.always_refresh_token);
        deployment.set_register_node_at_startup(config.register_node_at_startup);
        deployment.set_register_node_period(config.register_node_period);
        deployment.set_turn_off_change_session_id_on_login(config.turn_off_change_session_id_on_login);
        deployment.set_token_minimum_time_to_live(config.token_minimum_time_to_live);
        deployment.set_min_time_between_jwks_requests(config.min_time_between_jwks_requests);
        deployment.set_public_key_cache_ttl(config.public_key_cache_ttl);
        deployment.set_pkce(config.pkce);
        deployment.set_ignore_oauth_query_parameter(config.ignore_oauth_query_parameter);
        deployment.set_redirect_rewrite_rules(config.redirect_rewrite_rules.clone());
        deployment.set_delegate_bearer_error_response_sending(
            config.delegate_bearer_error_response_sending,
        );
        deployment.set_verify_token_audience(config.verify_token_audience);

        match (
            config.auth_server_url.as_deref(),
            config.auth_server_url_for_backend_requests.as_deref(),
        ) {
            (Some(front), back) => deployment.set_front_and_back_channel_urls(front, back)?,
            (None, Some(back)) => {
                warn!(url = %back, "auth-server-url-for-backend-requests ignored without auth-server-url")
            }
            (None, None) => {}
        }

        info!(
            realm = ?deployment.realm(),
            resource = ?deployment.resource_name(),
            bearer_only = deployment.is_bearer_only(),
            "Built deployment"
        );
        Ok(deployment)
    }
}

fn key_locator(config: &AdapterConfig) -> Result<Arc<dyn KeyLocator>, AdapterError> {
    match config.realm_public_key.as_deref() {
        Some(key) => {
            debug!("Using configured realm public key");
            let locator = HardcodedKeyLocator::from_rsa_public_key(key).map_err(|e| {
                ConfigError::Validation(vec![ConfigValidationDetail::new(
                    "realm-public-key",
                    &e.to_string(),
                )])
            })?;
            Ok(Arc::new(locator))
        }
        None => {
            debug!("Using JWKS key locator");
            Ok(Arc::new(JwksKeyLocator::new()))
        }
    }
}

fn http_client(config: &AdapterConfig) -> Result<reqwest::Client, AdapterError> {
    let mut builder = reqwest::Client::builder();
    if let Some(ms) = config.connection_timeout_millis {
        builder = builder.connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = config.socket_timeout_millis {
        builder = builder.read_timeout(Duration::from_millis(ms));
    }
    if config.disable_trust_manager {
        warn!("TLS certificate verification is disabled for outbound adapter requests");
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
        .build()
        .map_err(|e| AdapterError::CollaboratorAcquisition {
            collaborator: Collaborator::HttpClient,
            source: Box::new(e),
        })
}
