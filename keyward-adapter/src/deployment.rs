//! Deployment configuration shared by all request-handling tasks.
//!
//! A [`DeploymentConfig`] is assembled at startup through `&mut self` setters,
//! then wrapped in an `Arc` and shared. After that point only three things
//! change:
//!
//! - the endpoint snapshot, replaced as a whole through an atomic pointer swap
//!   by [`set_front_channel_url`](DeploymentConfig::set_front_channel_url) and
//!   [`set_front_and_back_channel_urls`](DeploymentConfig::set_front_and_back_channel_urls);
//! - the not-before watermark, an atomic integer;
//! - whatever state the key locator keeps behind its own synchronization.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::{
    DEFAULT_MIN_TIME_BETWEEN_JWKS_REQUESTS, DEFAULT_PRINCIPAL_ATTRIBUTE,
    DEFAULT_PUBLIC_KEY_CACHE_TTL, DEFAULT_STATE_COOKIE_NAME,
};
use crate::credentials::ClientCredentialsProvider;
use crate::endpoints::{EndpointSet, RelativeUrls};
use crate::error::{AdapterError, Collaborator};
use crate::keys::KeyLocator;
use crate::policy::PolicyEnforcer;
use crate::resolver::{resolve_endpoints, UrlResolver};
use crate::supplier::Supplier;

/// Where the adapter keeps tokens between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStore {
    #[default]
    #[serde(alias = "SESSION")]
    Session,
    #[serde(alias = "COOKIE")]
    Cookie,
}

/// Which requests must arrive over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslRequired {
    #[default]
    #[serde(alias = "ALL")]
    All,
    /// Required for every peer except loopback, private and link-local addresses.
    #[serde(alias = "EXTERNAL")]
    External,
    #[serde(alias = "NONE")]
    None,
}

impl SslRequired {
    /// Whether a request from `peer` must use TLS.
    pub fn is_required(self, peer: IpAddr) -> bool {
        match self {
            SslRequired::All => true,
            SslRequired::None => false,
            SslRequired::External => !is_local(peer),
        }
    }
}

/// Unique local addresses, `fc00::/7`.
const UNIQUE_LOCAL_MASK: u16 = 0xfe00;
const UNIQUE_LOCAL_PREFIX: u16 = 0xfc00;
/// Link-local unicast, `fe80::/10`.
const LINK_LOCAL_MASK: u16 = 0xffc0;
const LINK_LOCAL_PREFIX: u16 = 0xfe80;

fn is_local(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & UNIQUE_LOCAL_MASK) == UNIQUE_LOCAL_PREFIX
                || (first & LINK_LOCAL_MASK) == LINK_LOCAL_PREFIX
        }
    }
}

/// CORS options carried for the request layer; no header logic lives here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsSettings {
    pub enabled: bool,
    /// `-1` leaves `Access-Control-Max-Age` unset.
    pub max_age: i32,
    pub allowed_headers: Option<String>,
    pub allowed_methods: Option<String>,
    pub exposed_headers: Option<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age: -1,
            allowed_headers: None,
            allowed_methods: None,
            exposed_headers: None,
        }
    }
}

/// Relying-party deployment: realm, client options, key locator and the
/// current endpoint snapshot.
pub struct DeploymentConfig {
    realm: Option<String>,
    key_locator: Option<Arc<dyn KeyLocator>>,
    endpoints: ArcSwap<EndpointSet>,
    principal_attribute: String,

    resource_name: Option<String>,
    bearer_only: bool,
    autodetect_bearer_only: bool,
    enable_basic_auth: bool,
    public_client: bool,
    resource_credentials: HashMap<String, serde_json::Value>,
    client_authenticator: Option<Arc<dyn ClientCredentialsProvider>>,
    http_client: Supplier<reqwest::Client>,

    scope: Option<String>,
    ssl_required: SslRequired,
    confidential_port: i32,
    token_store: TokenStore,
    adapter_state_cookie_path: String,
    state_cookie_name: String,
    use_resource_role_mappings: bool,
    cors: CorsSettings,
    expose_token: bool,
    always_refresh_token: bool,
    register_node_at_startup: bool,
    register_node_period: i32,
    turn_off_change_session_id_on_login: bool,

    not_before: AtomicI64,
    token_minimum_time_to_live: u64,
    min_time_between_jwks_requests: u64,
    public_key_cache_ttl: u64,
    policy_enforcer: Option<Supplier<Arc<dyn PolicyEnforcer>>>,

    pkce: bool,
    ignore_oauth_query_parameter: bool,
    redirect_rewrite_rules: HashMap<String, String>,
    delegate_bearer_error_response_sending: bool,
    verify_token_audience: bool,
}

impl DeploymentConfig {
    /// Create an unconfigured deployment with default options.
    pub fn new() -> Self {
        Self {
            realm: None,
            key_locator: None,
            endpoints: ArcSwap::from_pointee(EndpointSet::unresolved()),
            principal_attribute: DEFAULT_PRINCIPAL_ATTRIBUTE.to_string(),
            resource_name: None,
            bearer_only: false,
            autodetect_bearer_only: false,
            enable_basic_auth: false,
            public_client: false,
            resource_credentials: HashMap::new(),
            client_authenticator: None,
            http_client: Supplier::new(|| reqwest::Client::builder().build().map_err(Into::into)),
            scope: None,
            ssl_required: SslRequired::All,
            confidential_port: -1,
            token_store: TokenStore::Session,
            adapter_state_cookie_path: String::new(),
            state_cookie_name: DEFAULT_STATE_COOKIE_NAME.to_string(),
            use_resource_role_mappings: false,
            cors: CorsSettings::default(),
            expose_token: false,
            always_refresh_token: false,
            register_node_at_startup: false,
            register_node_period: 0,
            turn_off_change_session_id_on_login: false,
            not_before: AtomicI64::new(0),
            token_minimum_time_to_live: 0,
            min_time_between_jwks_requests: DEFAULT_MIN_TIME_BETWEEN_JWKS_REQUESTS,
            public_key_cache_ttl: DEFAULT_PUBLIC_KEY_CACHE_TTL,
            policy_enforcer: None,
            pkce: false,
            ignore_oauth_query_parameter: false,
            redirect_rewrite_rules: HashMap::new(),
            delegate_bearer_error_response_sending: false,
            verify_token_audience: false,
        }
    }

    /// A deployment is usable once it knows its realm and key locator, and
    /// either never redirects browsers or has a front-channel URL.
    pub fn is_configured(&self) -> bool {
        self.realm.is_some()
            && self.key_locator.is_some()
            && (self.bearer_only || self.endpoints.load().front_channel_base().is_some())
    }

    // ── Endpoints ──────────────────────────────────────────────────────

    /// Resolve endpoints from a single base URL and publish them.
    ///
    /// On error the previously published endpoints remain in effect.
    pub fn set_front_channel_url(&self, url: &str) -> Result<(), AdapterError> {
        self.publish(resolve_endpoints(self.realm_or_empty(), Some(url), None))
    }

    /// Resolve endpoints from a browser-facing and an optional server-to-server
    /// base URL and publish them.
    ///
    /// On error the previously published endpoints remain in effect.
    pub fn set_front_and_back_channel_urls(
        &self,
        front: &str,
        back: Option<&str>,
    ) -> Result<(), AdapterError> {
        self.publish(resolve_endpoints(self.realm_or_empty(), Some(front), back))
    }

    fn publish(&self, resolved: Result<EndpointSet, AdapterError>) -> Result<(), AdapterError> {
        match resolved {
            Ok(set) => {
                info!(
                    realm = ?self.realm,
                    front = ?set.front_channel_base(),
                    back = ?set.back_channel_base(),
                    state = ?set.state(),
                    "Publishing endpoint set"
                );
                self.endpoints.store(Arc::new(set));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Rejected endpoint configuration, keeping current endpoints");
                Err(err)
            }
        }
    }

    fn realm_or_empty(&self) -> &str {
        self.realm.as_deref().unwrap_or_default()
    }

    /// The current endpoint snapshot. Use this when several URLs must come
    /// from the same configuration state.
    pub fn endpoints(&self) -> Arc<EndpointSet> {
        self.endpoints.load_full()
    }

    /// Endpoints for one inbound request. Relative deployments are resolved
    /// against `request_url`; absolute ones return the current snapshot.
    pub fn endpoints_for_request(&self, request_url: &str) -> Result<Arc<EndpointSet>, AdapterError> {
        let current = self.endpoints.load_full();
        if current.relative_urls() != RelativeUrls::Always {
            return Ok(current);
        }
        let resolved = UrlResolver::resolve_for_request(self.realm_or_empty(), &current, request_url)?;
        Ok(Arc::new(resolved))
    }

    pub fn auth_server_base_url(&self) -> Option<String> {
        self.endpoints.load().front_channel_base().map(String::from)
    }

    pub fn auth_server_back_channel_base_url(&self) -> Option<String> {
        self.endpoints.load().back_channel_base().map(String::from)
    }

    pub fn relative_urls(&self) -> RelativeUrls {
        self.endpoints.load().relative_urls()
    }

    pub fn auth_url(&self) -> Option<Url> {
        self.endpoints.load().auth_url().cloned()
    }

    pub fn realm_info_url(&self) -> Option<Url> {
        self.endpoints.load().realm_info_url().cloned()
    }

    pub fn account_url(&self) -> Option<Url> {
        self.endpoints.load().account_url().cloned()
    }

    pub fn token_url(&self) -> Option<Url> {
        self.endpoints.load().token_url().cloned()
    }

    pub fn logout_url(&self) -> Option<Url> {
        self.endpoints.load().logout_url().cloned()
    }

    pub fn register_node_url(&self) -> Option<Url> {
        self.endpoints.load().register_node_url().cloned()
    }

    pub fn unregister_node_url(&self) -> Option<Url> {
        self.endpoints.load().unregister_node_url().cloned()
    }

    pub fn jwks_url(&self) -> Option<Url> {
        self.endpoints.load().jwks_url().cloned()
    }

    // ── Not-before watermark ───────────────────────────────────────────

    pub fn not_before(&self) -> i64 {
        self.not_before.load(Ordering::Acquire)
    }

    /// Store the watermark without touching the key locator.
    pub fn set_not_before(&self, not_before: i64) {
        self.not_before.store(not_before, Ordering::Release);
    }

    /// Store the watermark, then tell the key locator to drop cached keys.
    ///
    /// The reset is issued but not awaited; any refetch it triggers runs in
    /// the background.
    pub fn update_not_before(&self, not_before: i64) {
        self.not_before.store(not_before, Ordering::Release);
        info!(realm = ?self.realm, not_before, "Updated not-before watermark");
        match &self.key_locator {
            Some(locator) => locator.reset(self),
            None => debug!("No key locator configured, nothing to reset"),
        }
    }

    // ── Collaborators ──────────────────────────────────────────────────

    /// Invoke the HTTP client factory.
    pub fn http_client(&self) -> Result<reqwest::Client, AdapterError> {
        self.http_client
            .get()
            .map_err(|source| AdapterError::CollaboratorAcquisition {
                collaborator: Collaborator::HttpClient,
                source,
            })
    }

    pub(crate) fn http_client_factory(&self) -> Supplier<reqwest::Client> {
        self.http_client.clone()
    }

    pub fn set_http_client_factory(&mut self, factory: Supplier<reqwest::Client>) {
        self.http_client = factory;
    }

    /// Use one shared client for every call.
    pub fn set_http_client(&mut self, client: reqwest::Client) {
        self.http_client = Supplier::constant(client);
    }

    /// Invoke the policy enforcer factory. `Ok(None)` when none is installed.
    pub fn policy_enforcer(&self) -> Result<Option<Arc<dyn PolicyEnforcer>>, AdapterError> {
        let Some(factory) = &self.policy_enforcer else {
            return Ok(None);
        };
        factory
            .get()
            .map(Some)
            .map_err(|source| AdapterError::CollaboratorAcquisition {
                collaborator: Collaborator::PolicyEnforcer,
                source,
            })
    }

    pub fn set_policy_enforcer_factory(&mut self, factory: Supplier<Arc<dyn PolicyEnforcer>>) {
        self.policy_enforcer = Some(factory);
    }

    pub fn key_locator(&self) -> Option<&Arc<dyn KeyLocator>> {
        self.key_locator.as_ref()
    }

    pub fn set_key_locator(&mut self, locator: Arc<dyn KeyLocator>) {
        self.key_locator = Some(locator);
    }

    pub fn client_authenticator(&self) -> Option<&Arc<dyn ClientCredentialsProvider>> {
        self.client_authenticator.as_ref()
    }

    pub fn set_client_authenticator(&mut self, authenticator: Arc<dyn ClientCredentialsProvider>) {
        self.client_authenticator = Some(authenticator);
    }

    // ── Plain options ──────────────────────────────────────────────────

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Set the realm. Must happen before any base URL is configured.
    pub fn set_realm(&mut self, realm: impl Into<String>) {
        self.realm = Some(realm.into());
    }

    pub fn resource_name(&self) -> Option<&str> {
        self.resource_name.as_deref()
    }

    pub fn set_resource_name(&mut self, resource_name: impl Into<String>) {
        self.resource_name = Some(resource_name.into());
    }

    pub fn principal_attribute(&self) -> &str {
        &self.principal_attribute
    }

    pub fn set_principal_attribute(&mut self, attribute: impl Into<String>) {
        self.principal_attribute = attribute.into();
    }

    pub fn is_bearer_only(&self) -> bool {
        self.bearer_only
    }

    pub fn set_bearer_only(&mut self, bearer_only: bool) {
        self.bearer_only = bearer_only;
    }

    pub fn is_autodetect_bearer_only(&self) -> bool {
        self.autodetect_bearer_only
    }

    pub fn set_autodetect_bearer_only(&mut self, autodetect: bool) {
        self.autodetect_bearer_only = autodetect;
    }

    pub fn is_enable_basic_auth(&self) -> bool {
        self.enable_basic_auth
    }

    pub fn set_enable_basic_auth(&mut self, enable: bool) {
        self.enable_basic_auth = enable;
    }

    pub fn is_public_client(&self) -> bool {
        self.public_client
    }

    pub fn set_public_client(&mut self, public_client: bool) {
        self.public_client = public_client;
    }

    pub fn resource_credentials(&self) -> &HashMap<String, serde_json::Value> {
        &self.resource_credentials
    }

    pub fn set_resource_credentials(&mut self, credentials: HashMap<String, serde_json::Value>) {
        self.resource_credentials = credentials;
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn set_scope(&mut self, scope: Option<String>) {
        self.scope = scope;
    }

    pub fn ssl_required(&self) -> SslRequired {
        self.ssl_required
    }

    pub fn set_ssl_required(&mut self, ssl_required: SslRequired) {
        self.ssl_required = ssl_required;
    }

    pub fn is_ssl_enabled(&self) -> bool {
        self.ssl_required != SslRequired::None
    }

    pub fn confidential_port(&self) -> i32 {
        self.confidential_port
    }

    pub fn set_confidential_port(&mut self, port: i32) {
        self.confidential_port = port;
    }

    pub fn token_store(&self) -> TokenStore {
        self.token_store
    }

    pub fn set_token_store(&mut self, token_store: TokenStore) {
        self.token_store = token_store;
    }

    pub fn adapter_state_cookie_path(&self) -> &str {
        &self.adapter_state_cookie_path
    }

    pub fn set_adapter_state_cookie_path(&mut self, path: impl Into<String>) {
        self.adapter_state_cookie_path = path.into();
    }

    pub fn state_cookie_name(&self) -> &str {
        &self.state_cookie_name
    }

    pub fn set_state_cookie_name(&mut self, name: impl Into<String>) {
        self.state_cookie_name = name.into();
    }

    pub fn is_use_resource_role_mappings(&self) -> bool {
        self.use_resource_role_mappings
    }

    pub fn set_use_resource_role_mappings(&mut self, enabled: bool) {
        self.use_resource_role_mappings = enabled;
    }

    pub fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub fn set_cors(&mut self, cors: CorsSettings) {
        self.cors = cors;
    }

    pub fn is_expose_token(&self) -> bool {
        self.expose_token
    }

    pub fn set_expose_token(&mut self, expose: bool) {
        self.expose_token = expose;
    }

    pub fn is_always_refresh_token(&self) -> bool {
        self.always_refresh_token
    }

    pub fn set_always_refresh_token(&mut self, always: bool) {
        self.always_refresh_token = always;
    }

    pub fn is_register_node_at_startup(&self) -> bool {
        self.register_node_at_startup
    }

    pub fn set_register_node_at_startup(&mut self, register: bool) {
        self.register_node_at_startup = register;
    }

    pub fn register_node_period(&self) -> i32 {
        self.register_node_period
    }

    pub fn set_register_node_period(&mut self, period: i32) {
        self.register_node_period = period;
    }

    pub fn is_turn_off_change_session_id_on_login(&self) -> bool {
        self.turn_off_change_session_id_on_login
    }

    pub fn set_turn_off_change_session_id_on_login(&mut self, turn_off: bool) {
        self.turn_off_change_session_id_on_login = turn_off;
    }

    /// Seconds a token must still be valid for before it is refreshed.
    pub fn token_minimum_time_to_live(&self) -> u64 {
        self.token_minimum_time_to_live
    }

    pub fn set_token_minimum_time_to_live(&mut self, secs: u64) {
        self.token_minimum_time_to_live = secs;
    }

    pub fn min_time_between_jwks_requests(&self) -> u64 {
        self.min_time_between_jwks_requests
    }

    pub fn set_min_time_between_jwks_requests(&mut self, secs: u64) {
        self.min_time_between_jwks_requests = secs;
    }

    pub fn public_key_cache_ttl(&self) -> u64 {
        self.public_key_cache_ttl
    }

    pub fn set_public_key_cache_ttl(&mut self, secs: u64) {
        self.public_key_cache_ttl = secs;
    }

    pub fn is_pkce(&self) -> bool {
        self.pkce
    }

    pub fn set_pkce(&mut self, pkce: bool) {
        self.pkce = pkce;
    }

    pub fn set_ignore_oauth_query_parameter(&mut self, ignore: bool) {
        self.ignore_oauth_query_parameter = ignore;
    }

    /// Whether a bearer token may be passed in the `access_token` query parameter.
    pub fn is_oauth_query_parameter_enabled(&self) -> bool {
        !self.ignore_oauth_query_parameter
    }

    /// Regex-to-replacement rules applied to redirect URIs by the login flow.
    pub fn redirect_rewrite_rules(&self) -> &HashMap<String, String> {
        &self.redirect_rewrite_rules
    }

    pub fn set_redirect_rewrite_rules(&mut self, rules: HashMap<String, String>) {
        self.redirect_rewrite_rules = rules;
    }

    pub fn is_delegate_bearer_error_response_sending(&self) -> bool {
        self.delegate_bearer_error_response_sending
    }

    pub fn set_delegate_bearer_error_response_sending(&mut self, delegate: bool) {
        self.delegate_bearer_error_response_sending = delegate;
    }

    pub fn is_verify_token_audience(&self) -> bool {
        self.verify_token_audience
    }

    pub fn set_verify_token_audience(&mut self, verify: bool) {
        self.verify_token_audience = verify;
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeploymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentConfig")
            .field("realm", &self.realm)
            .field("resource_name", &self.resource_name)
            .field("endpoints", &**self.endpoints.load())
            .field("bearer_only", &self.bearer_only)
            .field("public_client", &self.public_client)
            .field("ssl_required", &self.ssl_required)
            .field("token_store", &self.token_store)
            .field("not_before", &self.not_before())
            .field("has_key_locator", &self.key_locator.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn external_ssl_exempts_local_peers() {
        let ssl = SslRequired::External;
        assert!(!ssl.is_required(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(!ssl.is_required(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
        assert!(!ssl.is_required(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 7))));
        assert!(!ssl.is_required(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(!ssl.is_required("fd00::1".parse().unwrap()));
        assert!(ssl.is_required(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(ssl.is_required("2001:db8::1".parse().unwrap()));
        assert!(!ssl.is_required("fe80::1".parse().unwrap()));
        assert!(!ssl.is_required("fdff:ffff::1".parse().unwrap()));
        assert!(ssl.is_required("fec0::1".parse().unwrap()));
    }

    #[test]
    fn all_and_none_ignore_peer() {
        let peer = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(SslRequired::All.is_required(peer));
        assert!(!SslRequired::None.is_required(peer));
    }

    #[test]
    fn defaults_match_adapter_conventions() {
        let deployment = DeploymentConfig::new();
        assert_eq!(deployment.principal_attribute(), "sub");
        assert_eq!(deployment.state_cookie_name(), "OAuth_Token_Request_State");
        assert_eq!(deployment.confidential_port(), -1);
        assert_eq!(deployment.token_store(), TokenStore::Session);
        assert_eq!(deployment.ssl_required(), SslRequired::All);
        assert!(deployment.is_ssl_enabled());
        assert!(deployment.is_oauth_query_parameter_enabled());
        assert_eq!(deployment.cors().max_age, -1);
        assert_eq!(deployment.not_before(), 0);
    }
}
