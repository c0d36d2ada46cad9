//! Service path templates of the authorization server.
//!
//! Every template is relative to the server's base URL and contains a single
//! `{realm-name}` placeholder.

/// Placeholder substituted with the (percent-encoded) realm name.
pub const REALM_PLACEHOLDER: &str = "{realm-name}";

pub const AUTH_PATH: &str = "/realms/{realm-name}/protocol/openid-connect/auth";
pub const TOKEN_PATH: &str = "/realms/{realm-name}/protocol/openid-connect/token";
pub const TOKEN_SERVICE_LOGOUT_PATH: &str = "/realms/{realm-name}/protocol/openid-connect/logout";
pub const ACCOUNT_SERVICE_PATH: &str = "/realms/{realm-name}/account";
pub const REALM_INFO_PATH: &str = "/realms/{realm-name}";
pub const CLIENTS_MANAGEMENT_REGISTER_NODE_PATH: &str =
    "/realms/{realm-name}/clients-managements/register-node";
pub const CLIENTS_MANAGEMENT_UNREGISTER_NODE_PATH: &str =
    "/realms/{realm-name}/clients-managements/unregister-node";
pub const JWKS_PATH: &str = "/realms/{realm-name}/protocol/openid-connect/certs";

/// Default claim used as the principal name.
pub const DEFAULT_PRINCIPAL_ATTRIBUTE: &str = "sub";

/// Default name of the cookie holding the OAuth state parameter.
pub const DEFAULT_STATE_COOKIE_NAME: &str = "OAuth_Token_Request_State";

/// Default minimum interval between two JWKS downloads, in seconds.
pub const DEFAULT_MIN_TIME_BETWEEN_JWKS_REQUESTS: u64 = 10;

/// Default lifetime of cached public keys, in seconds.
pub const DEFAULT_PUBLIC_KEY_CACHE_TTL: u64 = 86_400;
