//! Resolution of service endpoints from the configured base URLs.
//!
//! Resolution is a pure function of the realm and the two optional base URLs:
//!
//! 1. No front-channel URL: the set stays unresolved (bearer-only deployment).
//! 2. Each present URL is parsed and re-serialized, which drops default ports.
//! 3. A path-only front-channel URL yields a relative set; absolute URLs are
//!    computed later from each inbound request via [`UrlResolver::resolve_for_request`].
//! 4. Otherwise browser-facing endpoints (auth, account, realm info) are rooted
//!    at the front channel and server-to-server endpoints (token, logout, node
//!    registration, JWKS) at the back channel, falling back to the front channel.

use tracing::debug;
use url::Url;

use crate::constants::{
    ACCOUNT_SERVICE_PATH, AUTH_PATH, CLIENTS_MANAGEMENT_REGISTER_NODE_PATH,
    CLIENTS_MANAGEMENT_UNREGISTER_NODE_PATH, JWKS_PATH, REALM_INFO_PATH, REALM_PLACEHOLDER,
    TOKEN_PATH, TOKEN_SERVICE_LOGOUT_PATH,
};
use crate::endpoints::{EndpointSet, RelativeUrls, ResolvedEndpoints};
use crate::error::{AdapterError, EndpointInput};

/// Origin used only to check that a relative reference is well-formed.
const VALIDATION_ORIGIN: &str = "http://localhost/";

/// Builder-style front end for endpoint resolution.
///
/// ```ignore
/// let endpoints = UrlResolver::new("demo")
///     .with_front_channel_url("https://sso.example.com")
///     .with_back_channel_url("http://keycloak.internal:8080")
///     .resolve()?;
/// ```
#[derive(Debug, Clone)]
pub struct UrlResolver {
    realm: String,
    front_channel_url: Option<String>,
    back_channel_url: Option<String>,
}

enum Normalized {
    Absolute { url: Url, base: String },
    Relative(String),
}

impl UrlResolver {
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            front_channel_url: None,
            back_channel_url: None,
        }
    }

    /// Set the browser-facing base URL.
    pub fn with_front_channel_url(mut self, url: impl Into<String>) -> Self {
        self.front_channel_url = Some(url.into());
        self
    }

    /// Set the base URL used for server-to-server calls.
    pub fn with_back_channel_url(mut self, url: impl Into<String>) -> Self {
        self.back_channel_url = Some(url.into());
        self
    }

    /// Compute the endpoint set. Never performs I/O.
    pub fn resolve(self) -> Result<EndpointSet, AdapterError> {
        resolve_endpoints(
            &self.realm,
            self.front_channel_url.as_deref(),
            self.back_channel_url.as_deref(),
        )
    }

    /// Resolve a relative endpoint set against the URL of an inbound request.
    ///
    /// The request's scheme, host and port replace the missing origin of every
    /// relative base; an absolute back-channel base is kept as configured.
    /// Sets that are not relative are returned unchanged.
    pub fn resolve_for_request(
        realm: &str,
        endpoints: &EndpointSet,
        request_url: &str,
    ) -> Result<EndpointSet, AdapterError> {
        if endpoints.relative_urls() != RelativeUrls::Always {
            return Ok(endpoints.clone());
        }
        let Some(front) = endpoints.front_channel_base() else {
            return Ok(endpoints.clone());
        };

        let origin = request_origin(request_url)?;
        let front = origin
            .join(front)
            .map_err(|e| AdapterError::invalid_endpoint(EndpointInput::FrontChannel, front, e))?;
        let back = match endpoints.back_channel_base() {
            Some(back) if Url::parse(back).is_ok() => Some(back.to_string()),
            Some(back) => Some(
                origin
                    .join(back)
                    .map_err(|e| AdapterError::invalid_endpoint(EndpointInput::BackChannel, back, e))?
                    .to_string(),
            ),
            None => None,
        };

        resolve_endpoints(realm, Some(front.as_str()), back.as_deref())
    }
}

/// Resolve the endpoint set for `realm` from the optional base URLs.
///
/// Any malformed input aborts resolution with
/// [`AdapterError::InvalidEndpointConfiguration`] naming the failed input.
pub fn resolve_endpoints(
    realm: &str,
    front_channel_url: Option<&str>,
    back_channel_url: Option<&str>,
) -> Result<EndpointSet, AdapterError> {
    let Some(front_raw) = front_channel_url else {
        return Ok(EndpointSet::unresolved());
    };

    let front = normalize(EndpointInput::FrontChannel, front_raw)?;
    let back = back_channel_url
        .map(|raw| normalize(EndpointInput::BackChannel, raw))
        .transpose()?;

    let back_base = back.as_ref().map(|b| match b {
        Normalized::Absolute { base, .. } => base.clone(),
        Normalized::Relative(base) => base.clone(),
    });

    let (front_url, front_base) = match front {
        Normalized::Relative(base) => {
            debug!(front = %base, back = ?back_base, "Relative front-channel URL, endpoints resolved per request");
            return Ok(EndpointSet::relative(base, back_base));
        }
        Normalized::Absolute { url, base } => (url, base),
    };

    if realm.trim().is_empty() {
        return Err(AdapterError::invalid_endpoint(
            EndpointInput::Realm,
            realm,
            "realm must be set before endpoints can be resolved",
        ));
    }

    let back_root = match back {
        Some(Normalized::Absolute { url, .. }) => url,
        Some(Normalized::Relative(base)) => {
            return Err(AdapterError::invalid_endpoint(
                EndpointInput::BackChannel,
                base,
                "back-channel URL must be absolute when the front-channel URL is",
            ));
        }
        None => front_url.clone(),
    };

    let front_path = |template: &str| expand(&front_url, template, realm, EndpointInput::FrontChannel);
    let back_path = |template: &str| expand(&back_root, template, realm, EndpointInput::BackChannel);

    let resolved = ResolvedEndpoints {
        auth_url: front_path(AUTH_PATH)?,
        realm_info_url: front_path(REALM_INFO_PATH)?,
        account_url: front_path(ACCOUNT_SERVICE_PATH)?,
        token_url: back_path(TOKEN_PATH)?,
        logout_url: back_path(TOKEN_SERVICE_LOGOUT_PATH)?,
        register_node_url: back_path(CLIENTS_MANAGEMENT_REGISTER_NODE_PATH)?,
        unregister_node_url: back_path(CLIENTS_MANAGEMENT_UNREGISTER_NODE_PATH)?,
        jwks_url: back_path(JWKS_PATH)?,
    };

    debug!(realm = %realm, front = %front_base, back = ?back_base, "Resolved absolute endpoints");
    Ok(EndpointSet::absolute(front_base, back_base, resolved))
}

fn normalize(input: EndpointInput, raw: &str) -> Result<Normalized, AdapterError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AdapterError::invalid_endpoint(input, raw, "URL is empty"));
    }

    match Url::parse(trimmed) {
        Ok(url) => {
            if url.cannot_be_a_base() {
                return Err(AdapterError::invalid_endpoint(
                    input,
                    raw,
                    "URL cannot be used as a base",
                ));
            }
            if url.host().is_none() {
                return Err(AdapterError::invalid_endpoint(
                    input,
                    raw,
                    "absolute URL has no host",
                ));
            }
            let base = serialize_base(&url, trimmed);
            Ok(Normalized::Absolute { url, base })
        }
        Err(url::ParseError::RelativeUrlWithoutBase) if trimmed.starts_with("//") => {
            Err(AdapterError::invalid_endpoint(
                input,
                raw,
                "URL names a host but no scheme",
            ))
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let origin = Url::parse(VALIDATION_ORIGIN)
                .map_err(|e| AdapterError::invalid_endpoint(input, raw, e))?;
            origin
                .join(trimmed)
                .map_err(|e| AdapterError::invalid_endpoint(input, raw, e))?;
            Ok(Normalized::Relative(trimmed.to_string()))
        }
        Err(e) => Err(AdapterError::invalid_endpoint(input, raw, e)),
    }
}

/// Serialized form of a parsed base URL. The `url` crate always adds a `/`
/// to an empty path; it is dropped again unless the caller wrote it.
fn serialize_base(url: &Url, raw: &str) -> String {
    let serialized = url.as_str();
    let bare_root = url.path() == "/" && url.query().is_none() && url.fragment().is_none();
    if bare_root && !raw.ends_with('/') {
        serialized.trim_end_matches('/').to_string()
    } else {
        serialized.to_string()
    }
}

/// Append a service path template to `base`, substituting the realm.
fn expand(base: &Url, template: &str, realm: &str, input: EndpointInput) -> Result<Url, AdapterError> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            AdapterError::invalid_endpoint(input, base.as_str(), "URL cannot be used as a base")
        })?;
        segments.pop_if_empty();
        for segment in template.split('/').filter(|s| !s.is_empty()) {
            if segment == REALM_PLACEHOLDER {
                segments.push(realm);
            } else {
                segments.push(segment);
            }
        }
    }
    Ok(url)
}

fn request_origin(request_url: &str) -> Result<Url, AdapterError> {
    let mut origin = Url::parse(request_url)
        .map_err(|e| AdapterError::invalid_endpoint(EndpointInput::Request, request_url, e))?;
    if origin.host().is_none() || origin.cannot_be_a_base() {
        return Err(AdapterError::invalid_endpoint(
            EndpointInput::Request,
            request_url,
            "request URL has no host",
        ));
    }
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    Ok(origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_base_keeps_caller_slash() {
        let url = Url::parse("https://sso.example.com/").unwrap();
        assert_eq!(serialize_base(&url, "https://sso.example.com/"), "https://sso.example.com/");
        assert_eq!(serialize_base(&url, "https://sso.example.com"), "https://sso.example.com");
    }

    #[test]
    fn expand_substitutes_realm_as_single_segment() {
        let base = Url::parse("https://sso.example.com/auth/").unwrap();
        let url = expand(&base, REALM_INFO_PATH, "a/b", EndpointInput::FrontChannel).unwrap();
        assert_eq!(url.as_str(), "https://sso.example.com/auth/realms/a%2Fb");
    }

    #[test]
    fn relative_reference_is_validated() {
        assert!(matches!(
            normalize(EndpointInput::FrontChannel, "/auth"),
            Ok(Normalized::Relative(_))
        ));
        assert!(normalize(EndpointInput::FrontChannel, "   ").is_err());
        assert!(normalize(EndpointInput::FrontChannel, "//sso.example.com/auth").is_err());
    }

    #[test]
    fn non_base_urls_are_rejected() {
        assert!(normalize(EndpointInput::FrontChannel, "mailto:admin@example.com").is_err());
    }
}
