use url::Url;

/// Whether endpoint URLs must be resolved against each inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeUrls {
    /// The front-channel base is path-only; absolute URLs depend on the request.
    Always,
    /// Absolute URLs were computed once from the configured bases.
    #[default]
    Never,
}

/// Lifecycle state of an [`EndpointSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// No front-channel URL was supplied (bearer-only deployment).
    Unresolved,
    /// The front-channel URL is relative; resolve per request.
    Relative,
    /// All derived endpoints are populated.
    Absolute,
}

/// Absolute protocol endpoints derived from the configured base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedEndpoints {
    pub(crate) auth_url: Url,
    pub(crate) realm_info_url: Url,
    pub(crate) account_url: Url,
    pub(crate) token_url: Url,
    pub(crate) logout_url: Url,
    pub(crate) register_node_url: Url,
    pub(crate) unregister_node_url: Url,
    pub(crate) jwks_url: Url,
}

/// Immutable snapshot of the resolved service endpoints.
///
/// A new set is built whenever a base URL is (re)configured and published as a
/// whole; a published set is never modified. Derived getters return `None` for
/// unresolved and relative sets, which callers must treat as "resolve per
/// request", not as an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointSet {
    front_channel_base: Option<String>,
    back_channel_base: Option<String>,
    relative_urls: RelativeUrls,
    resolved: Option<ResolvedEndpoints>,
}

impl EndpointSet {
    /// The set used before any front-channel URL is configured.
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub(crate) fn relative(front: String, back: Option<String>) -> Self {
        Self {
            front_channel_base: Some(front),
            back_channel_base: back,
            relative_urls: RelativeUrls::Always,
            resolved: None,
        }
    }

    pub(crate) fn absolute(front: String, back: Option<String>, resolved: ResolvedEndpoints) -> Self {
        Self {
            front_channel_base: Some(front),
            back_channel_base: back,
            relative_urls: RelativeUrls::Never,
            resolved: Some(resolved),
        }
    }

    pub fn state(&self) -> ResolutionState {
        match (&self.front_channel_base, self.relative_urls) {
            (None, _) => ResolutionState::Unresolved,
            (Some(_), RelativeUrls::Always) => ResolutionState::Relative,
            (Some(_), RelativeUrls::Never) => ResolutionState::Absolute,
        }
    }

    /// Normalized front-channel base URL, as configured.
    pub fn front_channel_base(&self) -> Option<&str> {
        self.front_channel_base.as_deref()
    }

    /// Normalized back-channel base URL, if one was configured.
    pub fn back_channel_base(&self) -> Option<&str> {
        self.back_channel_base.as_deref()
    }

    pub fn relative_urls(&self) -> RelativeUrls {
        self.relative_urls
    }

    /// Authorization endpoint. Callers append the request's query parameters.
    pub fn auth_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.auth_url)
    }

    pub fn realm_info_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.realm_info_url)
    }

    pub fn account_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.account_url)
    }

    pub fn token_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.token_url)
    }

    /// End-session endpoint. Callers append the request's query parameters.
    pub fn logout_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.logout_url)
    }

    pub fn register_node_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.register_node_url)
    }

    pub fn unregister_node_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.unregister_node_url)
    }

    pub fn jwks_url(&self) -> Option<&Url> {
        self.resolved.as_ref().map(|r| &r.jwks_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_has_no_endpoints() {
        let set = EndpointSet::unresolved();
        assert_eq!(set.state(), ResolutionState::Unresolved);
        assert_eq!(set.relative_urls(), RelativeUrls::Never);
        assert!(set.front_channel_base().is_none());
        assert!(set.auth_url().is_none());
        assert!(set.jwks_url().is_none());
    }

    #[test]
    fn relative_keeps_bases_only() {
        let set = EndpointSet::relative("/auth".into(), Some("http://kc:8080".into()));
        assert_eq!(set.state(), ResolutionState::Relative);
        assert_eq!(set.front_channel_base(), Some("/auth"));
        assert_eq!(set.back_channel_base(), Some("http://kc:8080"));
        assert!(set.token_url().is_none());
    }
}
