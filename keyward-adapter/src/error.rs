use crate::config::ConfigError;

/// Boxed error returned by collaborator factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which configuration input a URL resolution failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointInput {
    /// The realm name substituted into every service path.
    Realm,
    /// The browser-facing base URL.
    FrontChannel,
    /// The server-to-server base URL.
    BackChannel,
    /// The URL of an inbound request used to resolve a relative deployment.
    Request,
}

impl std::fmt::Display for EndpointInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointInput::Realm => write!(f, "realm"),
            EndpointInput::FrontChannel => write!(f, "front-channel URL"),
            EndpointInput::BackChannel => write!(f, "back-channel URL"),
            EndpointInput::Request => write!(f, "request URL"),
        }
    }
}

/// A collaborator obtained through a deferred factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    HttpClient,
    PolicyEnforcer,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collaborator::HttpClient => write!(f, "HTTP client"),
            Collaborator::PolicyEnforcer => write!(f, "policy enforcer"),
        }
    }
}

/// Errors raised while configuring a deployment or acquiring its collaborators.
#[derive(Debug)]
pub enum AdapterError {
    /// A base URL (or the realm it is combined with) could not be resolved.
    /// The previously published endpoints stay in effect.
    InvalidEndpointConfiguration {
        input: EndpointInput,
        value: String,
        reason: String,
    },

    /// The HTTP client or policy enforcer factory failed.
    CollaboratorAcquisition {
        collaborator: Collaborator,
        source: BoxError,
    },

    /// The adapter configuration file could not be loaded or validated.
    Config(ConfigError),
}

impl AdapterError {
    pub(crate) fn invalid_endpoint(
        input: EndpointInput,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        AdapterError::InvalidEndpointConfiguration {
            input,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::InvalidEndpointConfiguration {
                input,
                value,
                reason,
            } => write!(f, "Invalid endpoint configuration: {input} '{value}': {reason}"),
            AdapterError::CollaboratorAcquisition {
                collaborator,
                source,
            } => write!(f, "Failed to obtain {collaborator}: {source}"),
            AdapterError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdapterError::CollaboratorAcquisition { source, .. } => Some(source.as_ref()),
            AdapterError::Config(err) => Some(err),
            AdapterError::InvalidEndpointConfiguration { .. } => None,
        }
    }
}

impl From<ConfigError> for AdapterError {
    fn from(err: ConfigError) -> Self {
        AdapterError::Config(err)
    }
}
