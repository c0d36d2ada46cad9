//! OpenID Connect relying-party deployment configuration for Keyward.
//!
//! A [`DeploymentConfig`] holds the realm, client options, the signing key
//! locator and an immutable [`EndpointSet`] computed from one or two base URLs
//! by [`UrlResolver`]. The endpoint set is swapped atomically on
//! reconfiguration, so request handlers sharing an `Arc<DeploymentConfig>`
//! always read a consistent snapshot.
//!
//! # Example
//!
//! ```ignore
//! use keyward_adapter::prelude::*;
//!
//! let config = AdapterConfig::load("keycloak.json")?;
//! let deployment = Arc::new(DeploymentBuilder::build(&config)?);
//!
//! assert!(deployment.is_configured());
//! let token_url = deployment.token_url();
//! ```

pub mod config;
pub mod constants;
pub mod credentials;
pub mod deployment;
pub mod endpoints;
pub mod error;
pub mod keys;
pub mod policy;
pub mod resolver;
pub mod supplier;

pub use config::{AdapterConfig, ConfigError, DeploymentBuilder};
pub use credentials::{ClientCredentialsProvider, ClientIdAndSecretCredentials};
pub use deployment::{CorsSettings, DeploymentConfig, SslRequired, TokenStore};
pub use endpoints::{EndpointSet, RelativeUrls, ResolutionState};
pub use error::{AdapterError, BoxError, Collaborator, EndpointInput};
pub use keys::{HardcodedKeyLocator, JwksKeyLocator, KeyError, KeyLocator};
pub use policy::PolicyEnforcer;
pub use resolver::UrlResolver;
pub use supplier::Supplier;

pub mod prelude {
    //! Re-exports of the types needed to build and share a deployment.
    pub use crate::{
        AdapterConfig, AdapterError, DeploymentBuilder, DeploymentConfig, EndpointSet,
        KeyLocator, RelativeUrls, UrlResolver,
    };
    pub use std::sync::Arc;
}
