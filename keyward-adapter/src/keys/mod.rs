//! Signing key lookup for token verification.
//!
//! A [`KeyLocator`] owns its cache. The deployment only calls
//! [`KeyLocator::reset`] when the not-before watermark moves; everything else
//! is driven by the token verifier through [`KeyLocator::resolve`].

mod hardcoded;
mod jwks;

use std::future::Future;
use std::pin::Pin;

use jsonwebtoken::DecodingKey;

use crate::deployment::DeploymentConfig;
use crate::error::AdapterError;

pub use hardcoded::HardcodedKeyLocator;
pub use jwks::JwksKeyLocator;

/// Errors raised while locating a signing key.
#[derive(Debug)]
pub enum KeyError {
    /// No cached key matches the requested `kid`, even after a refresh.
    UnknownKeyId(String),

    /// The deployment has no absolute JWKS URL (unresolved or relative endpoints).
    MissingJwksUrl,

    /// Downloading or parsing the key set failed.
    JwksFetch(String),

    /// A key could not be turned into a verification key.
    InvalidKey(String),

    /// The deployment's HTTP client could not be obtained.
    HttpClient(AdapterError),
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyError::UnknownKeyId(kid) => write!(f, "Unknown signing key: {kid}"),
            KeyError::MissingJwksUrl => write!(f, "JWKS URL is not resolved"),
            KeyError::JwksFetch(msg) => write!(f, "JWKS fetch error: {msg}"),
            KeyError::InvalidKey(msg) => write!(f, "Invalid key: {msg}"),
            KeyError::HttpClient(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeyError::HttpClient(err) => Some(err),
            _ => None,
        }
    }
}

/// Resolves the keys that sign the realm's tokens.
pub trait KeyLocator: Send + Sync {
    /// Find the verification key for `kid`. A token without `kid` is accepted
    /// when the locator holds exactly one key.
    fn resolve<'a>(
        &'a self,
        kid: Option<&'a str>,
        deployment: &'a DeploymentConfig,
    ) -> Pin<Box<dyn Future<Output = Result<DecodingKey, KeyError>> + Send + 'a>>;

    /// Discard cached keys so the next lookup fetches fresh ones.
    ///
    /// Called once per not-before update. Must return without waiting on
    /// I/O; any refetch it starts runs in the background.
    fn reset(&self, deployment: &DeploymentConfig);
}
