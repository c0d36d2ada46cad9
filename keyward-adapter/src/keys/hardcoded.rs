use std::future::Future;
use std::pin::Pin;

use jsonwebtoken::DecodingKey;

use super::{KeyError, KeyLocator};
use crate::deployment::DeploymentConfig;

/// Key locator backed by a single configured realm public key.
pub struct HardcodedKeyLocator {
    key: DecodingKey,
}

impl HardcodedKeyLocator {
    pub fn new(key: DecodingKey) -> Self {
        Self { key }
    }

    /// Build from an RSA public key, either PEM or the bare base64 DER body
    /// used by `realm-public-key`.
    pub fn from_rsa_public_key(encoded: &str) -> Result<Self, KeyError> {
        let trimmed = encoded.trim();
        let pem = if trimmed.starts_with("-----BEGIN") {
            trimmed.to_string()
        } else {
            let body: String = trimmed.split_whitespace().collect();
            let lines: Vec<&str> = body
                .as_bytes()
                .chunks(64)
                .filter_map(|chunk| std::str::from_utf8(chunk).ok())
                .collect();
            format!(
                "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
                lines.join("\n")
            )
        };
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map(Self::new)
            .map_err(|e| KeyError::InvalidKey(format!("realm public key: {e}")))
    }
}

impl KeyLocator for HardcodedKeyLocator {
    fn resolve<'a>(
        &'a self,
        _kid: Option<&'a str>,
        _deployment: &'a DeploymentConfig,
    ) -> Pin<Box<dyn Future<Output = Result<DecodingKey, KeyError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.key.clone()) })
    }

    fn reset(&self, _deployment: &DeploymentConfig) {}
}
