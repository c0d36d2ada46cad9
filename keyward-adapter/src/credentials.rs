use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::warn;

use crate::deployment::DeploymentConfig;

/// Attaches client authentication material to outbound token requests.
///
/// Implementations are invoked by the code performing code-to-token exchange,
/// refresh and logout calls; this crate only carries them on the deployment.
pub trait ClientCredentialsProvider: Send + Sync {
    /// Key of this provider in the `credentials` configuration map.
    fn id(&self) -> &'static str;

    /// Add credentials to the outgoing request headers and form parameters.
    fn set_client_credentials(
        &self,
        deployment: &DeploymentConfig,
        headers: &mut HeaderMap,
        form: &mut HashMap<String, String>,
    );
}

/// `client_secret_basic` authentication.
///
/// Confidential clients send `Authorization: Basic base64(id:secret)` with both
/// parts form-urlencoded; public clients only add `client_id` to the form.
#[derive(Clone)]
pub struct ClientIdAndSecretCredentials {
    secret: Option<String>,
}

impl ClientIdAndSecretCredentials {
    pub const PROVIDER_ID: &'static str = "secret";

    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Build from the `credentials` configuration map.
    pub fn from_credentials(credentials: &HashMap<String, serde_json::Value>) -> Self {
        let secret = credentials
            .get(Self::PROVIDER_ID)
            .and_then(|v| v.as_str())
            .map(String::from);
        Self::new(secret)
    }
}

impl std::fmt::Debug for ClientIdAndSecretCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdAndSecretCredentials")
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ClientCredentialsProvider for ClientIdAndSecretCredentials {
    fn id(&self) -> &'static str {
        Self::PROVIDER_ID
    }

    fn set_client_credentials(
        &self,
        deployment: &DeploymentConfig,
        headers: &mut HeaderMap,
        form: &mut HashMap<String, String>,
    ) {
        let Some(client_id) = deployment.resource_name() else {
            warn!("No resource name configured, client credentials not attached");
            return;
        };

        match (&self.secret, deployment.is_public_client()) {
            (Some(secret), false) => {
                let value = basic_auth_value(client_id, secret);
                match HeaderValue::from_str(&value) {
                    Ok(header) => {
                        headers.insert(AUTHORIZATION, header);
                    }
                    Err(e) => warn!(error = %e, "Could not encode client credentials header"),
                }
            }
            (None, false) => {
                warn!(client_id = %client_id, "Client secret not provided for confidential client");
            }
            (_, true) => {
                form.insert("client_id".to_string(), client_id.to_string());
            }
        }
    }
}

fn basic_auth_value(client_id: &str, secret: &str) -> String {
    let encode = |s: &str| form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    let raw = format!("{}:{}", encode(client_id), encode(secret));
    format!("Basic {}", STANDARD.encode(raw))
}

#[cfg(test)]
mod tests {
    use super::basic_auth_value;

    #[test]
    fn basic_auth_encodes_both_parts() {
        // "my client:s3cr:t" -> "my+client:s3cr%3At"
        assert_eq!(
            basic_auth_value("my client", "s3cr:t"),
            "Basic bXkrY2xpZW50OnMzY3IlM0F0"
        );
    }
}
