use std::collections::HashMap;

use keyward_adapter::{ClientCredentialsProvider, ClientIdAndSecretCredentials, DeploymentConfig};
use reqwest::header::{HeaderMap, AUTHORIZATION};

fn deployment(public_client: bool) -> DeploymentConfig {
    let mut deployment = DeploymentConfig::new();
    deployment.set_resource_name("orders-app");
    deployment.set_public_client(public_client);
    deployment
}

#[test]
fn test_confidential_client_uses_basic_auth() {
    let mut credentials = HashMap::new();
    credentials.insert("secret".to_string(), serde_json::json!("s3cret"));
    let provider = ClientIdAndSecretCredentials::from_credentials(&credentials);

    let mut headers = HeaderMap::new();
    let mut form = HashMap::new();
    provider.set_client_credentials(&deployment(false), &mut headers, &mut form);

    // base64("orders-app:s3cret")
    assert_eq!(
        headers.get(AUTHORIZATION).unwrap(),
        "Basic b3JkZXJzLWFwcDpzM2NyZXQ="
    );
    assert!(form.is_empty());
}

#[test]
fn test_public_client_sends_client_id() {
    let provider = ClientIdAndSecretCredentials::new(None);

    let mut headers = HeaderMap::new();
    let mut form = HashMap::new();
    provider.set_client_credentials(&deployment(true), &mut headers, &mut form);

    assert!(headers.get(AUTHORIZATION).is_none());
    assert_eq!(form.get("client_id").map(String::as_str), Some("orders-app"));
}

#[test]
fn test_missing_secret_attaches_nothing() {
    let provider = ClientIdAndSecretCredentials::new(None);

    let mut headers = HeaderMap::new();
    let mut form = HashMap::new();
    provider.set_client_credentials(&deployment(false), &mut headers, &mut form);

    assert!(headers.is_empty());
    assert!(form.is_empty());
}

#[test]
fn test_debug_masks_secret() {
    let provider = ClientIdAndSecretCredentials::new(Some("s3cret".into()));
    let debug = format!("{provider:?}");
    assert!(!debug.contains("s3cret"));
    assert_eq!(provider.id(), "secret");
}
