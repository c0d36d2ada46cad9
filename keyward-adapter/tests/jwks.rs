use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use keyward_adapter::{
    DeploymentConfig, HardcodedKeyLocator, JwksKeyLocator, KeyError, KeyLocator, Supplier,
};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::json;

struct TestKey {
    kid: String,
    encoding_key: EncodingKey,
    jwk: serde_json::Value,
}

impl TestKey {
    fn generate(kid: &str) -> Self {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = private_key.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();

        Self {
            kid: kid.to_string(),
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
            jwk: json!({
                "kid": kid,
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            }),
        }
    }

    fn sign(&self) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, &json!({"sub": "u1", "exp": 4_000_000_000u64}), &self.encoding_key)
            .unwrap()
    }
}

/// Token issued by `key` verifies with `decoding_key`.
fn verifies(key: &TestKey, decoding_key: &DecodingKey) -> bool {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    jsonwebtoken::decode::<serde_json::Value>(&key.sign(), decoding_key, &validation).is_ok()
}

#[derive(Clone)]
struct JwksServer {
    body: Arc<Mutex<serde_json::Value>>,
    hits: Arc<AtomicUsize>,
}

impl JwksServer {
    fn new(keys: &[&TestKey]) -> Self {
        let server = Self {
            body: Arc::new(Mutex::new(json!({}))),
            hits: Arc::new(AtomicUsize::new(0)),
        };
        server.publish(keys);
        server
    }

    fn publish(&self, keys: &[&TestKey]) {
        let keys: Vec<_> = keys.iter().map(|k| k.jwk.clone()).collect();
        *self.body.lock().unwrap() = json!({ "keys": keys });
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn start(&self) -> String {
        let app = Router::new()
            .route("/realms/demo/protocol/openid-connect/certs", get(certs))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn certs(State(server): State<JwksServer>) -> Json<serde_json::Value> {
    server.hits.fetch_add(1, Ordering::SeqCst);
    let body = server.body.lock().unwrap().clone();
    Json(body)
}

async fn deployment_for(server: &JwksServer, locator: Arc<JwksKeyLocator>) -> DeploymentConfig {
    let base = server.start().await;
    let mut deployment = DeploymentConfig::new();
    deployment.set_realm("demo");
    deployment.set_key_locator(locator);
    deployment.set_front_channel_url(&base).unwrap();
    deployment
}

#[tokio::test]
async fn test_resolve_fetches_once_and_caches() {
    let key = TestKey::generate("k1");
    let server = JwksServer::new(&[&key]);
    let locator = Arc::new(JwksKeyLocator::new());
    let deployment = deployment_for(&server, locator.clone()).await;

    let first = locator.resolve(Some("k1"), &deployment).await.unwrap();
    let second = locator.resolve(Some("k1"), &deployment).await.unwrap();

    assert!(verifies(&key, &first));
    assert!(verifies(&key, &second));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_missing_kid_with_single_key() {
    let key = TestKey::generate("only");
    let server = JwksServer::new(&[&key]);
    let locator = Arc::new(JwksKeyLocator::new());
    let deployment = deployment_for(&server, locator.clone()).await;

    let decoding_key = locator.resolve(None, &deployment).await.unwrap();
    assert!(verifies(&key, &decoding_key));
}

#[tokio::test]
async fn test_unknown_kid_refetch_is_throttled() {
    let key = TestKey::generate("k1");
    let server = JwksServer::new(&[&key]);
    let locator = Arc::new(JwksKeyLocator::new());
    let deployment = deployment_for(&server, locator.clone()).await;

    locator.resolve(Some("k1"), &deployment).await.unwrap();
    let err = locator.resolve(Some("nope"), &deployment).await.unwrap_err();
    assert!(matches!(err, KeyError::UnknownKeyId(kid) if kid == "nope"));
    let err = locator.resolve(Some("nope"), &deployment).await.unwrap_err();
    assert!(matches!(err, KeyError::UnknownKeyId(_)));

    // Default minimum interval is 10s, so no second download yet.
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_unknown_kid_refetches_without_throttle() {
    let old = TestKey::generate("k1");
    let new = TestKey::generate("k2");
    let server = JwksServer::new(&[&old]);
    let locator = Arc::new(JwksKeyLocator::new());
    let mut deployment = deployment_for(&server, locator.clone()).await;
    deployment.set_min_time_between_jwks_requests(0);

    locator.resolve(Some("k1"), &deployment).await.unwrap();
    server.publish(&[&old, &new]);

    let decoding_key = locator.resolve(Some("k2"), &deployment).await.unwrap();
    assert!(verifies(&new, &decoding_key));
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_not_before_update_discards_cached_keys() {
    let old = TestKey::generate("k1");
    let new = TestKey::generate("k2");
    let server = JwksServer::new(&[&old]);
    let locator = Arc::new(JwksKeyLocator::new());
    let deployment = deployment_for(&server, locator.clone()).await;

    locator.resolve(Some("k1"), &deployment).await.unwrap();
    assert_eq!(server.hits(), 1);

    server.publish(&[&new]);
    deployment.update_not_before(1_700_000_000);
    assert_eq!(deployment.not_before(), 1_700_000_000);

    let decoding_key = locator.resolve(Some("k2"), &deployment).await.unwrap();
    assert!(verifies(&new, &decoding_key));
    assert_eq!(server.hits(), 2);

    let err = locator.resolve(Some("k1"), &deployment).await.unwrap_err();
    assert!(matches!(err, KeyError::UnknownKeyId(_)));
}

#[tokio::test]
async fn test_unresolved_deployment_has_no_jwks_url() {
    let locator = Arc::new(JwksKeyLocator::new());
    let mut deployment = DeploymentConfig::new();
    deployment.set_realm("demo");
    deployment.set_bearer_only(true);
    deployment.set_key_locator(locator.clone());

    let err = locator.resolve(Some("k1"), &deployment).await.unwrap_err();
    assert!(matches!(err, KeyError::MissingJwksUrl));
}

#[tokio::test]
async fn test_unreachable_jwks_endpoint() {
    let locator = Arc::new(JwksKeyLocator::new());
    let mut deployment = DeploymentConfig::new();
    deployment.set_realm("demo");
    deployment.set_key_locator(locator.clone());
    // Port 9 (discard) on loopback is expected to refuse connections.
    deployment.set_front_channel_url("http://127.0.0.1:9").unwrap();

    let err = locator.resolve(Some("k1"), &deployment).await.unwrap_err();
    assert!(matches!(err, KeyError::JwksFetch(_)));
}

#[tokio::test]
async fn test_hardcoded_locator_ignores_kid() {
    let key = TestKey::generate("static");
    let n = key.jwk["n"].as_str().unwrap();
    let e = key.jwk["e"].as_str().unwrap();
    let locator = HardcodedKeyLocator::new(DecodingKey::from_rsa_components(n, e).unwrap());
    let deployment = DeploymentConfig::new();

    let decoding_key = locator.resolve(Some("anything"), &deployment).await.unwrap();
    assert!(verifies(&key, &decoding_key));
    locator.reset(&deployment);
    let decoding_key = locator.resolve(None, &deployment).await.unwrap();
    assert!(verifies(&key, &decoding_key));
}

#[tokio::test]
async fn test_reset_defers_http_client_factory() {
    let calls = Arc::new(AtomicUsize::new(0));
    let locator = Arc::new(JwksKeyLocator::new());
    let mut deployment = DeploymentConfig::new();
    deployment.set_realm("demo");
    deployment.set_key_locator(locator.clone());
    deployment.set_front_channel_url("http://127.0.0.1:9").unwrap();
    let counter = calls.clone();
    deployment.set_http_client_factory(Supplier::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Err("client unavailable".into())
    }));

    deployment.update_not_before(10);
    // Single-threaded runtime: the refetch task has not been polled yet.
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    for _ in 0..100 {
        if calls.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
