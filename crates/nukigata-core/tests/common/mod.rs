//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::OnceLock;
use std::time::Duration;

use nukigata_core::{
    DieService, NukigataConfig, RetryPolicy, RetryingTransport, ServiceIdentity,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn test_key_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .expect("failed to generate key")
            .to_pkcs8_pem(LineEnding::LF)
            .expect("failed to encode key")
            .to_string()
    })
}

pub fn test_identity() -> ServiceIdentity {
    ServiceIdentity::new("scanner@example.iam.gserviceaccount.com", test_key_pem())
}

/// Millisecond-sized backoff so retry paths stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::default().with_delays(1, 5, 2)
}

pub fn fast_transport() -> RetryingTransport {
    RetryingTransport::with_timeout(Duration::from_secs(5), fast_retry())
        .expect("failed to create transport")
}

/// Config pointing every endpoint at `mock_server`.
pub fn mock_config(mock_server: &MockServer) -> NukigataConfig {
    NukigataConfig::default()
        .with_api_base(&mock_server.uri())
        .with_token_url(format!("{}/token", mock_server.uri()))
        .with_retry(fast_retry())
}

pub fn mock_service(config: NukigataConfig) -> DieService {
    DieService::new(config, Some(test_identity())).expect("failed to create service")
}

/// Token endpoint that always issues `ya29.test`.
pub async fn mount_token_endpoint(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.test",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(mock_server)
        .await;
}
