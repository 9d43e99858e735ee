//! Shared fixtures for unit tests.

use std::sync::OnceLock;

use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

use crate::types::ServiceIdentity;

/// One 2048-bit key per test binary; generation is slow in debug builds.
fn test_private_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("failed to generate key")
    })
}

pub(crate) fn test_key_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        test_private_key()
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap()
            .to_string()
    })
}

pub(crate) fn test_pkcs1_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        test_private_key()
            .to_pkcs1_pem(LineEnding::LF)
            .unwrap()
            .to_string()
    })
}

pub(crate) fn test_identity() -> ServiceIdentity {
    ServiceIdentity::new("scanner@example.iam.gserviceaccount.com", test_key_pem())
}
