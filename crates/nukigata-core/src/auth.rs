//! Service-account token issuance.
//!
//! A [`TokenIssuer`] signs a short-lived assertion with the service-account
//! key and exchanges it at the token endpoint using the JWT bearer grant. The
//! resulting access token is cached and replaced once it comes within the
//! safety margin of its expiry.
//!
//! The exchange is a single POST and is never retried: a rejected assertion
//! means bad key material or a misconfigured account, and sending it again
//! changes nothing.
//!
//! Concurrent callers that find the cache stale may each perform an exchange.
//! The last writer wins; every caller still receives a valid token.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{truncate_body, NukigataError, NukigataResult};
use crate::signer::{AssertionClaims, SignedAssertion, Signer, MAX_ASSERTION_LIFETIME_SECS};
use crate::types::{AccessToken, ServiceIdentity};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Default margin before expiry at which a cached token is replaced.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 60;

/// Token source for resource clients.
#[derive(Debug, Clone)]
pub enum TokenProvider {
    /// Pre-issued bearer token (personal access tokens, tests).
    Static(String),

    /// Service-account token exchange.
    ServiceAccount(TokenIssuer),
}

impl TokenProvider {
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::Static(token.into())
    }

    /// Bearer value for the `Authorization` header.
    pub async fn bearer(&self) -> NukigataResult<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(issuer) => Ok(issuer.get_token().await?.value),
        }
    }
}

impl From<TokenIssuer> for TokenProvider {
    fn from(issuer: TokenIssuer) -> Self {
        Self::ServiceAccount(issuer)
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Issues and caches access tokens for one service identity.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    issuer_email: String,
    scope: String,
    signer: Signer,
    token_url: String,
    client: reqwest::Client,
    safety_margin: chrono::Duration,
    cached_token: Arc<RwLock<Option<AccessToken>>>,
}

impl TokenIssuer {
    /// Parse the identity's key and prepare an issuer.
    ///
    /// The token endpoint is the key file's `token_uri` when present,
    /// otherwise [`DEFAULT_TOKEN_URL`].
    pub fn new(identity: &ServiceIdentity, client: reqwest::Client) -> NukigataResult<Self> {
        if identity.scopes.is_empty() {
            return Err(NukigataError::config("service identity has no scopes"));
        }

        let signer = Signer::from_pem(&identity.private_key_pem)?;
        let token_url = identity
            .token_uri
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        Ok(Self {
            issuer_email: identity.issuer_email.clone(),
            scope: identity.scope_claim(),
            signer,
            token_url,
            client,
            safety_margin: chrono::Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_safety_margin(mut self, margin: chrono::Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Get a token valid for at least the safety margin, exchanging a fresh
    /// assertion only when the cached one is missing or stale.
    pub async fn get_token(&self) -> NukigataResult<AccessToken> {
        {
            let cache = self.cached_token.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid_at(Utc::now(), self.safety_margin) {
                    debug!("using cached access token");
                    return Ok(cached.clone());
                }
            }
        }

        debug!(token_url = %self.token_url, "refreshing access token");
        let token = self.exchange().await?;

        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(token.clone());
        }

        Ok(token)
    }

    /// Currently cached token, valid or not.
    pub async fn cached(&self) -> Option<AccessToken> {
        self.cached_token.read().await.clone()
    }

    /// Drop the cached token so the next call exchanges a new assertion.
    pub async fn clear_cache(&self) {
        let mut cache = self.cached_token.write().await;
        *cache = None;
    }

    /// Sign a fresh assertion for this identity.
    pub fn assertion(&self) -> NukigataResult<SignedAssertion> {
        self.assertion_at(Utc::now())
    }

    fn assertion_at(&self, issued_at: DateTime<Utc>) -> NukigataResult<SignedAssertion> {
        let claims =
            AssertionClaims::new(&self.issuer_email, &self.scope, &self.token_url, issued_at);
        self.signer.sign(&claims)
    }

    async fn exchange(&self) -> NukigataResult<AccessToken> {
        let issued_at = Utc::now();
        let assertion = self.assertion_at(issued_at)?.compact();

        let response = self
            .client
            .post(&self.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| NukigataError::Network {
                message: format!("failed to reach token endpoint: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NukigataError::Auth {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        let token_response: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| NukigataError::InvalidResponse {
                    message: format!("failed to parse token response: {}", e),
                })?;

        if token_response.access_token.is_empty() {
            return Err(NukigataError::InvalidResponse {
                message: "token response has an empty access_token".into(),
            });
        }

        let expires_in = token_response
            .expires_in
            .unwrap_or(MAX_ASSERTION_LIFETIME_SECS);
        let expires_at = token_expiry(issued_at, expires_in)?;

        info!(
            issuer = %self.issuer_email,
            expires_in,
            token_type = token_response.token_type.as_deref().unwrap_or("Bearer"),
            "obtained access token"
        );

        Ok(AccessToken {
            value: token_response.access_token,
            expires_at,
        })
    }
}

/// Expiry instant for a token issued at `issued_at` that lives `expires_in`
/// seconds. Non-positive or unrepresentable lifetimes are rejected.
fn token_expiry(issued_at: DateTime<Utc>, expires_in: i64) -> NukigataResult<DateTime<Utc>> {
    let invalid = || NukigataError::InvalidResponse {
        message: format!("token response has an invalid expires_in ({})", expires_in),
    };
    if expires_in <= 0 {
        return Err(invalid());
    }
    TimeDelta::try_seconds(expires_in)
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .ok_or_else(invalid)
}
