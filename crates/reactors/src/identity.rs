//! Caller identity and the identity provider adapter.
//!
//! The auth frontend mints a compact signed token for each logged-in
//! caller: `v1.<base64url payload>.<base64url hmac>`, HMAC-SHA256 keyed on
//! a secret shared with this service. RPC handlers extract an [`Identity`]
//! from the Authorization header; no identity means an authentication
//! error before any handler code runs.
//!
//! Role claims are only advisory here - authorization-sensitive paths
//! re-fetch the caller's role from the identity provider rather than
//! trusting a possibly-stale token.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use coralbay_core::{Role, UserId};

use crate::config::IdentityConfig;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";
const MAX_TOKEN_LEN: usize = 2048;

/// Errors from identity token handling and provider calls.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity token malformed")]
    MalformedToken,

    #[error("identity token signature invalid")]
    InvalidSignature,

    #[error("identity token expired")]
    Expired,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Client error: {0}")]
    Client(String),
}

/// The authenticated caller of an RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: UserId,
    pub email: String,
    /// Advisory role claim; absent until the signup flow assigns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Expiry as unix seconds.
    pub exp: i64,
}

/// Verify a bearer token and return the caller identity.
///
/// # Errors
///
/// Returns `IdentityError` if the token is malformed, forged, or expired.
pub fn verify_token(
    token: &str,
    secret: &SecretString,
    now: i64,
) -> Result<Identity, IdentityError> {
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(IdentityError::MalformedToken);
    }

    let mut parts = token.split('.');
    let (Some(version), Some(payload_part), Some(sig_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(IdentityError::MalformedToken);
    };
    if version != TOKEN_VERSION {
        return Err(IdentityError::MalformedToken);
    }

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| IdentityError::InvalidSignature)?;
    mac.update(payload_part.as_bytes());
    let expected = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| IdentityError::MalformedToken)?;
    mac.verify_slice(&expected)
        .map_err(|_| IdentityError::InvalidSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|_| IdentityError::MalformedToken)?;
    let identity: Identity =
        serde_json::from_slice(&payload).map_err(|_| IdentityError::MalformedToken)?;

    if identity.exp <= now {
        return Err(IdentityError::Expired);
    }

    Ok(identity)
}

/// Mint a token for an identity, used by tests and local tooling; the
/// production minter is the auth frontend.
#[must_use]
pub fn mint_token(identity: &Identity, secret: &SecretString) -> String {
    let payload = serde_json::to_vec(identity).expect("identity serializes");
    let payload_part = URL_SAFE_NO_PAD.encode(payload);

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload_part.as_bytes());
    let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{TOKEN_VERSION}.{payload_part}.{sig_part}")
}

/// Admin access to the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Write the role custom claim onto an auth user.
    async fn set_role_claim(&self, uid: &UserId, role: Role) -> Result<(), IdentityError>;

    /// Read an auth user's current role claim.
    async fn fetch_role(&self, uid: &UserId) -> Result<Option<Role>, IdentityError>;
}

/// REST client for the identity provider's admin API.
#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    endpoint: String,
}

impl IdentityClient {
    /// Create a new identity provider client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let mut headers = HeaderMap::new();
        let mut auth =
            HeaderValue::from_str(&format!("Bearer {}", config.admin_key.expose_secret()))
                .map_err(|e| IdentityError::Client(format!("invalid admin key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("Authorization", auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.admin_endpoint.trim_end_matches('/').to_owned(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    async fn set_role_claim(&self, uid: &UserId, role: Role) -> Result<(), IdentityError> {
        let response = self
            .client
            .post(format!("{}/users/{uid}/claims", self.endpoint))
            .json(&serde_json::json!({ "role": role }))
            .send()
            .await?;
        Self::check(response).await.map(|_| ())
    }

    async fn fetch_role(&self, uid: &UserId) -> Result<Option<Role>, IdentityError> {
        let response = self
            .client
            .get(format!("{}/users/{uid}", self.endpoint))
            .send()
            .await?;
        let response = Self::check(response).await?;

        let body: serde_json::Value = response.json().await?;
        Ok(body
            .pointer("/customClaims/role")
            .and_then(serde_json::Value::as_str)
            .and_then(|role| role.parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("1d3nt1ty-s1gn1ng-k3y-w1th-3ntr0py!")
    }

    fn identity() -> Identity {
        Identity {
            uid: UserId::new("user-1"),
            email: "jo@example.com".to_string(),
            role: Some(Role::Client),
            exp: 2_000_000_000,
        }
    }

    #[test]
    fn test_mint_verify_round_trip() {
        let token = mint_token(&identity(), &secret());
        let verified = verify_token(&token, &secret(), 1_700_000_000).expect("verify");
        assert_eq!(verified, identity());
    }

    #[test]
    fn test_forged_token_rejected() {
        let token = mint_token(&identity(), &secret());
        let other = SecretString::from("d1ff3r3nt-k3y-w1th-3ntr0py-h3r3!");
        assert!(matches!(
            verify_token(&token, &other, 1_700_000_000),
            Err(IdentityError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = mint_token(&identity(), &secret());
        let mut parts: Vec<&str> = token.split('.').collect();
        let swapped = mint_token(
            &Identity {
                role: Some(Role::SuperAdmin),
                ..identity()
            },
            &secret(),
        );
        let elevated: Vec<&str> = swapped.split('.').collect();
        parts[1] = elevated[1];
        let forged = parts.join(".");

        assert!(matches!(
            verify_token(&forged, &secret(), 1_700_000_000),
            Err(IdentityError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = mint_token(&identity(), &secret());
        assert!(matches!(
            verify_token(&token, &secret(), 2_000_000_001),
            Err(IdentityError::Expired)
        ));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        for bad in ["", "v1", "v1.only", "v2.a.b", "v1.a.b.c"] {
            assert!(matches!(
                verify_token(bad, &secret(), 0),
                Err(IdentityError::MalformedToken) | Err(IdentityError::InvalidSignature)
            ));
        }
    }
}
