//! Reactor service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CORALBAY_DATABASE_URL` - `PostgreSQL` connection string
//! - `CORALBAY_EVENTS_TOKEN` - Shared secret presented by the change-stream push
//! - `CORALBAY_IDENTITY_TOKEN_SECRET` - HMAC key for caller identity tokens (min 32 chars)
//! - `CORALBAY_SUPER_ADMIN_EMAIL` - Signup email granted the SUPER_ADMIN role
//! - `IDENTITY_ADMIN_ENDPOINT` - Identity provider admin API base URL
//! - `IDENTITY_ADMIN_KEY` - Identity provider admin API key
//! - `PAYMENT_SECRET_KEY` - Payment gateway secret API key
//! - `PAYMENT_WEBHOOK_SECRET` - Payment webhook signing secret
//! - `SEARCH_APP_ID` - Search provider application id
//! - `SEARCH_ADMIN_API_KEY` - Search provider admin API key
//! - `SHIPPING_API_KEY` / `SHIPPING_API_SECRET` - Shipping gateway credentials
//!
//! ## Optional
//! - `CORALBAY_HOST` - Bind address (default: 127.0.0.1)
//! - `CORALBAY_PORT` - Listen port (default: 3000)
//! - `PAYMENT_API_BASE` - Payment gateway base URL (default: https://api.stripe.com/v1)
//! - `SEARCH_ENDPOINT` - Search provider base URL (default derived from app id)
//! - `SHIPPING_API_BASE` - Shipping gateway base URL (default: https://ssapi.shipstation.com)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Reactor service configuration.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Shared secret required on `/events` pushes
    pub events_token: SecretString,
    /// Signup email that receives the SUPER_ADMIN role
    pub super_admin_email: String,
    /// Caller identity token verification
    pub identity: IdentityConfig,
    /// Payment gateway configuration
    pub payment: PaymentConfig,
    /// Search index provider configuration
    pub search: SearchConfig,
    /// Shipping gateway configuration
    pub shipping: ShippingConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Identity provider configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct IdentityConfig {
    /// HMAC key the auth frontend signs caller tokens with
    pub token_secret: SecretString,
    /// Identity provider admin API base URL
    pub admin_endpoint: String,
    /// Identity provider admin API key
    pub admin_key: SecretString,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("token_secret", &"[REDACTED]")
            .field("admin_endpoint", &self.admin_endpoint)
            .field("admin_key", &"[REDACTED]")
            .finish()
    }
}

/// Payment gateway configuration.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Gateway secret API key
    pub secret_key: SecretString,
    /// Webhook signing secret
    pub webhook_secret: SecretString,
    /// Gateway API base URL
    pub api_base: String,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Search index provider configuration.
#[derive(Clone)]
pub struct SearchConfig {
    /// Provider application id
    pub app_id: String,
    /// Admin API key (write access)
    pub admin_api_key: SecretString,
    /// Provider base URL
    pub endpoint: String,
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("app_id", &self.app_id)
            .field("admin_api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Shipping gateway configuration.
#[derive(Clone)]
pub struct ShippingConfig {
    /// Gateway API key
    pub api_key: String,
    /// Gateway API secret
    pub api_secret: SecretString,
    /// Gateway API base URL; also the only host shipment webhook
    /// resource URLs may point at
    pub api_base: String,
}

impl std::fmt::Debug for ShippingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl ReactorConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("CORALBAY_DATABASE_URL")?;
        let host = get_env_or_default("CORALBAY_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("CORALBAY_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("CORALBAY_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("CORALBAY_PORT".to_string(), e.to_string()))?;

        let events_token = get_validated_secret("CORALBAY_EVENTS_TOKEN")?;
        let super_admin_email = get_required_env("CORALBAY_SUPER_ADMIN_EMAIL")?;

        let identity = IdentityConfig::from_env()?;
        let payment = PaymentConfig::from_env()?;
        let search = SearchConfig::from_env()?;
        let shipping = ShippingConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            events_token,
            super_admin_email,
            identity,
            payment,
            search,
            shipping,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl IdentityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let token_secret = get_validated_secret("CORALBAY_IDENTITY_TOKEN_SECRET")?;
        validate_token_secret(&token_secret, "CORALBAY_IDENTITY_TOKEN_SECRET")?;

        Ok(Self {
            token_secret,
            admin_endpoint: get_required_env("IDENTITY_ADMIN_ENDPOINT")?,
            admin_key: get_validated_secret("IDENTITY_ADMIN_KEY")?,
        })
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_validated_secret("PAYMENT_SECRET_KEY")?,
            webhook_secret: get_validated_secret("PAYMENT_WEBHOOK_SECRET")?,
            api_base: get_env_or_default("PAYMENT_API_BASE", "https://api.stripe.com/v1"),
        })
    }
}

impl SearchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let app_id = get_required_env("SEARCH_APP_ID")?;
        let endpoint = get_optional_env("SEARCH_ENDPOINT")
            .unwrap_or_else(|| format!("https://{}.algolia.net", app_id.to_lowercase()));

        Ok(Self {
            app_id,
            admin_api_key: get_validated_secret("SEARCH_ADMIN_API_KEY")?,
            endpoint,
        })
    }
}

impl ShippingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_required_env("SHIPPING_API_KEY")?,
            api_secret: get_validated_secret("SHIPPING_API_SECRET")?,
            api_base: get_env_or_default("SHIPPING_API_BASE", "https://ssapi.shipstation.com"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_token_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_high() {
        // Random-looking string should have high entropy
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_token_secret_too_short() {
        let secret = SecretString::from("short");
        let result = validate_token_secret(&secret, "TEST_TOKEN");
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = PaymentConfig {
            secret_key: SecretString::from("sk_live_very_private"),
            webhook_secret: SecretString::from("whsec_very_private"),
            api_base: "https://api.stripe.com/v1".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("very_private"));
        assert!(debug_output.contains("api.stripe.com"));
    }
}
