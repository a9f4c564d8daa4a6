//! Process-wide configuration.
//!
//! A single immutable [`GateConfig`] is constructed once at process start
//! (typically via [`GateConfigBuilder::from_env`]) and passed by reference
//! into each component. Business logic never reads environment state.

use secrecy::SecretString;
use url::Url;

use crate::error::{GateError, Result};

/// Immutable configuration for the billing entitlement core.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Base URL of the owner-facing app, without a trailing slash. Checkout
    /// success/cancel redirects land here.
    pub base_url: String,
    /// Base URL of the customer-facing app; order-completion deep links
    /// point here.
    pub client_base_url: String,
    /// The provider price the checkout sells. `None` is a deployable but
    /// degraded state: checkout issuance fails as misconfigured.
    pub checkout_price_id: Option<String>,
    /// Payment provider settings.
    pub provider: ProviderConfig,
}

impl GateConfig {
    /// Checkout success redirect, carrying the provider-substituted session
    /// id placeholder.
    #[must_use]
    pub fn checkout_success_url(&self) -> String {
        format!("{}/?session_id={{CHECKOUT_SESSION_ID}}", self.base_url)
    }

    /// Checkout cancel redirect (the app base URL).
    #[must_use]
    pub fn checkout_cancel_url(&self) -> String {
        self.base_url.clone()
    }
}

/// Payment provider settings, including transport retry tuning for the live
/// client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider secret key. Held in a `SecretString` so it never appears in
    /// debug output.
    pub secret_key: SecretString,
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            secret_key: SecretString::new(String::new()),
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_seconds: 30,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Builder for [`GateConfig`] with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct GateConfigBuilder {
    base_url: String,
    client_base_url: Option<String>,
    checkout_price_id: Option<String>,
    provider: ProviderConfig,
}

impl GateConfigBuilder {
    pub fn new() -> Self {
        Self {
            base_url: default_base_url(),
            client_base_url: None,
            checkout_price_id: None,
            provider: ProviderConfig::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_client_base_url(mut self, url: impl Into<String>) -> Self {
        self.client_base_url = Some(url.into());
        self
    }

    pub fn with_checkout_price_id(mut self, price_id: impl Into<String>) -> Self {
        self.checkout_price_id = Some(price_id.into());
        self
    }

    pub fn with_secret_key(mut self, key: impl Into<SecretString>) -> Self {
        self.provider.secret_key = key.into();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.provider.max_retries = retries;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.provider.timeout_seconds = seconds;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Recognized variables:
    /// - `ORDERGATE_BASE_URL`: owner app base URL
    /// - `ORDERGATE_CLIENT_BASE_URL`: customer app base URL
    /// - `ORDERGATE_CHECKOUT_PRICE_ID`: provider price for checkout
    /// - `STRIPE_SECRET_KEY`: provider secret key
    pub fn from_env(mut self) -> Self {
        if let Ok(url) = std::env::var("ORDERGATE_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(url) = std::env::var("ORDERGATE_CLIENT_BASE_URL") {
            self.client_base_url = Some(url);
        }
        if let Ok(price) = std::env::var("ORDERGATE_CHECKOUT_PRICE_ID") {
            if !price.is_empty() {
                self.checkout_price_id = Some(price);
            }
        }
        if let Ok(key) = std::env::var("STRIPE_SECRET_KEY") {
            self.provider.secret_key = SecretString::new(key);
        }
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns `ServerMisconfigured` for an unparseable base URL, a
    /// non-HTTP(S) scheme, an empty price id, or zero retry/timeout values.
    pub fn build(self) -> Result<GateConfig> {
        let base_url = normalize_base_url(&self.base_url)?;
        let client_base_url = match self.client_base_url {
            Some(ref url) => normalize_base_url(url)?,
            None => base_url.clone(),
        };

        if let Some(ref price) = self.checkout_price_id {
            if price.trim().is_empty() {
                return Err(GateError::server_misconfigured(
                    "checkout price id is set but empty",
                ));
            }
        }

        if self.provider.timeout_seconds == 0 {
            return Err(GateError::server_misconfigured(
                "provider timeout must be greater than 0",
            ));
        }
        if self.provider.base_delay_ms == 0 || self.provider.max_delay_ms == 0 {
            return Err(GateError::server_misconfigured(
                "provider backoff delays must be greater than 0",
            ));
        }

        Ok(GateConfig {
            base_url,
            client_base_url,
            checkout_price_id: self.checkout_price_id,
            provider: self.provider,
        })
    }
}

impl Default for GateConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and normalize a base URL: must be absolute http(s), trailing
/// slashes are trimmed so redirect URLs concatenate cleanly.
fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw)
        .map_err(|e| GateError::server_misconfigured(format!("invalid base URL '{raw}': {e}")))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(GateError::server_misconfigured(format!(
            "base URL '{raw}' must use http or https"
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}
