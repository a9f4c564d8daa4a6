//! Live Stripe client.
//!
//! Production implementation of the provider traits with secure API key
//! handling, per-request timeouts, and bounded exponential backoff for
//! transient failures. Retry here is transport-level only; the components
//! consuming these traits never retry.

use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::{GateError, Result};
use crate::provider::{
    CheckoutClient, CheckoutCustomer, CheckoutSessionData, CreateCheckoutRequest, ResolvedSession,
    SessionResolver, SubscriptionLister,
};
use crate::subscription::{SubscriptionRecord, SubscriptionStatus};

/// Metadata key correlating a checkout session back to its site.
const META_SITE_KEY: &str = "siteKey";

/// Page size for subscription listing. The classification only needs the
/// most recent page.
const SUBSCRIPTION_PAGE_LIMIT: u64 = 10;

/// Validate a Stripe API key format.
///
/// Valid prefixes: `sk_test_`, `sk_live_`, `rk_test_`, `rk_live_`.
fn validate_api_key(key: &str) -> Result<()> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.is_empty() {
        return Err(GateError::server_misconfigured(
            "provider API key is not set",
        ));
    }

    if key.len() < MIN_KEY_LENGTH {
        return Err(GateError::server_misconfigured(format!(
            "provider API key too short (minimum {MIN_KEY_LENGTH} characters)"
        )));
    }

    let valid_prefixes = ["sk_test_", "sk_live_", "rk_test_", "rk_live_"];
    if !valid_prefixes.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(GateError::server_misconfigured(
            "provider API key must start with sk_test_, sk_live_, rk_test_, or rk_live_",
        ));
    }

    Ok(())
}

/// Parse a customer id string into a Stripe customer id.
#[inline]
fn parse_customer_id(id: &str) -> Result<stripe::CustomerId> {
    id.parse()
        .map_err(|_| GateError::invalid_request(format!("invalid customer id: {id}")))
}

/// Live Stripe client.
///
/// Holds its secret key in the process-wide [`ProviderConfig`]; no
/// environment lookups happen here or anywhere downstream.
#[derive(Clone)]
pub struct LiveStripeClient {
    client: stripe::Client,
    config: ProviderConfig,
}

impl LiveStripeClient {
    /// Create a new live client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerMisconfigured` if the API key format is invalid.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        validate_api_key(config.secret_key.expose_secret())?;

        let client = stripe::Client::new(config.secret_key.expose_secret());

        Ok(Self { client, config })
    }

    /// Whether the client is using a test-mode API key.
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.config.secret_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    /// Client configured with an idempotency key for mutating operations.
    #[inline]
    fn idempotent_client(&self, operation: &str) -> stripe::Client {
        let key = format!("{}_{}", operation, uuid::Uuid::new_v4());
        self.client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key))
    }
}

// Debug implementation that doesn't expose the API key.
impl std::fmt::Debug for LiveStripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStripeClient")
            .field("is_test_mode", &self.is_test_mode())
            .field("max_retries", &self.config.max_retries)
            .finish_non_exhaustive()
    }
}

/// Execute an operation with per-request timeout and bounded backoff.
///
/// Retries on HTTP 429, 5xx, and timeouts.
async fn with_retry<T, F, Fut>(config: &ProviderConfig, operation: &str, operation_fn: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, stripe::StripeError>>,
{
    let timeout_duration = Duration::from_secs(config.timeout_seconds);
    let mut attempts = 0;

    loop {
        let result = tokio::time::timeout(timeout_duration, operation_fn()).await;

        match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                if !is_retryable_error(&e) || attempts >= config.max_retries {
                    return Err(map_stripe_error(e, operation));
                }

                let delay =
                    calculate_backoff_delay(attempts, config.base_delay_ms, config.max_delay_ms);
                tracing::warn!(
                    target: "ordergate::stripe",
                    operation = operation,
                    attempt = attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying provider call after transient error"
                );
                tokio::time::sleep(delay).await;
                attempts += 1;
            }
            Err(_timeout) => {
                if attempts >= config.max_retries {
                    return Err(GateError::network(
                        operation,
                        format!("request timed out after {} seconds", config.timeout_seconds),
                    ));
                }

                let delay =
                    calculate_backoff_delay(attempts, config.base_delay_ms, config.max_delay_ms);
                tracing::warn!(
                    target: "ordergate::stripe",
                    operation = operation,
                    attempt = attempts + 1,
                    timeout_seconds = config.timeout_seconds,
                    "provider call timed out, retrying"
                );
                tokio::time::sleep(delay).await;
                attempts += 1;
            }
        }
    }
}

/// Check if an error is retryable.
#[inline]
fn is_retryable_error(error: &stripe::StripeError) -> bool {
    match error {
        stripe::StripeError::Stripe(request_error) => {
            let status = request_error.http_status;
            status == 429 || (500..600).contains(&status)
        }
        stripe::StripeError::Timeout => true,
        _ => false,
    }
}

/// Exponential backoff with jitter (0-25% of the delay).
#[inline]
fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt));
    let delay_ms = delay_ms.min(max_ms);

    let jitter = if delay_ms > 0 {
        fastrand::u64(0..=delay_ms / 4)
    } else {
        0
    };
    Duration::from_millis(delay_ms.saturating_add(jitter))
}

/// Map Stripe errors into the crate taxonomy.
fn map_stripe_error(error: stripe::StripeError, operation: &str) -> GateError {
    match error {
        stripe::StripeError::Stripe(request_error) => GateError::Provider {
            operation: operation.to_string(),
            message: request_error
                .message
                .clone()
                .unwrap_or_else(|| "unknown provider error".to_string()),
            code: request_error.code.as_ref().map(|c| format!("{c:?}")),
            http_status: Some(request_error.http_status),
        },
        stripe::StripeError::Timeout => {
            GateError::network(operation, "request timed out".to_string())
        }
        stripe::StripeError::ClientError(message) => GateError::network(operation, message),
        other => GateError::provider(operation, other.to_string()),
    }
}

/// Map a Stripe subscription to the crate's record type.
fn map_subscription_record(sub: stripe::Subscription) -> SubscriptionRecord {
    let status = match sub.status {
        stripe::SubscriptionStatus::Active => SubscriptionStatus::Active,
        stripe::SubscriptionStatus::Trialing => SubscriptionStatus::Trialing,
        stripe::SubscriptionStatus::Canceled => SubscriptionStatus::Canceled,
        stripe::SubscriptionStatus::Incomplete => SubscriptionStatus::Incomplete,
        _ => SubscriptionStatus::Other,
    };

    SubscriptionRecord {
        id: sub.id.to_string(),
        status,
        cancel_at_period_end: sub.cancel_at_period_end,
        customer_id: sub.customer.id().to_string(),
    }
}

#[async_trait]
impl SubscriptionLister for LiveStripeClient {
    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>> {
        let customer_id = parse_customer_id(customer_id)?;

        let mut params = stripe::ListSubscriptions::new();
        params.customer = Some(customer_id);
        params.status = Some(stripe::SubscriptionStatusFilter::All);
        params.limit = Some(SUBSCRIPTION_PAGE_LIMIT);

        let list = with_retry(&self.config, "list_subscriptions", || {
            let client = self.client.clone();
            let params = params.clone();
            async move { stripe::Subscription::list(&client, &params).await }
        })
        .await?;

        Ok(list.data.into_iter().map(map_subscription_record).collect())
    }
}

#[async_trait]
impl CheckoutClient for LiveStripeClient {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSessionData> {
        let client = self.idempotent_client("create_checkout_session");

        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Subscription);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);

        match &request.customer {
            CheckoutCustomer::Existing(customer_id) => {
                params.customer = Some(parse_customer_id(customer_id)?);
            }
            CheckoutCustomer::Email(email) => {
                params.customer_email = Some(email);
            }
        }

        params.line_items = Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let mut metadata = HashMap::new();
        metadata.insert(META_SITE_KEY.to_string(), request.site_key.clone());
        params.metadata = Some(metadata);

        let session = with_retry(&self.config, "create_checkout_session", || {
            let client = client.clone();
            let params = params.clone();
            async move { stripe::CheckoutSession::create(&client, params).await }
        })
        .await?;

        Ok(CheckoutSessionData {
            id: session.id.to_string(),
            url: session.url.ok_or_else(|| {
                GateError::provider("create_checkout_session", "checkout session URL missing")
            })?,
        })
    }
}

#[async_trait]
impl SessionResolver for LiveStripeClient {
    async fn resolve_session(&self, session_id: &str) -> Result<ResolvedSession> {
        let session_id: stripe::CheckoutSessionId = session_id
            .parse()
            .map_err(|_| GateError::invalid_request(format!("invalid session id: {session_id}")))?;

        let session = with_retry(&self.config, "resolve_session", || {
            let client = self.client.clone();
            let session_id = session_id.clone();
            async move { stripe::CheckoutSession::retrieve(&client, &session_id, &[]).await }
        })
        .await?;

        Ok(ResolvedSession {
            id: session.id.to_string(),
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            site_key: session
                .metadata
                .as_ref()
                .and_then(|m| m.get(META_SITE_KEY))
                .cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_api_key_validation() {
        assert!(validate_api_key("sk_test_1234567890abcdef1234").is_ok());
        assert!(validate_api_key("rk_live_1234567890abcdef1234").is_ok());

        assert!(validate_api_key("").is_err());
        assert!(validate_api_key("sk_test_short").is_err());
        assert!(validate_api_key("pk_test_1234567890abcdef1234").is_err());
    }

    #[test]
    fn test_client_rejects_bad_key() {
        let config = ProviderConfig {
            secret_key: SecretString::new("not-a-key".to_string()),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            LiveStripeClient::new(config),
            Err(GateError::ServerMisconfigured(_))
        ));
    }

    #[test]
    fn test_test_mode_detection() {
        let config = ProviderConfig {
            secret_key: SecretString::new("sk_test_1234567890abcdef1234".to_string()),
            ..ProviderConfig::default()
        };
        let client = LiveStripeClient::new(config).unwrap();
        assert!(client.is_test_mode());
    }

    #[test]
    fn test_backoff_is_bounded() {
        // 2^attempt growth, capped at max, plus at most 25% jitter.
        let delay = calculate_backoff_delay(0, 500, 30_000);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(625));

        let delay = calculate_backoff_delay(10, 500, 30_000);
        assert!(delay <= Duration::from_millis(37_500));
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let config = ProviderConfig {
            secret_key: SecretString::new("sk_test_1234567890abcdef1234".to_string()),
            ..ProviderConfig::default()
        };
        let client = LiveStripeClient::new(config).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk_test_1234567890abcdef1234"));
    }
}
