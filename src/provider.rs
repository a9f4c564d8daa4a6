//! Payment provider trait seams.
//!
//! The provider is the source of truth for subscriptions; this crate talks
//! to it through three narrow traits so every component can be tested
//! against the mock client. The production implementation lives in
//! [`crate::live_client`].

use async_trait::async_trait;

use crate::error::Result;
use crate::subscription::SubscriptionRecord;

/// How a checkout session is bound to a payer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutCustomer {
    /// An existing provider customer.
    Existing(String),
    /// An email address; the provider creates the customer record.
    Email(String),
}

/// Request to create a provider checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutRequest {
    /// Payer identity the session is bound to.
    pub customer: CheckoutCustomer,
    /// Provider price being sold.
    pub price_id: String,
    /// Site the session is for; stored in session metadata so the redirect
    /// can be correlated back.
    pub site_key: String,
    /// Success redirect, carrying the provider-substituted session-id
    /// placeholder.
    pub success_url: String,
    /// Cancel redirect.
    pub cancel_url: String,
}

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionData {
    /// Provider session id.
    pub id: String,
    /// Hosted checkout URL to redirect the client to.
    pub url: String,
}

/// A checkout session resolved from its redirect id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    /// Provider session id.
    pub id: String,
    /// Customer the session belongs to, once known.
    pub customer_id: Option<String>,
    /// Site key from the session metadata, when the session was created by
    /// this crate's issuer.
    pub site_key: Option<String>,
}

/// Listing live subscription records for a customer.
#[async_trait]
pub trait SubscriptionLister: Send + Sync {
    /// Fetch the most recent page of subscription records (all statuses)
    /// for a provider customer.
    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>>;
}

/// Creating hosted checkout sessions.
#[async_trait]
pub trait CheckoutClient: Send + Sync {
    /// Create a subscription-mode checkout session.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSessionData>;
}

/// Resolving a checkout-redirect session id. Implementations must be pure
/// reads so repeat resolution of the same id has no side effects.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Resolve a session id to its customer and metadata.
    async fn resolve_session(&self, session_id: &str) -> Result<ResolvedSession>;
}

/// The full provider surface this crate consumes.
pub trait ProviderClient: SubscriptionLister + CheckoutClient + SessionResolver {}

impl<T: SubscriptionLister + CheckoutClient + SessionResolver> ProviderClient for T {}

/// Mock provider client for testing.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use crate::error::GateError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, RwLock};

    /// Mock provider client with seeded state, injectable failures, and
    /// call counters.
    #[derive(Default, Clone)]
    pub struct MockProviderClient {
        inner: Arc<MockProviderClientInner>,
    }

    #[derive(Default)]
    struct MockProviderClientInner {
        subscriptions: RwLock<HashMap<String, Vec<SubscriptionRecord>>>,
        sessions: RwLock<HashMap<String, ResolvedSession>>,
        session_counter: AtomicU64,
        list_calls: AtomicU64,
        create_calls: AtomicU64,
        resolve_calls: AtomicU64,
        fail_listing: AtomicBool,
        fail_resolution: AtomicBool,
    }

    impl MockProviderClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a subscription record under its customer.
        pub fn seed_subscription(&self, record: SubscriptionRecord) {
            self.inner
                .subscriptions
                .write()
                .unwrap()
                .entry(record.customer_id.clone())
                .or_default()
                .push(record);
        }

        /// Replace a customer's record set.
        pub fn set_subscriptions(&self, customer_id: &str, records: Vec<SubscriptionRecord>) {
            self.inner
                .subscriptions
                .write()
                .unwrap()
                .insert(customer_id.to_string(), records);
        }

        /// Seed a resolvable session (as if a checkout had completed).
        pub fn seed_session(&self, session: ResolvedSession) {
            self.inner
                .sessions
                .write()
                .unwrap()
                .insert(session.id.clone(), session);
        }

        /// Make subscription listing fail.
        pub fn fail_listing(&self, fail: bool) {
            self.inner.fail_listing.store(fail, Ordering::SeqCst);
        }

        /// Make session resolution fail.
        pub fn fail_resolution(&self, fail: bool) {
            self.inner.fail_resolution.store(fail, Ordering::SeqCst);
        }

        /// Number of list calls made.
        #[must_use]
        pub fn list_calls(&self) -> u64 {
            self.inner.list_calls.load(Ordering::SeqCst)
        }

        /// Number of sessions created.
        #[must_use]
        pub fn create_calls(&self) -> u64 {
            self.inner.create_calls.load(Ordering::SeqCst)
        }

        /// Number of resolve calls made.
        #[must_use]
        pub fn resolve_calls(&self) -> u64 {
            self.inner.resolve_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SubscriptionLister for MockProviderClient {
        async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<SubscriptionRecord>> {
            self.inner.list_calls.fetch_add(1, Ordering::SeqCst);

            if self.inner.fail_listing.load(Ordering::SeqCst) {
                return Err(GateError::provider(
                    "list_subscriptions",
                    "simulated provider failure",
                ));
            }

            Ok(self
                .inner
                .subscriptions
                .read()
                .unwrap()
                .get(customer_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    #[async_trait]
    impl CheckoutClient for MockProviderClient {
        async fn create_checkout_session(
            &self,
            request: CreateCheckoutRequest,
        ) -> Result<CheckoutSessionData> {
            self.inner.create_calls.fetch_add(1, Ordering::SeqCst);

            let n = self.inner.session_counter.fetch_add(1, Ordering::SeqCst);
            let id = format!("cs_test_{n}");

            let customer_id = match &request.customer {
                CheckoutCustomer::Existing(id) => Some(id.clone()),
                CheckoutCustomer::Email(_) => None,
            };
            self.inner.sessions.write().unwrap().insert(
                id.clone(),
                ResolvedSession {
                    id: id.clone(),
                    customer_id,
                    site_key: Some(request.site_key.clone()),
                },
            );

            Ok(CheckoutSessionData {
                url: format!("https://checkout.stripe.com/c/pay/{id}"),
                id,
            })
        }
    }

    #[async_trait]
    impl SessionResolver for MockProviderClient {
        async fn resolve_session(&self, session_id: &str) -> Result<ResolvedSession> {
            self.inner.resolve_calls.fetch_add(1, Ordering::SeqCst);

            if self.inner.fail_resolution.load(Ordering::SeqCst) {
                return Err(GateError::provider(
                    "resolve_session",
                    "simulated provider failure",
                ));
            }

            self.inner
                .sessions
                .read()
                .unwrap()
                .get(session_id)
                .cloned()
                .ok_or_else(|| GateError::not_found(format!("session {session_id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::MockProviderClient;
    use super::*;
    use crate::subscription::SubscriptionStatus;

    #[tokio::test]
    async fn test_mock_list_and_counters() {
        let client = MockProviderClient::new();
        client.seed_subscription(SubscriptionRecord {
            id: "sub_1".to_string(),
            status: SubscriptionStatus::Active,
            cancel_at_period_end: false,
            customer_id: "cus_1".to_string(),
        });

        let records = client.list_subscriptions("cus_1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(client.list_subscriptions("cus_other").await.unwrap().is_empty());
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_checkout_session_is_resolvable() {
        let client = MockProviderClient::new();

        let session = client
            .create_checkout_session(CreateCheckoutRequest {
                customer: CheckoutCustomer::Existing("cus_1".to_string()),
                price_id: "price_default".to_string(),
                site_key: "shopA".to_string(),
                success_url: "https://app.example.com/?session_id={CHECKOUT_SESSION_ID}"
                    .to_string(),
                cancel_url: "https://app.example.com".to_string(),
            })
            .await
            .unwrap();

        assert!(session.id.starts_with("cs_test_"));
        assert!(session.url.contains(&session.id));

        let resolved = client.resolve_session(&session.id).await.unwrap();
        assert_eq!(resolved.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(resolved.site_key.as_deref(), Some("shopA"));
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let client = MockProviderClient::new();

        client.fail_listing(true);
        assert!(client.list_subscriptions("cus_1").await.is_err());

        client.fail_resolution(true);
        assert!(client.resolve_session("cs_test_0").await.is_err());
    }
}
