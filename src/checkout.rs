//! Checkout session issuance.
//!
//! The issuer performs a fresh list-then-conditionally-create sequence on
//! every invocation: nothing about the subscription state is cached, which
//! keeps the window for duplicate paid subscriptions as small as a
//! human-paced action allows. A site that already has a renewing
//! subscription gets its existing subscription id back instead of a new
//! session.

use std::sync::Arc;

use crate::audit::{AuditLogger, GateAuditEvent};
use crate::config::GateConfig;
use crate::error::{GateError, Result};
use crate::profile::SiteProfileStore;
use crate::provider::{
    CheckoutClient, CheckoutCustomer, CreateCheckoutRequest, SubscriptionLister,
};
use crate::validation::validate_site_key;

/// Outcome of a checkout issuance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The site already has a renewing subscription; no session was created.
    AlreadyActive { subscription_id: String },
    /// A new checkout session was created; redirect the client to `url`.
    SessionCreated { session_id: String, url: String },
}

/// Creates provider checkout sessions for sites, idempotent against an
/// already-active subscription.
#[derive(Clone)]
pub struct CheckoutIssuer<S, C> {
    store: S,
    client: C,
    config: Arc<GateConfig>,
    audit: Arc<dyn AuditLogger>,
}

impl<S, C> CheckoutIssuer<S, C>
where
    S: SiteProfileStore,
    C: SubscriptionLister + CheckoutClient,
{
    #[must_use]
    pub fn new(store: S, client: C, config: Arc<GateConfig>, audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            store,
            client,
            config,
            audit,
        }
    }

    /// Issue a checkout session for a site.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: malformed site key, or the site is on the free
    ///   plan and has nothing to buy
    /// - `NotFound`: no billing profile for the site
    /// - `ServerMisconfigured`: no checkout price configured process-wide
    /// - `IdentityMissing`: the profile has neither a provider customer nor
    ///   an owner email (no provider call is made)
    /// - `Provider` / `Network`: upstream failure; the caller may retry
    pub async fn issue(&self, site_key: &str) -> Result<CheckoutOutcome> {
        validate_site_key(site_key)?;

        let profile = self
            .store
            .fetch_profile(site_key)
            .await?
            .ok_or_else(|| GateError::not_found(format!("siteKey '{site_key}' not found")))?;

        let price_id = self
            .config
            .checkout_price_id
            .clone()
            .ok_or_else(|| GateError::server_misconfigured("no checkout price id configured"))?;

        if profile.is_free_plan {
            return Err(GateError::invalid_request(format!(
                "siteKey '{site_key}' is on the free plan"
            )));
        }

        // Bind to the linked customer when there is one, otherwise let the
        // provider create the customer record from the owner email. Neither
        // means there is no identity to bill, so stop before any provider
        // call.
        let customer = match (&profile.stripe_customer_id, &profile.owner_email) {
            (Some(customer_id), _) => CheckoutCustomer::Existing(customer_id.clone()),
            (None, Some(email)) => CheckoutCustomer::Email(email.clone()),
            (None, None) => {
                return Err(GateError::identity_missing(format!(
                    "siteKey '{site_key}' has neither a customer id nor an owner email"
                )));
            }
        };

        // Re-fetch the record set fresh; an already-renewing subscription
        // makes this a no-op.
        if let CheckoutCustomer::Existing(ref customer_id) = customer {
            let records = self.client.list_subscriptions(customer_id).await?;
            if let Some(active) = records.iter().find(|r| r.is_renewing()) {
                tracing::info!(
                    target: "ordergate::checkout",
                    site_key = %site_key,
                    subscription_id = %active.id,
                    "checkout requested for already-active site"
                );
                self.audit
                    .log(GateAuditEvent::CheckoutSkippedAlreadyActive {
                        site_key: site_key.to_string(),
                        subscription_id: active.id.clone(),
                    })
                    .await;
                return Ok(CheckoutOutcome::AlreadyActive {
                    subscription_id: active.id.clone(),
                });
            }
        }

        let session = self
            .client
            .create_checkout_session(CreateCheckoutRequest {
                customer,
                price_id,
                site_key: site_key.to_string(),
                success_url: self.config.checkout_success_url(),
                cancel_url: self.config.checkout_cancel_url(),
            })
            .await?;

        tracing::info!(
            target: "ordergate::checkout",
            site_key = %site_key,
            session_id = %session.id,
            "checkout session created"
        );
        self.audit
            .log(GateAuditEvent::CheckoutSessionCreated {
                site_key: site_key.to_string(),
                session_id: session.id.clone(),
            })
            .await;

        Ok(CheckoutOutcome::SessionCreated {
            session_id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoOpAuditLogger;
    use crate::audit::test::TestAuditLogger;
    use crate::config::GateConfigBuilder;
    use crate::profile::SiteBillingProfile;
    use crate::profile::test::{InMemoryProfileStore, profile};
    use crate::provider::test::MockProviderClient;
    use crate::subscription::{SubscriptionRecord, SubscriptionStatus};

    fn config_with_price() -> Arc<GateConfig> {
        Arc::new(
            GateConfigBuilder::new()
                .with_base_url("https://shop.example.com")
                .with_checkout_price_id("price_default")
                .build()
                .unwrap(),
        )
    }

    fn record(status: SubscriptionStatus, cancel_at_period_end: bool) -> SubscriptionRecord {
        SubscriptionRecord {
            id: "sub_active".to_string(),
            status,
            cancel_at_period_end,
            customer_id: "cus_1".to_string(),
        }
    }

    fn issuer(
        store: &InMemoryProfileStore,
        client: &MockProviderClient,
        config: Arc<GateConfig>,
    ) -> CheckoutIssuer<InMemoryProfileStore, MockProviderClient> {
        CheckoutIssuer::new(
            store.clone(),
            client.clone(),
            config,
            Arc::new(NoOpAuditLogger),
        )
    }

    #[tokio::test]
    async fn test_creates_session_for_linked_customer() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", false, false, Some("cus_1")));
        let client = MockProviderClient::new();

        let outcome = issuer(&store, &client, config_with_price())
            .issue("shopA")
            .await
            .unwrap();

        match outcome {
            CheckoutOutcome::SessionCreated { session_id, url } => {
                assert!(session_id.starts_with("cs_test_"));
                assert!(url.contains("checkout.stripe.com"));
            }
            other => panic!("expected SessionCreated, got {other:?}"),
        }
        assert_eq!(client.create_calls(), 1);
        assert_eq!(client.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_already_active_creates_no_session() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", false, false, Some("cus_1")));

        let client = MockProviderClient::new();
        client.seed_subscription(record(SubscriptionStatus::Active, false));

        let outcome = issuer(&store, &client, config_with_price())
            .issue("shopA")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CheckoutOutcome::AlreadyActive {
                subscription_id: "sub_active".to_string()
            }
        );
        assert_eq!(client.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_second_call_after_activation_is_idempotent() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", false, false, Some("cus_1")));
        let client = MockProviderClient::new();
        let issuer = issuer(&store, &client, config_with_price());

        // First call: no subscription yet, a session is created.
        let first = issuer.issue("shopA").await.unwrap();
        assert!(matches!(first, CheckoutOutcome::SessionCreated { .. }));

        // The site becomes active between calls.
        client.seed_subscription(record(SubscriptionStatus::Active, false));

        // Second call returns the existing subscription, creates nothing.
        let second = issuer.issue("shopA").await.unwrap();
        assert_eq!(
            second,
            CheckoutOutcome::AlreadyActive {
                subscription_id: "sub_active".to_string()
            }
        );
        assert_eq!(client.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_lapsing_subscription_still_gets_a_session() {
        // A subscription scheduled to lapse is not renewing; the owner may
        // buy again.
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", false, false, Some("cus_1")));

        let client = MockProviderClient::new();
        client.seed_subscription(record(SubscriptionStatus::Active, true));

        let outcome = issuer(&store, &client, config_with_price())
            .issue("shopA")
            .await
            .unwrap();
        assert!(matches!(outcome, CheckoutOutcome::SessionCreated { .. }));
    }

    #[tokio::test]
    async fn test_invalid_site_key() {
        let store = InMemoryProfileStore::new();
        let client = MockProviderClient::new();

        let result = issuer(&store, &client, config_with_price()).issue("").await;
        assert!(matches!(result, Err(GateError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_site_key() {
        let store = InMemoryProfileStore::new();
        let client = MockProviderClient::new();

        let result = issuer(&store, &client, config_with_price())
            .issue("ghost")
            .await;
        assert!(matches!(result, Err(GateError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_price_is_misconfiguration() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", false, false, Some("cus_1")));
        let client = MockProviderClient::new();

        let config = Arc::new(
            GateConfigBuilder::new()
                .with_base_url("https://shop.example.com")
                .build()
                .unwrap(),
        );

        let result = issuer(&store, &client, config).issue("shopA").await;
        assert!(matches!(result, Err(GateError::ServerMisconfigured(_))));
    }

    #[tokio::test]
    async fn test_free_plan_site_is_rejected() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", true, false, Some("cus_1")));
        let client = MockProviderClient::new();

        let result = issuer(&store, &client, config_with_price())
            .issue("shopA")
            .await;
        assert!(matches!(result, Err(GateError::InvalidRequest(_))));
        assert_eq!(client.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_identity_missing_makes_no_provider_calls() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", false, false, None));
        let client = MockProviderClient::new();

        let result = issuer(&store, &client, config_with_price())
            .issue("shopA")
            .await;

        assert!(matches!(result, Err(GateError::IdentityMissing(_))));
        assert_eq!(client.list_calls(), 0);
        assert_eq!(client.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_owner_email_fallback_skips_listing() {
        let store = InMemoryProfileStore::new();
        store.insert(SiteBillingProfile {
            site_key: "shopA".to_string(),
            is_free_plan: false,
            setup_mode: false,
            stripe_customer_id: None,
            owner_email: Some("owner@example.com".to_string()),
        });
        let client = MockProviderClient::new();

        let outcome = issuer(&store, &client, config_with_price())
            .issue("shopA")
            .await
            .unwrap();

        assert!(matches!(outcome, CheckoutOutcome::SessionCreated { .. }));
        // No customer to list against.
        assert_eq!(client.list_calls(), 0);
        assert_eq!(client.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_audit_events_are_emitted() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("shopA", false, false, Some("cus_1")));
        let client = MockProviderClient::new();
        let audit = TestAuditLogger::new();

        let issuer = CheckoutIssuer::new(
            store.clone(),
            client.clone(),
            config_with_price(),
            Arc::new(audit.clone()),
        );

        issuer.issue("shopA").await.unwrap();
        client.seed_subscription(record(SubscriptionStatus::Active, false));
        issuer.issue("shopA").await.unwrap();

        let events = audit.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            GateAuditEvent::CheckoutSessionCreated { .. }
        ));
        assert!(matches!(
            events[1],
            GateAuditEvent::CheckoutSkippedAlreadyActive { .. }
        ));
    }
}
