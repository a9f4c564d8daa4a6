//! Ordergate - billing entitlement reconciliation for an order-taking
//! storefront.
//!
//! Decides, at any moment, whether a site is allowed to use the paid
//! product by reconciling three independently-mutable sources of truth
//! (the cached site billing profile, the payment provider's live
//! subscription records, and a one-time checkout-redirect confirmation)
//! into a single, deterministic, fail-closed decision.
//!
//! # Components
//!
//! - [`StatusDeriver`]: (profile, live records) → [`EntitlementStatus`]
//! - [`CheckoutIssuer`]: provider checkout sessions, idempotent against an
//!   already-active subscription
//! - [`SessionVerifier`]: checkout-redirect session id → status
//! - [`AccessGate`]: plan flags + status → show/hide the blocking overlay
//!
//! Statuses are always recomputed on demand; nothing here caches an
//! entitlement decision or listens for provider webhooks.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ordergate::{BillingApi, GateConfigBuilder, LiveStripeClient, TracingAuditLogger};
//!
//! # use ordergate::{DecodingProfileStore, ProfileDocumentSource};
//! # async fn run(profile_source: impl ProfileDocumentSource + Clone + Send + Sync + 'static) -> ordergate::Result<()> {
//! ordergate::init_tracing();
//!
//! let config = Arc::new(GateConfigBuilder::new().from_env().build()?);
//! let client = LiveStripeClient::new(config.provider.clone())?;
//! let store = DecodingProfileStore::new(profile_source);
//!
//! let api = BillingApi::new(store, client, config, Arc::new(TracingAuditLogger));
//! let app = api.router();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gate;
pub mod live_client;
pub mod notify;
pub mod profile;
pub mod provider;
pub mod routes;
pub mod status;
pub mod subscription;
pub mod validation;
pub mod verify;

// Re-exports for public API
pub use audit::{AuditLogger, GateAuditEvent, NoOpAuditLogger, TracingAuditLogger};
pub use checkout::{CheckoutIssuer, CheckoutOutcome};
pub use config::{GateConfig, GateConfigBuilder, ProviderConfig};
pub use error::{GateError, Result};
pub use gate::{
    AccessGate, GateActivation, GateDecision, GateState, ProfileFlags, decide,
    session_id_from_url, strip_session_param,
};
pub use live_client::LiveStripeClient;
pub use notify::{
    OrderCompletionNotifier, OrderSnapshot, PushNotification, PushSender, completion_transition,
};
pub use profile::{
    DecodingProfileStore, ProfileDocumentSource, SiteBillingProfile, SiteProfileStore,
};
pub use provider::{
    CheckoutClient, CheckoutCustomer, CheckoutSessionData, CreateCheckoutRequest, ProviderClient,
    ResolvedSession, SessionResolver, SubscriptionLister,
};
pub use routes::{BillingApi, CheckoutResponse, StatusResponse};
pub use status::{EntitlementStatus, StatusDeriver, derive_status, status_of_records};
pub use subscription::{
    RecordClassification, SubscriptionRecord, SubscriptionStatus, classify_records,
};
pub use validation::{validate_session_id, validate_site_key};
pub use verify::SessionVerifier;

// Test exports
#[cfg(any(test, feature = "test-billing"))]
pub use audit::test::TestAuditLogger;

#[cfg(any(test, feature = "test-billing"))]
pub use notify::test::CapturingPushSender;

#[cfg(any(test, feature = "test-billing"))]
pub use profile::test::{InMemoryDocumentSource, InMemoryProfileStore};

#[cfg(any(test, feature = "test-billing"))]
pub use provider::test::MockProviderClient;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults.
///
/// Call early in `main()`, before building the app.
///
/// # Environment Variables
///
/// - `RUST_LOG`: log level filter (e.g. "info", "ordergate=debug")
/// - `ORDERGATE_LOG_JSON`: set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("ORDERGATE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
