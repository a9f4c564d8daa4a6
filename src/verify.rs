//! Checkout-redirect session verification.
//!
//! After a hosted checkout completes, the provider redirects back with a
//! one-time session id. Verification resolves that id to a current
//! entitlement status using the same classification rule as the status
//! deriver. Every step is a pure read, so verifying the same id twice has
//! no side effects.

use std::sync::Arc;

use crate::audit::{AuditLogger, GateAuditEvent};
use crate::profile::SiteProfileStore;
use crate::provider::{SessionResolver, SubscriptionLister};
use crate::status::{EntitlementStatus, StatusDeriver, status_of_records};

/// Resolves checkout-redirect session ids to entitlement statuses.
#[derive(Clone)]
pub struct SessionVerifier<S, C> {
    deriver: StatusDeriver<S, C>,
    client: C,
    audit: Arc<dyn AuditLogger>,
}

impl<S, C> SessionVerifier<S, C>
where
    S: SiteProfileStore,
    C: SubscriptionLister + SessionResolver + Clone,
{
    #[must_use]
    pub fn new(store: S, client: C, audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            deriver: StatusDeriver::new(store, client.clone()),
            client,
            audit,
        }
    }

    /// Verify a checkout-redirect session id.
    ///
    /// Total and fail-closed: resolution or listing failures collapse to
    /// `none`. When the session carries the issuing site's key in its
    /// metadata, the full derivation runs (so setup-mode and free-plan
    /// short-circuits apply); otherwise the resolved customer's records are
    /// classified directly.
    pub async fn verify(&self, session_id: &str) -> EntitlementStatus {
        let resolved = match self.client.resolve_session(session_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(
                    target: "ordergate::verify",
                    session_id = %session_id,
                    error = %e,
                    "session resolution failed, resolving to none"
                );
                return EntitlementStatus::None;
            }
        };

        let status = match (&resolved.site_key, &resolved.customer_id) {
            (Some(site_key), _) => self.deriver.status_for_site(site_key).await,
            (None, Some(customer_id)) => {
                match self.client.list_subscriptions(customer_id).await {
                    Ok(records) => status_of_records(&records),
                    Err(e) => {
                        tracing::warn!(
                            target: "ordergate::verify",
                            session_id = %session_id,
                            customer_id = %customer_id,
                            error = %e,
                            "subscription listing failed, resolving to none"
                        );
                        EntitlementStatus::None
                    }
                }
            }
            (None, None) => {
                tracing::warn!(
                    target: "ordergate::verify",
                    session_id = %session_id,
                    "resolved session has no customer, resolving to none"
                );
                EntitlementStatus::None
            }
        };

        self.audit
            .log(GateAuditEvent::SessionVerified {
                session_id: session_id.to_string(),
                status: status.to_string(),
            })
            .await;

        status
    }
}
