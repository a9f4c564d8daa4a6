//! Entitlement status derivation.
//!
//! The status is always recomputed on demand from the profile and the
//! provider's live records; it is never cached as a source of truth. The
//! derivation is a deterministic, total function of its inputs, and every
//! failure on the way collapses to `none` (fail-closed).

use serde::{Deserialize, Serialize};

use crate::profile::{SiteBillingProfile, SiteProfileStore};
use crate::provider::SubscriptionLister;
use crate::subscription::{RecordClassification, SubscriptionRecord, classify_records};

/// The derived access decision for a site's paid features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// The site is in operator-managed setup mode; access is open while the
    /// storefront is being prepared.
    SetupMode,
    /// No entitlement could be established.
    None,
    /// A currently-renewing subscription exists.
    Active,
    /// The only live subscription is scheduled to lapse at period end;
    /// access stays open so the UI can show a pending-cancellation notice.
    PendingCancel,
    /// The subscription history ends in cancellation.
    Canceled,
}

impl EntitlementStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetupMode => "setup_mode",
            Self::None => "none",
            Self::Active => "active",
            Self::PendingCancel => "pending_cancel",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reduce a record classification to a status.
///
/// A renewing subscription dominates stale canceled ones; a subscription
/// already scheduled to lapse is distinguished from a fully active one.
#[must_use]
pub fn status_of_classification(class: RecordClassification) -> EntitlementStatus {
    if class.has_active {
        EntitlementStatus::Active
    } else if class.has_pending {
        EntitlementStatus::PendingCancel
    } else if class.has_canceled {
        EntitlementStatus::Canceled
    } else {
        EntitlementStatus::None
    }
}

/// Classify a record set directly to a status.
#[must_use]
pub fn status_of_records(records: &[SubscriptionRecord]) -> EntitlementStatus {
    status_of_classification(classify_records(records))
}

/// Derive the entitlement status for a profile and its record set.
///
/// First-match priority, independent of record ordering or recency:
/// 1. setup mode
/// 2. free plan, or no linked customer
/// 3. record classification
#[must_use]
pub fn derive_status(
    profile: &SiteBillingProfile,
    records: &[SubscriptionRecord],
) -> EntitlementStatus {
    if profile.setup_mode {
        return EntitlementStatus::SetupMode;
    }
    if profile.is_free_plan || !profile.has_customer() {
        return EntitlementStatus::None;
    }
    status_of_records(records)
}

/// Point-in-time status reconciliation over the profile store and the
/// provider's live subscription listing.
#[derive(Debug, Clone)]
pub struct StatusDeriver<S, C> {
    store: S,
    client: C,
}

impl<S, C> StatusDeriver<S, C>
where
    S: SiteProfileStore,
    C: SubscriptionLister,
{
    #[must_use]
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// Derive the status for a site.
    ///
    /// Total: profile or provider failures never escape; they are logged
    /// here and collapse to `none`. No inline retry; the caller decides
    /// whether to ask again.
    pub async fn status_for_site(&self, site_key: &str) -> EntitlementStatus {
        let profile = match self.store.fetch_profile(site_key).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::debug!(
                    target: "ordergate::status",
                    site_key = %site_key,
                    "no billing profile, resolving to none"
                );
                return EntitlementStatus::None;
            }
            Err(e) => {
                tracing::warn!(
                    target: "ordergate::status",
                    site_key = %site_key,
                    error = %e,
                    "profile fetch failed, resolving to none"
                );
                return EntitlementStatus::None;
            }
        };

        self.status_for_profile(&profile).await
    }

    /// Derive the status for an already-fetched profile.
    pub async fn status_for_profile(&self, profile: &SiteBillingProfile) -> EntitlementStatus {
        // Setup, free-plan, and unlinked profiles resolve without touching
        // the provider.
        if profile.setup_mode || profile.is_free_plan || !profile.has_customer() {
            return derive_status(profile, &[]);
        }

        let customer_id = match profile.stripe_customer_id.as_deref() {
            Some(id) => id,
            None => return EntitlementStatus::None,
        };

        match self.client.list_subscriptions(customer_id).await {
            Ok(records) => derive_status(profile, &records),
            Err(e) => {
                tracing::warn!(
                    target: "ordergate::status",
                    site_key = %profile.site_key,
                    customer_id = %customer_id,
                    error = %e,
                    "subscription listing failed, resolving to none"
                );
                EntitlementStatus::None
            }
        }
    }
}
