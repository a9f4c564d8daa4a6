//! Client-side access gating.
//!
//! The gate decides whether a site's paid surface renders or is covered by
//! a blocking overlay. On activation it issues the profile-flags fetch and
//! the status fetch concurrently and joins them before producing a decision
//! so the overlay never flashes while data is still loading. A gate that
//! has been torn down discards in-flight results instead of writing state.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

use crate::profile::SiteProfileStore;
use crate::provider::{SessionResolver, SubscriptionLister};
use crate::status::{EntitlementStatus, StatusDeriver};
use crate::verify::SessionVerifier;

/// Query parameter carrying the checkout-redirect session id.
const SESSION_PARAM: &str = "session_id";

/// Gate lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Activation in flight; render nothing yet.
    Loading,
    /// Free-plan site; never gated.
    Free,
    /// Setup mode; open while the storefront is prepared.
    Setup,
    /// Paid and renewing.
    Active,
    /// Paid but scheduled to lapse; open, with a pending-cancellation
    /// notice.
    PendingCancel,
    /// Subscription history ends in cancellation; blocked.
    Canceled,
    /// No entitlement; blocked.
    None,
}

/// Plan flags read from the site profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileFlags {
    pub is_free_plan: bool,
    /// Whether a provider customer is linked. A profile with no linked
    /// customer is always blocked, regardless of status.
    pub has_customer: bool,
}

/// The gate's render decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub state: GateState,
    /// The blocking overlay, with its checkout call-to-action, is shown iff
    /// the site is not open.
    pub show_overlay: bool,
}

/// Combine plan flags and a derived status into a render decision.
///
/// `open = is_free_plan OR (has_customer AND status ∈ {setup_mode, active,
/// pending_cancel})`. Every failure upstream has already collapsed into
/// `none`, so this function is total.
#[must_use]
pub fn decide(flags: ProfileFlags, status: EntitlementStatus) -> GateDecision {
    let state = if flags.is_free_plan {
        GateState::Free
    } else {
        match status {
            EntitlementStatus::SetupMode => GateState::Setup,
            EntitlementStatus::Active => GateState::Active,
            EntitlementStatus::PendingCancel => GateState::PendingCancel,
            EntitlementStatus::Canceled => GateState::Canceled,
            EntitlementStatus::None => GateState::None,
        }
    };

    let open = flags.is_free_plan
        || (flags.has_customer
            && matches!(
                status,
                EntitlementStatus::SetupMode
                    | EntitlementStatus::Active
                    | EntitlementStatus::PendingCancel
            ));

    GateDecision {
        state,
        show_overlay: !open,
    }
}

/// Extract the checkout-redirect session id from a URL, if present.
#[must_use]
pub fn session_id_from_url(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == SESSION_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Return a copy of the URL with the session-id parameter removed.
///
/// The gate hands this back after one verification pass so the caller can
/// replace browser history; a refresh of the cleaned URL performs a direct
/// status lookup instead of re-triggering verification.
#[must_use]
pub fn strip_session_param(url: &Url) -> Url {
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != SESSION_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    cleaned.set_query(None);
    if !remaining.is_empty() {
        let mut pairs = cleaned.query_pairs_mut();
        for (k, v) in &remaining {
            pairs.append_pair(k, v);
        }
    }
    cleaned
}

/// Result of a completed gate activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateActivation {
    pub decision: GateDecision,
    /// Present when a session id was consumed from the URL; the caller
    /// should replace browser history with this.
    pub cleaned_url: Option<Url>,
}

/// The access gate controller.
#[derive(Clone)]
pub struct AccessGate<S, C> {
    store: S,
    deriver: StatusDeriver<S, C>,
    verifier: SessionVerifier<S, C>,
    state: Arc<RwLock<GateState>>,
    torn_down: Arc<AtomicBool>,
}

impl<S, C> AccessGate<S, C>
where
    S: SiteProfileStore + Clone,
    C: SubscriptionLister + SessionResolver + Clone,
{
    #[must_use]
    pub fn new(store: S, client: C, audit: Arc<dyn crate::audit::AuditLogger>) -> Self {
        Self {
            deriver: StatusDeriver::new(store.clone(), client.clone()),
            verifier: SessionVerifier::new(store.clone(), client, audit),
            store,
            state: Arc::new(RwLock::new(GateState::Loading)),
            torn_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current gate state. `Loading` until an activation completes.
    #[must_use]
    pub fn state(&self) -> GateState {
        *self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Mark the gate as torn down; any in-flight activation discards its
    /// result instead of writing state.
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    /// Activate the gate for a site.
    ///
    /// Issues the profile-flags fetch and the status fetch concurrently and
    /// joins them. When `current_url` carries a `session_id` parameter the
    /// status comes from session verification and the cleaned URL is
    /// returned; otherwise a direct status lookup runs. Returns `None` when
    /// the gate was torn down before completion.
    pub async fn activate(&self, site_key: &str, current_url: &Url) -> Option<GateActivation> {
        let session_id = session_id_from_url(current_url);

        let flags_fut = self.fetch_flags(site_key);
        let status_fut = self.fetch_status(site_key, session_id.as_deref());
        let (flags, status) = tokio::join!(flags_fut, status_fut);

        if self.torn_down.load(Ordering::SeqCst) {
            tracing::debug!(
                target: "ordergate::gate",
                site_key = %site_key,
                "gate torn down during activation, discarding result"
            );
            return None;
        }

        let decision = decide(flags, status);
        *self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = decision.state;

        let cleaned_url = session_id.is_some().then(|| strip_session_param(current_url));

        Some(GateActivation {
            decision,
            cleaned_url,
        })
    }

    /// Fetch plan flags. Any failure collapses to the blocked default
    /// (not free, no customer).
    async fn fetch_flags(&self, site_key: &str) -> ProfileFlags {
        match self.store.fetch_profile(site_key).await {
            Ok(Some(profile)) => ProfileFlags {
                is_free_plan: profile.is_free_plan,
                has_customer: profile.has_customer(),
            },
            Ok(None) => ProfileFlags::default(),
            Err(e) => {
                tracing::warn!(
                    target: "ordergate::gate",
                    site_key = %site_key,
                    error = %e,
                    "flags fetch failed, treating as blocked"
                );
                ProfileFlags::default()
            }
        }
    }

    async fn fetch_status(&self, site_key: &str, session_id: Option<&str>) -> EntitlementStatus {
        match session_id {
            Some(session_id) => self.verifier.verify(session_id).await,
            None => self.deriver.status_for_site(site_key).await,
        }
    }
}
