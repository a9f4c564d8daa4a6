//! HTTP boundary for the billing entitlement core.
//!
//! Three handlers mirror the app's API surface. Each catches internally and
//! returns a structured status+message body; the status and verify handlers
//! additionally collapse every failure to `none` so clients can always
//! fail-closed on the decoded status alone.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::AuditLogger;
use crate::checkout::{CheckoutIssuer, CheckoutOutcome};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::profile::SiteProfileStore;
use crate::provider::ProviderClient;
use crate::status::{EntitlementStatus, StatusDeriver};
use crate::validation::{validate_session_id, validate_site_key};
use crate::verify::SessionVerifier;

/// The wired-up billing API: components plus their router.
#[derive(Clone)]
pub struct BillingApi<S, C> {
    deriver: StatusDeriver<S, C>,
    issuer: CheckoutIssuer<S, C>,
    verifier: SessionVerifier<S, C>,
}

impl<S, C> BillingApi<S, C>
where
    S: SiteProfileStore + Clone + Send + Sync + 'static,
    C: ProviderClient + Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(store: S, client: C, config: Arc<GateConfig>, audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            deriver: StatusDeriver::new(store.clone(), client.clone()),
            issuer: CheckoutIssuer::new(store.clone(), client.clone(), config, audit.clone()),
            verifier: SessionVerifier::new(store, client, audit),
        }
    }

    /// Build the router for this API.
    #[must_use]
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/billing/status", get(status::<S, C>))
            .route("/api/billing/checkout-session", post(create_checkout_session::<S, C>))
            .route("/api/billing/verify", get(verify_session::<S, C>))
            .with_state(self)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: EntitlementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    fn ok(status: EntitlementStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            status: EntitlementStatus::None,
            error: Some(error.into()),
        }
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(rename = "siteKey")]
    site_key: Option<String>,
}

/// `GET /api/billing/status?siteKey=…`
///
/// A malformed request is a 400 whose body still carries `status: none`.
async fn status<S, C>(
    State(api): State<BillingApi<S, C>>,
    Query(query): Query<StatusQuery>,
) -> Response
where
    S: SiteProfileStore + Clone + Send + Sync + 'static,
    C: ProviderClient + Clone + Send + Sync + 'static,
{
    let site_key = match query.site_key {
        Some(site_key) => site_key,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(StatusResponse::rejected("missing siteKey")),
            )
                .into_response();
        }
    };

    if let Err(e) = validate_site_key(&site_key) {
        return (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse::rejected(e.to_string())),
        )
            .into_response();
    }

    let status = api.deriver.status_for_site(&site_key).await;
    Json(StatusResponse::ok(status)).into_response()
}

#[derive(Deserialize)]
struct CheckoutBody {
    #[serde(rename = "siteKey")]
    site_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

/// `POST /api/billing/checkout-session` with body `{"siteKey": "…"}`
async fn create_checkout_session<S, C>(
    State(api): State<BillingApi<S, C>>,
    Json(body): Json<CheckoutBody>,
) -> Response
where
    S: SiteProfileStore + Clone + Send + Sync + 'static,
    C: ProviderClient + Clone + Send + Sync + 'static,
{
    let site_key = match body.site_key {
        Some(site_key) => site_key,
        None => return GateError::invalid_request("siteKey required").into_response(),
    };

    match api.issuer.issue(&site_key).await {
        Ok(CheckoutOutcome::SessionCreated { url, .. }) => Json(CheckoutResponse {
            url: Some(url),
            message: None,
            subscription_id: None,
        })
        .into_response(),
        Ok(CheckoutOutcome::AlreadyActive { subscription_id }) => Json(CheckoutResponse {
            url: None,
            message: Some("already active".to_string()),
            subscription_id: Some(subscription_id),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
struct VerifyQuery {
    session_id: Option<String>,
}

/// `GET /api/billing/verify?session_id=…`
///
/// Safe to call repeatedly for the same id; verification is a pure read.
async fn verify_session<S, C>(
    State(api): State<BillingApi<S, C>>,
    Query(query): Query<VerifyQuery>,
) -> Response
where
    S: SiteProfileStore + Clone + Send + Sync + 'static,
    C: ProviderClient + Clone + Send + Sync + 'static,
{
    let session_id = match query.session_id {
        Some(session_id) => session_id,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(StatusResponse::rejected("missing session_id")),
            )
                .into_response();
        }
    };

    if let Err(e) = validate_session_id(&session_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse::rejected(e.to_string())),
        )
            .into_response();
    }

    let status = api.verifier.verify(&session_id).await;
    Json(StatusResponse::ok(status)).into_response()
}
