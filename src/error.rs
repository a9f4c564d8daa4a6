use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GateError>;

/// The error taxonomy for billing entitlement operations.
///
/// Every boundary handler catches internally and renders one of these as a
/// structured status+message response; nothing crosses a component boundary
/// as a panic or an untyped error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    /// The request itself is malformed (missing or invalid site key, bad
    /// session id, free-plan site asking for checkout).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The referenced site has no billing profile.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The process is missing configuration it cannot run without (e.g. no
    /// checkout price id). Operator-fatal; details go to logs, not clients.
    #[error("Server misconfigured: {0}")]
    ServerMisconfigured(String),

    /// The site's profile carries neither a provider customer id nor an
    /// owner email, so no checkout identity can be established.
    #[error("Billing identity missing: {0}")]
    IdentityMissing(String),

    /// The payment provider (or another upstream collaborator) returned an
    /// error or an unusable response.
    #[error("Provider error during '{operation}': {message}")]
    Provider {
        operation: String,
        message: String,
        code: Option<String>,
        http_status: Option<u16>,
    },

    /// The upstream call failed at the transport level (timeout, connection
    /// failure) before a provider response was obtained.
    #[error("Network error during '{operation}': {message}")]
    Network { operation: String, message: String },
}

impl GateError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn server_misconfigured(msg: impl Into<String>) -> Self {
        Self::ServerMisconfigured(msg.into())
    }

    pub fn identity_missing(msg: impl Into<String>) -> Self {
        Self::IdentityMissing(msg.into())
    }

    pub fn provider(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: message.into(),
            code: None,
            http_status: None,
        }
    }

    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the operation (e.g. by
    /// clicking the checkout call-to-action again).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Network { .. })
    }

    /// The HTTP status this error renders as.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::IdentityMissing(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServerMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider { .. } => StatusCode::BAD_GATEWAY,
            Self::Network { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Structured error body rendered at the API boundary.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Misconfiguration details are for operators only. Log the full
        // message and hand the client a generic one.
        let message = match &self {
            Self::ServerMisconfigured(detail) => {
                tracing::error!(
                    target: "ordergate::error",
                    detail = %detail,
                    "server misconfiguration"
                );
                "internal configuration error".to_string()
            }
            other => {
                if status.is_server_error() {
                    tracing::error!(target: "ordergate::error", error = %other, "request failed");
                }
                other.to_string()
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
