//! Audit logging for entitlement operations.

use async_trait::async_trait;
use std::fmt;

/// Audit events emitted by the checkout issuer, session verifier, and
/// order-completion notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAuditEvent {
    /// A new checkout session was created for a site.
    CheckoutSessionCreated { site_key: String, session_id: String },
    /// Checkout was requested but the site already has a renewing
    /// subscription; no session was created.
    CheckoutSkippedAlreadyActive {
        site_key: String,
        subscription_id: String,
    },
    /// A checkout-redirect session was verified.
    SessionVerified { session_id: String, status: String },
    /// An order-completion push notification was sent.
    OrderNotificationSent { site_key: String, order_no: u64 },
}

impl fmt::Display for GateAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckoutSessionCreated {
                site_key,
                session_id,
            } => {
                write!(f, "Checkout session created: site={site_key}, session={session_id}")
            }
            Self::CheckoutSkippedAlreadyActive {
                site_key,
                subscription_id,
            } => {
                write!(
                    f,
                    "Checkout skipped, already active: site={site_key}, sub={subscription_id}"
                )
            }
            Self::SessionVerified { session_id, status } => {
                write!(f, "Session verified: session={session_id}, status={status}")
            }
            Self::OrderNotificationSent { site_key, order_no } => {
                write!(f, "Order notification sent: site={site_key}, order={order_no}")
            }
        }
    }
}

/// Get the event kind as a string for structured logging.
fn event_kind(event: &GateAuditEvent) -> &'static str {
    match event {
        GateAuditEvent::CheckoutSessionCreated { .. } => "checkout_session_created",
        GateAuditEvent::CheckoutSkippedAlreadyActive { .. } => "checkout_skipped_already_active",
        GateAuditEvent::SessionVerified { .. } => "session_verified",
        GateAuditEvent::OrderNotificationSent { .. } => "order_notification_sent",
    }
}

/// Trait for audit logging backends.
///
/// Implementations should handle failures gracefully so audit logging never
/// disrupts the operation being audited.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Log an audit event.
    async fn log(&self, event: GateAuditEvent);
}

/// No-op audit logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

#[async_trait]
impl AuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: GateAuditEvent) {
        // No-op
    }
}

/// Tracing-based audit logger, emitting at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: GateAuditEvent) {
        tracing::info!(
            target: "ordergate::audit",
            event_type = %event_kind(&event),
            "{}", event
        );
    }
}

/// Capturing audit logger for tests.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Audit logger that captures events for assertions.
    #[derive(Default, Clone)]
    pub struct TestAuditLogger {
        events: Arc<Mutex<Vec<GateAuditEvent>>>,
    }

    impl TestAuditLogger {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn events(&self) -> Vec<GateAuditEvent> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl AuditLogger for TestAuditLogger {
        async fn log(&self, event: GateAuditEvent) {
            self.events.lock().await.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::TestAuditLogger;
    use super::*;

    #[tokio::test]
    async fn test_noop_logger() {
        NoOpAuditLogger
            .log(GateAuditEvent::SessionVerified {
                session_id: "cs_123".to_string(),
                status: "active".to_string(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_capturing_logger() {
        let logger = TestAuditLogger::new();

        logger
            .log(GateAuditEvent::CheckoutSessionCreated {
                site_key: "shopA".to_string(),
                session_id: "cs_123".to_string(),
            })
            .await;
        logger
            .log(GateAuditEvent::OrderNotificationSent {
                site_key: "shopA".to_string(),
                order_no: 42,
            })
            .await;

        let events = logger.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            GateAuditEvent::CheckoutSessionCreated { .. }
        ));
    }

    #[test]
    fn test_event_display_and_kind() {
        let event = GateAuditEvent::CheckoutSkippedAlreadyActive {
            site_key: "shopA".to_string(),
            subscription_id: "sub_9".to_string(),
        };
        let display = format!("{event}");
        assert!(display.contains("shopA"));
        assert!(display.contains("sub_9"));
        assert_eq!(event_kind(&event), "checkout_skipped_already_active");
    }
}
