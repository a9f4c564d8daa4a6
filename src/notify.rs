//! Order-completion push notification contract.
//!
//! The surrounding app flips an order's completion flag; this module owns
//! the event contract consumed by the push pipeline: transition detection,
//! message construction, and the deep link back into the customer app.
//! Delivery is at-least-once: duplicate trigger firings may produce
//! duplicate notifications, and nothing here deduplicates them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::audit::{AuditLogger, GateAuditEvent};
use crate::error::{GateError, Result};

/// The order fields the notifier consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Site the order belongs to.
    pub site_key: String,
    /// Customer-facing order number.
    pub order_no: u64,
    /// Completion flag; the trigger fires on its false→true transition.
    pub is_complete: bool,
    /// Push token registered by the ordering customer, if any.
    pub push_token: Option<String>,
}

/// Whether an order update is a completion transition (false→true).
#[must_use]
pub fn completion_transition(before: &OrderSnapshot, after: &OrderSnapshot) -> bool {
    !before.is_complete && after.is_complete
}

/// A push message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub token: String,
    pub title: String,
    pub body: String,
    /// Deep link opening the customer app on the right site and order.
    pub link: Url,
}

/// Delivery seam; implement for your push backend.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver one notification.
    async fn send(&self, notification: PushNotification) -> Result<()>;
}

/// Sends order-completion notifications.
#[derive(Clone)]
pub struct OrderCompletionNotifier<P> {
    sender: P,
    client_base_url: Url,
    audit: std::sync::Arc<dyn AuditLogger>,
}

impl<P: PushSender> OrderCompletionNotifier<P> {
    /// # Errors
    ///
    /// Returns `ServerMisconfigured` if the client base URL does not parse.
    pub fn new(
        sender: P,
        client_base_url: &str,
        audit: std::sync::Arc<dyn AuditLogger>,
    ) -> Result<Self> {
        let client_base_url = Url::parse(client_base_url).map_err(|e| {
            GateError::server_misconfigured(format!(
                "invalid client base URL '{client_base_url}': {e}"
            ))
        })?;

        Ok(Self {
            sender,
            client_base_url,
            audit,
        })
    }

    /// Handle an order update. Sends a notification iff the update is a
    /// completion transition and the order carries a push token. Returns
    /// whether a notification was sent.
    ///
    /// # Errors
    ///
    /// Propagates delivery failures; the trigger source may redeliver
    /// (at-least-once).
    pub async fn order_updated(
        &self,
        before: &OrderSnapshot,
        after: &OrderSnapshot,
    ) -> Result<bool> {
        if !completion_transition(before, after) {
            return Ok(false);
        }

        let token = match &after.push_token {
            Some(token) => token.clone(),
            None => {
                tracing::debug!(
                    target: "ordergate::notify",
                    site_key = %after.site_key,
                    order_no = after.order_no,
                    "completed order has no push token, skipping"
                );
                return Ok(false);
            }
        };

        let notification = PushNotification {
            token,
            title: "Your order is ready!".to_string(),
            body: format!("Please pick up order #{}", after.order_no),
            link: self.completion_link(after),
        };

        self.sender.send(notification).await?;

        tracing::info!(
            target: "ordergate::notify",
            site_key = %after.site_key,
            order_no = after.order_no,
            "order completion notification sent"
        );
        self.audit
            .log(GateAuditEvent::OrderNotificationSent {
                site_key: after.site_key.clone(),
                order_no: after.order_no,
            })
            .await;

        Ok(true)
    }

    /// Deep link: `{client_base_url}/?siteKey=<key>&done=<orderNo>`.
    fn completion_link(&self, order: &OrderSnapshot) -> Url {
        let mut link = self.client_base_url.clone();
        link.query_pairs_mut()
            .append_pair("siteKey", &order.site_key)
            .append_pair("done", &order.order_no.to_string());
        link
    }
}

/// Capturing push sender for tests.
#[cfg(any(test, feature = "test-billing"))]
pub mod test {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Push sender that records what it was asked to deliver.
    #[derive(Default, Clone)]
    pub struct CapturingPushSender {
        sent: Arc<Mutex<Vec<PushNotification>>>,
    }

    impl CapturingPushSender {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn sent(&self) -> Vec<PushNotification> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl PushSender for CapturingPushSender {
        async fn send(&self, notification: PushNotification) -> Result<()> {
            self.sent.lock().await.push(notification);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::CapturingPushSender;
    use super::*;
    use crate::audit::NoOpAuditLogger;
    use std::sync::Arc;

    fn order(is_complete: bool, push_token: Option<&str>) -> OrderSnapshot {
        OrderSnapshot {
            site_key: "shopA".to_string(),
            order_no: 42,
            is_complete,
            push_token: push_token.map(str::to_string),
        }
    }

    fn notifier(sender: &CapturingPushSender) -> OrderCompletionNotifier<CapturingPushSender> {
        OrderCompletionNotifier::new(
            sender.clone(),
            "https://orders.example.com",
            Arc::new(NoOpAuditLogger),
        )
        .unwrap()
    }

    #[test]
    fn test_completion_transition() {
        assert!(completion_transition(&order(false, None), &order(true, None)));
        assert!(!completion_transition(&order(true, None), &order(true, None)));
        assert!(!completion_transition(&order(false, None), &order(false, None)));
        // Un-completing an order is not a transition.
        assert!(!completion_transition(&order(true, None), &order(false, None)));
    }

    #[tokio::test]
    async fn test_notification_sent_on_completion() {
        let sender = CapturingPushSender::new();
        let notifier = notifier(&sender);

        let sent = notifier
            .order_updated(&order(false, Some("tok_1")), &order(true, Some("tok_1")))
            .await
            .unwrap();
        assert!(sent);

        let notifications = sender.sent().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].token, "tok_1");
        assert!(notifications[0].body.contains("42"));
        assert_eq!(
            notifications[0].link.as_str(),
            "https://orders.example.com/?siteKey=shopA&done=42"
        );
    }

    #[tokio::test]
    async fn test_no_notification_without_transition() {
        let sender = CapturingPushSender::new();
        let notifier = notifier(&sender);

        let sent = notifier
            .order_updated(&order(true, Some("tok_1")), &order(true, Some("tok_1")))
            .await
            .unwrap();
        assert!(!sent);
        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_notification_without_token() {
        let sender = CapturingPushSender::new();
        let notifier = notifier(&sender);

        let sent = notifier
            .order_updated(&order(false, None), &order(true, None))
            .await
            .unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_duplicate_firings_send_duplicates() {
        // At-least-once delivery: the notifier does not deduplicate.
        let sender = CapturingPushSender::new();
        let notifier = notifier(&sender);

        let before = order(false, Some("tok_1"));
        let after = order(true, Some("tok_1"));
        notifier.order_updated(&before, &after).await.unwrap();
        notifier.order_updated(&before, &after).await.unwrap();

        assert_eq!(sender.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn test_deep_link_is_percent_encoded() {
        let sender = CapturingPushSender::new();
        let notifier = notifier(&sender);

        let mut before = order(false, Some("tok_1"));
        let mut after = order(true, Some("tok_1"));
        before.site_key = "shop/あ".to_string();
        after.site_key = "shop/あ".to_string();

        notifier.order_updated(&before, &after).await.unwrap();
        let link = sender.sent().await[0].link.clone();
        assert!(link.as_str().contains("siteKey=shop%2F"));
    }

    #[test]
    fn test_invalid_client_base_url_rejected() {
        let result = OrderCompletionNotifier::new(
            CapturingPushSender::new(),
            "not a url",
            Arc::new(NoOpAuditLogger),
        );
        assert!(matches!(result, Err(GateError::ServerMisconfigured(_))));
    }
}
