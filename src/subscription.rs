//! Live subscription records and their classification.
//!
//! Records are fetched from the payment provider on demand and never
//! persisted; classification reduces a bounded page of records to the three
//! flags the entitlement rule is built on.

use serde::{Deserialize, Serialize};

/// Snapshot of one provider subscription, as consumed by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Provider subscription id.
    pub id: String,
    /// Subscription status.
    pub status: SubscriptionStatus,
    /// Whether the subscription is scheduled to lapse at period end.
    pub cancel_at_period_end: bool,
    /// Provider customer the subscription belongs to.
    pub customer_id: String,
}

impl SubscriptionRecord {
    /// A currently-renewing subscription: active or trialing, and not
    /// scheduled to lapse.
    #[must_use]
    pub fn is_renewing(&self) -> bool {
        self.status.is_live() && !self.cancel_at_period_end
    }

    /// Active or trialing but scheduled to lapse at period end.
    #[must_use]
    pub fn is_lapsing(&self) -> bool {
        self.status.is_live() && self.cancel_at_period_end
    }
}

/// Subscription status vocabulary.
///
/// Statuses outside the set this crate reasons about collapse into `Other`,
/// which never contributes to a classification flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Active and paid.
    Active,
    /// In trial period.
    Trialing,
    /// Canceled.
    Canceled,
    /// Awaiting initial payment.
    Incomplete,
    /// Any other provider status (past due, unpaid, paused, expired).
    Other,
}

impl SubscriptionStatus {
    /// Parse from a provider status string.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "canceled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            _ => Self::Other,
        }
    }

    /// Convert to the provider's string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::Other => "other",
        }
    }

    /// Active or trialing.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The three flags the entitlement rule reduces a record set to.
///
/// Order-independent: each flag is an existence check over the whole set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordClassification {
    /// Any record active/trialing and not scheduled to lapse.
    pub has_active: bool,
    /// Any record active/trialing but scheduled to lapse at period end.
    pub has_pending: bool,
    /// Any canceled record.
    pub has_canceled: bool,
}

/// Classify a record set.
#[must_use]
pub fn classify_records(records: &[SubscriptionRecord]) -> RecordClassification {
    RecordClassification {
        has_active: records.iter().any(SubscriptionRecord::is_renewing),
        has_pending: records.iter().any(SubscriptionRecord::is_lapsing),
        has_canceled: records
            .iter()
            .any(|r| r.status == SubscriptionStatus::Canceled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: SubscriptionStatus, cancel_at_period_end: bool) -> SubscriptionRecord {
        SubscriptionRecord {
            id: "sub_1".to_string(),
            status,
            cancel_at_period_end,
            customer_id: "cus_1".to_string(),
        }
    }

    #[test]
    fn test_status_from_provider() {
        assert_eq!(
            SubscriptionStatus::from_provider("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("trialing"),
            SubscriptionStatus::Trialing
        );
        assert_eq!(
            SubscriptionStatus::from_provider("canceled"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete"),
            SubscriptionStatus::Incomplete
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            SubscriptionStatus::Other
        );
        assert_eq!(
            SubscriptionStatus::from_provider("paused"),
            SubscriptionStatus::Other
        );
    }

    #[test]
    fn test_renewing_and_lapsing() {
        assert!(record(SubscriptionStatus::Active, false).is_renewing());
        assert!(record(SubscriptionStatus::Trialing, false).is_renewing());
        assert!(!record(SubscriptionStatus::Active, true).is_renewing());
        assert!(!record(SubscriptionStatus::Canceled, false).is_renewing());

        assert!(record(SubscriptionStatus::Active, true).is_lapsing());
        assert!(record(SubscriptionStatus::Trialing, true).is_lapsing());
        assert!(!record(SubscriptionStatus::Canceled, true).is_lapsing());
    }

    #[test]
    fn test_classification_is_order_independent() {
        let mut records = vec![
            record(SubscriptionStatus::Canceled, false),
            record(SubscriptionStatus::Active, false),
            record(SubscriptionStatus::Active, true),
        ];

        let forward = classify_records(&records);
        records.reverse();
        let reversed = classify_records(&records);

        assert_eq!(forward, reversed);
        assert!(forward.has_active);
        assert!(forward.has_pending);
        assert!(forward.has_canceled);
    }

    #[test]
    fn test_classification_of_inert_statuses() {
        let records = vec![
            record(SubscriptionStatus::Incomplete, false),
            record(SubscriptionStatus::Other, false),
        ];

        let class = classify_records(&records);
        assert!(!class.has_active);
        assert!(!class.has_pending);
        assert!(!class.has_canceled);
    }

    #[test]
    fn test_empty_set_classifies_to_nothing() {
        assert_eq!(classify_records(&[]), RecordClassification::default());
    }
}
