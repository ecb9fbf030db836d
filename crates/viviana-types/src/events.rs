use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Payment;

/// Audit events appended to the security log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: &str, details: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            details,
            timestamp: Utc::now(),
        }
    }

    /// True if any string field of `details` mentions the given user id or email.
    pub fn mentions(&self, needle: &str) -> bool {
        match &self.details {
            serde_json::Value::Object(map) => map.values().any(|v| v.as_str() == Some(needle)),
            _ => false,
        }
    }
}

/// Payment lifecycle notifications recorded in the webhook log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    pub created_at: DateTime<Utc>,
    pub payment: Payment,
}

impl WebhookEvent {
    pub fn new(event_type: WebhookEventType, payment: Payment) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            created_at: Utc::now(),
            payment,
        }
    }
}
