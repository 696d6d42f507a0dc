//! Payment record events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    PaymentIntentOpened(PaymentIntentOpenedData),
    PaymentVerified(PaymentVerifiedData),
    /// A callback whose signature did not match. Kept for audit.
    PaymentRejected(PaymentRejectedData),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentIntentOpened(_) => "PaymentIntentOpened",
            PaymentEvent::PaymentVerified(_) => "PaymentVerified",
            PaymentEvent::PaymentRejected(_) => "PaymentRejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentOpenedData {
    pub id: AggregateId,
    pub gateway_order_id: String,
    pub order_id: AggregateId,
    pub amount: Money,
    pub currency: String,
    pub receipt: String,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerifiedData {
    pub gateway_payment_id: String,
    pub signature: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRejectedData {
    pub gateway_payment_id: String,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}
