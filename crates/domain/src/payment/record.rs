//! Payment record aggregate, one per gateway payment intent.

use chrono::{DateTime, Utc};
use common::{AggregateId, IdNamespace};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::Money;

use super::{
    PaymentError, PaymentEvent, PaymentIntentOpenedData, PaymentRejectedData, PaymentVerifiedData,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Verified,
    /// The last callback carried a bad signature. A later valid callback
    /// can still verify the record.
    Invalid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentRecord {
    id: Option<AggregateId>,
    version: Version,
    gateway_order_id: String,
    order_id: Option<AggregateId>,
    amount: Money,
    currency: String,
    receipt: String,
    status: PaymentStatus,
    gateway_payment_id: Option<String>,
    signature: Option<String>,
    rejected_attempts: u32,
    opened_at: Option<DateTime<Utc>>,
    verified_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// Stream id of the record for a gateway order reference.
    pub fn stream_id(gateway_order_id: &str) -> AggregateId {
        AggregateId::derived(IdNamespace::Payment, gateway_order_id)
    }
}

impl Aggregate for PaymentRecord {
    type Event = PaymentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "Payment"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PaymentEvent::PaymentIntentOpened(data) => {
                self.id = Some(data.id);
                self.gateway_order_id = data.gateway_order_id;
                self.order_id = Some(data.order_id);
                self.amount = data.amount;
                self.currency = data.currency;
                self.receipt = data.receipt;
                self.opened_at = Some(data.opened_at);
                self.status = PaymentStatus::Pending;
            }
            PaymentEvent::PaymentVerified(data) => {
                self.gateway_payment_id = Some(data.gateway_payment_id);
                self.signature = Some(data.signature);
                self.verified_at = Some(data.verified_at);
                self.status = PaymentStatus::Verified;
            }
            PaymentEvent::PaymentRejected(_) => {
                self.rejected_attempts += 1;
                if self.status != PaymentStatus::Verified {
                    self.status = PaymentStatus::Invalid;
                }
            }
        }
    }
}

// Query methods
impl PaymentRecord {
    /// Returns the gateway order ID this record is keyed by.
    pub fn gateway_order_id(&self) -> &str {
        &self.gateway_order_id
    }

    /// Returns the storefront order this payment settles.
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    /// Returns the amount the gateway order was opened for.
    pub fn amount(&self) -> Money {
        self.amount
    }

    /// Returns the currency code.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Returns the receipt reference sent to the gateway.
    pub fn receipt(&self) -> &str {
        &self.receipt
    }

    /// Returns the current payment status.
    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Returns the gateway payment ID once verified.
    pub fn gateway_payment_id(&self) -> Option<&str> {
        self.gateway_payment_id.as_deref()
    }

    /// Returns the signature that verified the payment.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Returns how many callbacks failed signature verification.
    pub fn rejected_attempts(&self) -> u32 {
        self.rejected_attempts
    }

    /// Returns when the gateway order was opened.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Returns when the payment was verified.
    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    fn ensure_for_order(&self, order_id: AggregateId) -> Result<(), PaymentError> {
        match self.order_id {
            None => Err(PaymentError::NotOpened),
            Some(id) if id != order_id => Err(PaymentError::OrderMismatch),
            Some(_) => Ok(()),
        }
    }
}

// Command methods (return events)
impl PaymentRecord {
    pub fn open(
        &self,
        gateway_order_id: &str,
        order_id: AggregateId,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        if self.exists() {
            return Err(PaymentError::AlreadyOpened(gateway_order_id.to_string()));
        }
        Ok(vec![PaymentEvent::PaymentIntentOpened(
            PaymentIntentOpenedData {
                id: PaymentRecord::stream_id(gateway_order_id),
                gateway_order_id: gateway_order_id.to_string(),
                order_id,
                amount,
                currency: currency.to_string(),
                receipt: receipt.to_string(),
                opened_at: Utc::now(),
            },
        )])
    }

    /// Records a verified payment. The caller has already checked the
    /// signature. Re-verifying the same payment is a no-op.
    pub fn verify(
        &self,
        order_id: AggregateId,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_for_order(order_id)?;
        if let Some(existing) = &self.gateway_payment_id
            && self.status == PaymentStatus::Verified
        {
            if existing == gateway_payment_id {
                return Ok(vec![]);
            }
            return Err(PaymentError::AlreadyVerified {
                gateway_payment_id: existing.clone(),
            });
        }
        Ok(vec![PaymentEvent::PaymentVerified(PaymentVerifiedData {
            gateway_payment_id: gateway_payment_id.to_string(),
            signature: signature.to_string(),
            verified_at: Utc::now(),
        })])
    }

    /// Records a callback whose signature did not match.
    pub fn reject(
        &self,
        order_id: AggregateId,
        gateway_payment_id: &str,
        reason: &str,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_for_order(order_id)?;
        Ok(vec![PaymentEvent::PaymentRejected(PaymentRejectedData {
            gateway_payment_id: gateway_payment_id.to_string(),
            reason: reason.to_string(),
            rejected_at: Utc::now(),
        })])
    }
}
