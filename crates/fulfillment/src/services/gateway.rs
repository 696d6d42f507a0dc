//! Payment gateway trait, in-memory sandbox and Razorpay client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::{FulfillmentError, Result};
use crate::upstream;

const SERVICE: &str = "razorpay";

/// An order opened at the gateway, which the client pays against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Money,
    pub currency: String,
    pub receipt: String,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a gateway order for `amount` in minor units.
    async fn create_order(&self, amount: Money, currency: &str, receipt: &str)
    -> Result<GatewayOrder>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder> {
        (**self).create_order(amount, currency, receipt).await
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    orders: HashMap<String, GatewayOrder>,
    next_id: u32,
    unavailable: bool,
    rejecting: bool,
}

/// In-memory payment gateway for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every call fail as if the gateway could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Makes every call fail as if the gateway refused it.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.state().rejecting = rejecting;
    }

    /// Returns the number of orders opened so far.
    pub fn order_count(&self) -> usize {
        self.state().orders.len()
    }

    pub fn order(&self, id: &str) -> Option<GatewayOrder> {
        self.state().orders.get(id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder> {
        let mut state = self.state();
        if state.unavailable {
            return Err(FulfillmentError::unavailable(SERVICE, "sandbox unavailable"));
        }
        if state.rejecting || !amount.is_positive() {
            return Err(FulfillmentError::rejected(SERVICE, "amount must be positive"));
        }

        state.next_id += 1;
        let order = GatewayOrder {
            id: format!("order_{:04}", state.next_id),
            amount,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        };
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }
}

/// Connection settings for the Razorpay orders API.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Razorpay client over its REST orders API.
#[derive(Debug, Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| upstream::transport_error(SERVICE, e))?;
        Ok(Self {
            client,
            key_id: config.key_id,
            key_secret: config.key_secret,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[tracing::instrument(skip(self), fields(amount = %amount))]
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderBody {
                amount: amount.minor(),
                currency,
                receipt,
                payment_capture: 1,
            })
            .send()
            .await
            .map_err(|e| upstream::transport_error(SERVICE, e))?;

        let order: OrderResponse = upstream::read_json(SERVICE, response).await?;
        Ok(GatewayOrder {
            id: order.id,
            amount: Money::from_minor(order.amount),
            currency: order.currency,
            receipt: order.receipt.unwrap_or_else(|| receipt.to_string()),
        })
    }
}
