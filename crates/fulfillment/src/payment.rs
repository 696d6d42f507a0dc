//! Payment capture: gateway intents and signed callback verification.

use std::time::Duration;

use common::AggregateId;
use domain::order::{Order, OrderStatus, PaymentReference};
use domain::payment::{PaymentRecord, SignatureVerifier};
use domain::{Actor, Aggregate, CommandHandler, Money, UnitOfWork, retry_on_conflict};
use event_store::EventStore;
use serde::Serialize;

use crate::apply_committed;
use crate::error::{FulfillmentError, Result};
use crate::services::PaymentGateway;
use crate::upstream;

const SERVICE: &str = "payment_gateway";

/// What the client needs to pay an order at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub gateway_order_id: String,
    pub order_id: AggregateId,
    pub amount: Money,
    pub currency: String,
    pub receipt: String,
}

/// The signed callback the client relays after paying.
#[derive(Debug, Clone)]
pub struct VerifyPayment {
    pub order_id: AggregateId,
    pub actor: Actor,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Opens gateway payment intents and settles orders from verified
/// callbacks.
pub struct PaymentCoordinator<S, G>
where
    S: EventStore,
    G: PaymentGateway,
{
    orders: CommandHandler<S, Order>,
    payments: CommandHandler<S, PaymentRecord>,
    gateway: G,
    verifier: SignatureVerifier,
    currency: String,
    timeout: Duration,
}

impl<S, G> PaymentCoordinator<S, G>
where
    S: EventStore + Clone,
    G: PaymentGateway,
{
    pub fn new(
        store: S,
        gateway: G,
        verifier: SignatureVerifier,
        currency: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            orders: CommandHandler::new(store.clone()),
            payments: CommandHandler::new(store),
            gateway,
            verifier,
            currency: currency.into(),
            timeout,
        }
    }

    /// Opens a gateway order for a pending order's server-side total.
    ///
    /// A client-claimed amount is only compared and logged.
    #[tracing::instrument(skip(self, actor, claimed_amount), fields(order_id = %order_id))]
    pub async fn initiate_payment(
        &self,
        order_id: AggregateId,
        actor: &Actor,
        claimed_amount: Option<Money>,
    ) -> Result<PaymentIntent> {
        let order = self.require_order(order_id).await?;
        authorize(actor, &order)?;
        if order.status() != OrderStatus::Pending {
            return Err(FulfillmentError::OrderNotReady {
                status: order.status(),
            });
        }

        let amount = order.subtotal();
        if let Some(claimed) = claimed_amount
            && claimed != amount
        {
            tracing::warn!(%claimed, %amount, "client amount differs from order total, using order total");
        }

        let receipt = format!("rcpt_{}", order_id.as_uuid().simple());
        let gateway_order = upstream::call(
            SERVICE,
            "create_order",
            self.timeout,
            self.gateway.create_order(amount, &self.currency, &receipt),
        )
        .await?;

        self.payments
            .execute(PaymentRecord::stream_id(&gateway_order.id), |record| {
                record.open(
                    &gateway_order.id,
                    order_id,
                    amount,
                    &self.currency,
                    &receipt,
                )
            })
            .await?;

        tracing::info!(gateway_order_id = %gateway_order.id, "payment intent opened");
        metrics::counter!("payment_intents_opened_total").increment(1);

        Ok(PaymentIntent {
            gateway_order_id: gateway_order.id,
            order_id,
            amount,
            currency: self.currency.clone(),
            receipt,
        })
    }

    /// Verifies a signed payment callback and marks the order paid.
    ///
    /// The payment record and the order move together in one commit.
    /// Replaying an already accepted callback returns the paid order.
    #[tracing::instrument(
        skip(self, cmd),
        fields(order_id = %cmd.order_id, gateway_order_id = %cmd.gateway_order_id)
    )]
    pub async fn verify_payment(&self, cmd: VerifyPayment) -> Result<Order> {
        let order = self.require_order(cmd.order_id).await?;
        authorize(&cmd.actor, &order)?;

        let record = self
            .payments
            .load_existing(PaymentRecord::stream_id(&cmd.gateway_order_id))
            .await?
            .ok_or_else(|| FulfillmentError::PaymentNotFound(cmd.gateway_order_id.clone()))?;
        if record.order_id() != Some(cmd.order_id) {
            return Err(FulfillmentError::PaymentMismatch(cmd.gateway_order_id.clone()));
        }

        if !self
            .verifier
            .verify(&cmd.gateway_order_id, &cmd.gateway_payment_id, &cmd.signature)
        {
            self.record_rejection(&cmd).await?;
            return Err(FulfillmentError::SignatureInvalid);
        }

        let reference = PaymentReference {
            gateway_order_id: cmd.gateway_order_id.clone(),
            gateway_payment_id: cmd.gateway_payment_id.clone(),
        };
        if order.payment() == Some(&reference) {
            return Ok(order);
        }

        let order = retry_on_conflict("verify_payment", || self.try_verify(&cmd, &reference)).await?;

        tracing::info!(amount = %order.amount_paid(), "payment verified");
        metrics::counter!("payments_verified_total").increment(1);
        Ok(order)
    }

    async fn try_verify(&self, cmd: &VerifyPayment, reference: &PaymentReference) -> Result<Order> {
        let mut order = self.require_order(cmd.order_id).await?;
        if order.payment() == Some(reference) {
            return Ok(order);
        }
        if order.payment().is_some() {
            return Err(FulfillmentError::AlreadyPaid);
        }
        if order.status() != OrderStatus::Pending {
            return Err(FulfillmentError::OrderNotReady {
                status: order.status(),
            });
        }

        let record_id = PaymentRecord::stream_id(&cmd.gateway_order_id);
        let record = self.payments.load(record_id).await?;
        if record.amount() != order.subtotal() {
            tracing::warn!(
                recorded = %record.amount(),
                subtotal = %order.subtotal(),
                "payment amount differs from order total"
            );
        }

        let payment_events =
            record.verify(cmd.order_id, &cmd.gateway_payment_id, &cmd.signature)?;
        let order_events = order.mark_paid(reference.clone(), record.amount())?;

        let mut uow = UnitOfWork::new();
        uow.record::<PaymentRecord>(record_id, record.version(), &payment_events)?;
        uow.record::<Order>(cmd.order_id, order.version(), &order_events)?;
        uow.commit(self.orders.store()).await?;

        apply_committed(&mut order, order_events);
        Ok(order)
    }

    async fn record_rejection(&self, cmd: &VerifyPayment) -> Result<()> {
        self.payments
            .execute_with_retry(
                "reject_payment",
                PaymentRecord::stream_id(&cmd.gateway_order_id),
                |record| {
                    record.reject(cmd.order_id, &cmd.gateway_payment_id, "signature mismatch")
                },
            )
            .await?;

        tracing::warn!(
            target: "security",
            order_id = %cmd.order_id,
            gateway_order_id = %cmd.gateway_order_id,
            gateway_payment_id = %cmd.gateway_payment_id,
            user_id = %cmd.actor.user_id,
            "payment signature mismatch"
        );
        metrics::counter!("payment_signature_rejections_total").increment(1);
        Ok(())
    }

    pub async fn get_payment(&self, gateway_order_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .payments
            .load_existing(PaymentRecord::stream_id(gateway_order_id))
            .await?)
    }

    async fn require_order(&self, order_id: AggregateId) -> Result<Order> {
        self.orders
            .load_existing(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }
}

fn authorize(actor: &Actor, order: &Order) -> Result<()> {
    match order.user_id() {
        Some(owner) if actor.can_act_for(owner) => Ok(()),
        _ => Err(FulfillmentError::Forbidden(format!(
            "{} may not pay for this order",
            actor.user_id
        ))),
    }
}
