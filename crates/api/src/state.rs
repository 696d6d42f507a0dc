//! Shared application state and upstream selection.

use std::sync::Arc;

use axum::extract::FromRef;
use domain::catalog::CatalogService;
use domain::order::OrderService;
use domain::payment::SignatureVerifier;
use domain::review::ReviewService;
use event_store::EventStore;
use fulfillment::{
    InMemoryPaymentGateway, InMemoryShippingAggregator, PaymentCoordinator, PaymentGateway,
    RazorpayGateway, ShipmentCoordinator, ShippingAggregator, ShiprocketAggregator,
};
use projections::QueryService;

use crate::config::Config;
use crate::error::StartupError;
use crate::session::{SessionStore, WebhookKey};

pub type Gateway = Arc<dyn PaymentGateway>;
pub type Aggregator = Arc<dyn ShippingAggregator>;

/// The payment gateway and shipping aggregator the server talks to.
#[derive(Clone)]
pub struct Upstreams {
    pub gateway: Gateway,
    pub aggregator: Aggregator,
    pub live_payments: bool,
    pub live_shipping: bool,
}

impl Upstreams {
    /// In-memory gateway and aggregator.
    pub fn sandbox() -> Self {
        Self::with(
            Arc::new(InMemoryPaymentGateway::new()),
            Arc::new(InMemoryShippingAggregator::new()),
        )
    }

    /// Specific implementations, reported as sandbox.
    pub fn with(gateway: Gateway, aggregator: Aggregator) -> Self {
        Self {
            gateway,
            aggregator,
            live_payments: false,
            live_shipping: false,
        }
    }

    /// Real clients where credentials are configured, sandbox otherwise.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let mut upstreams = Self::sandbox();

        match &config.razorpay {
            Some(razorpay) => {
                upstreams.gateway = Arc::new(RazorpayGateway::new(razorpay.clone())?);
                upstreams.live_payments = true;
            }
            None => tracing::warn!("no Razorpay credentials, payments use the in-memory sandbox"),
        }
        match &config.shiprocket {
            Some(shiprocket) => {
                upstreams.aggregator = Arc::new(ShiprocketAggregator::new(shiprocket.clone())?);
                upstreams.live_shipping = true;
            }
            None => tracing::warn!("no Shiprocket credentials, shipping uses the in-memory sandbox"),
        }
        Ok(upstreams)
    }
}

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore + Clone> {
    pub catalog: CatalogService<S>,
    pub orders: OrderService<S>,
    pub payments: PaymentCoordinator<S, Gateway>,
    pub shipments: ShipmentCoordinator<S, Aggregator>,
    pub reviews: ReviewService<S>,
    pub queries: Arc<QueryService<S>>,
    pub sessions: SessionStore,
    pub admin_key: Option<String>,
    pub webhook_key: WebhookKey,
    pub live_payments: bool,
    pub live_shipping: bool,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    pub fn new(store: S, upstreams: Upstreams, config: &Config) -> Result<Self, StartupError> {
        let verifier = SignatureVerifier::new(config.payment_secret().as_bytes())
            .map_err(|e| StartupError::Signature(e.to_string()))?;
        let queries = Arc::new(QueryService::new(store.clone()));

        Ok(Self {
            catalog: CatalogService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            payments: PaymentCoordinator::new(
                store.clone(),
                upstreams.gateway,
                verifier,
                config.currency.clone(),
                config.upstream_timeout,
            ),
            shipments: ShipmentCoordinator::new(
                store.clone(),
                upstreams.aggregator,
                config.pickup.clone(),
                config.upstream_timeout,
            ),
            reviews: ReviewService::new(store, queries.clone(), config.like_policy),
            queries,
            sessions: SessionStore::new(config.session_ttl),
            admin_key: config.admin_key.clone(),
            webhook_key: WebhookKey(config.webhook_key.clone()),
            live_payments: upstreams.live_payments,
            live_shipping: upstreams.live_shipping,
        })
    }
}

impl<S: EventStore + Clone> FromRef<Arc<AppState<S>>> for SessionStore {
    fn from_ref(state: &Arc<AppState<S>>) -> Self {
        state.sessions.clone()
    }
}

impl<S: EventStore + Clone> FromRef<Arc<AppState<S>>> for WebhookKey {
    fn from_ref(state: &Arc<AppState<S>>) -> Self {
        state.webhook_key.clone()
    }
}
