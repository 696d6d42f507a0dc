//! Orders view: every order, indexed by customer and status, plus the set
//! of delivered purchases used for review eligibility.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::order::{Order, OrderEvent, OrderStatus};
use domain::{Aggregate, ProductId, UserId};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Page size used when a filter sets no limit.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Filter for order listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl OrderFilter {
    /// Orders of one customer.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<OrderStatus>) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Default)]
struct OrdersState {
    orders: HashMap<AggregateId, Order>,
    by_user: HashMap<UserId, Vec<AggregateId>>,
    by_status: HashMap<OrderStatus, HashSet<AggregateId>>,
    delivered: HashSet<(UserId, ProductId)>,
    position: ProjectionPosition,
}

impl OrdersState {
    fn apply(&mut self, envelope: &EventEnvelope, event: OrderEvent) {
        let order_id = envelope.aggregate_id;
        if let OrderEvent::OrderPlaced(data) = &event {
            self.by_user
                .entry(data.user_id.clone())
                .or_default()
                .push(order_id);
        }

        let order = self.orders.entry(order_id).or_default();
        let before = order.id().map(|_| order.status());
        order.apply(event);
        order.set_version(envelope.version);
        let after = order.id().map(|_| order.status());

        if before != after {
            if let Some(status) = before
                && let Some(ids) = self.by_status.get_mut(&status)
            {
                ids.remove(&order_id);
            }
            if let Some(status) = after {
                self.by_status.entry(status).or_default().insert(order_id);
            }
        }

        if order.status() == OrderStatus::Delivered
            && let Some(user_id) = order.user_id()
        {
            for line in order.lines() {
                self.delivered
                    .insert((user_id.clone(), line.product_id.clone()));
            }
        }
    }
}

/// Orders rebuilt from their event streams.
///
/// This view is Clone-able and shares state via `Arc<RwLock<_>>`.
#[derive(Debug, Clone, Default)]
pub struct OrdersView {
    state: Arc<RwLock<OrdersState>>,
}

impl OrdersView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<Order> {
        self.state.read().await.orders.get(&order_id).cloned()
    }

    /// Lists orders matching the filter, newest first.
    pub async fn query(&self, filter: &OrderFilter) -> Vec<Order> {
        let state = self.state.read().await;
        let with_status = filter.status.map(|status| state.by_status.get(&status));
        let mut orders: Vec<&Order> = match (&filter.user_id, with_status) {
            (_, Some(None)) => Vec::new(),
            (Some(user_id), with_status) => state
                .by_user
                .get(user_id)
                .into_iter()
                .flatten()
                .filter(|id| with_status.flatten().is_none_or(|ids| ids.contains(*id)))
                .filter_map(|id| state.orders.get(id))
                .collect(),
            (None, Some(Some(ids))) => ids.iter().filter_map(|id| state.orders.get(id)).collect(),
            (None, None) => state.orders.values().collect(),
        };
        orders.sort_by(|a, b| b.placed_at().cmp(&a.placed_at()));

        orders
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .cloned()
            .collect()
    }

    /// True once an order of this user containing the product was delivered.
    pub async fn has_delivered(&self, user_id: &UserId, product_id: &ProductId) -> bool {
        self.state
            .read()
            .await
            .delivered
            .contains(&(user_id.clone(), product_id.clone()))
    }
}

#[async_trait]
impl Projection for OrdersView {
    fn name(&self) -> &'static str {
        "OrdersView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if event.aggregate_type == Order::aggregate_type() {
            let order_event: OrderEvent = serde_json::from_value(event.payload.clone())?;
            state.apply(event, order_event);
        }
        state.position = state.position.advance_to(event.position);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = OrdersState::default();
        Ok(())
    }
}

impl ReadModel for OrdersView {
    fn name(&self) -> &'static str {
        "OrdersView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}
