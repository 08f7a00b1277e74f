use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shipcheck_core::{Aggregate, DomainError};
use shipcheck_orders::{DispatchOrder, Order, OrderCommand, OrderId, TrackingId};

use super::r#trait::{ConditionalDispatch, OrderFilter, OrderStore, OrderStoreError};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    by_tracking_id: HashMap<TrackingId, OrderId>,
}

/// In-memory order store.
///
/// Intended for tests/dev. The dispatch transition runs the aggregate's own
/// `handle`/`apply` under the write lock, which makes it a compare-and-set.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: RwLock<Tables>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> OrderStoreError {
        OrderStoreError::Unavailable("lock poisoned".to_string())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<Order, OrderStoreError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;

        if tables.by_tracking_id.contains_key(order.tracking_id()) {
            return Err(OrderStoreError::Conflict(format!(
                "tracking id '{}' already exists",
                order.tracking_id()
            )));
        }
        if tables.orders.contains_key(&order.id_typed()) {
            return Err(OrderStoreError::Conflict(format!(
                "order {} already exists",
                order.id_typed()
            )));
        }

        tables
            .by_tracking_id
            .insert(order.tracking_id().clone(), order.id_typed());
        tables.orders.insert(order.id_typed(), order.clone());
        Ok(order)
    }

    async fn find_by_tracking_id(
        &self,
        tracking_id: &TrackingId,
    ) -> Result<Option<Order>, OrderStoreError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .by_tracking_id
            .get(tracking_id)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderStoreError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let mut out: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.tracking_id().cmp(a.tracking_id()))
        });
        Ok(out)
    }

    async fn delete(&self, id: OrderId) -> Result<bool, OrderStoreError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        match tables.orders.remove(&id) {
            Some(order) => {
                tables.by_tracking_id.remove(order.tracking_id());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status_to_dispatched_if_pending(
        &self,
        id: OrderId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<ConditionalDispatch, OrderStoreError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(ConditionalDispatch::NotFound);
        };

        let cmd = OrderCommand::DispatchOrder(DispatchOrder {
            order_id: id,
            dispatched_at,
        });

        match order.handle(&cmd) {
            Ok(events) => {
                for e in &events {
                    order.apply(e);
                }
                Ok(ConditionalDispatch::Dispatched(order.clone()))
            }
            Err(DomainError::Conflict(_)) => {
                Ok(ConditionalDispatch::AlreadyDispatched(order.clone()))
            }
            Err(other) => Err(OrderStoreError::Corrupt(other.to_string())),
        }
    }
}
