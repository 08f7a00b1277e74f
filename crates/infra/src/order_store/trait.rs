use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use shipcheck_orders::{Order, OrderId, OrderStatus, TrackingId};

/// Order store operation error.
///
/// Infrastructure errors only; business rule failures are `DomainError`s and
/// never cross this boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderStoreError {
    /// Backend unreachable or the call failed in transit. Safe to retry.
    #[error("order store unavailable: {0}")]
    Unavailable(String),

    /// Write collided with an existing record (duplicate tracking id or id).
    #[error("order store conflict: {0}")]
    Conflict(String),

    /// A stored record could not be turned back into a valid order.
    #[error("corrupt order record: {0}")]
    Corrupt(String),
}

impl OrderStoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OrderStoreError::Unavailable(_))
    }
}

/// Result of the conditional dispatch update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalDispatch {
    /// This call flipped the order to `Dispatched`.
    Dispatched(Order),
    /// The order was already past dispatch; nothing was written.
    AlreadyDispatched(Order),
    NotFound,
}

/// Listing filter. Empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub created_since: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status {
            if order.status() != status {
                return false;
            }
        }
        if let Some(since) = self.created_since {
            if order.created_at() < since {
                return false;
            }
        }
        true
    }
}

/// Order aggregate store.
///
/// Implementations must:
/// - keep tracking ids unique across all orders
/// - apply `update_status_to_dispatched_if_pending` atomically (compare-and-set
///   on the current status, never read-modify-write)
/// - return `list` results newest first
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<Order, OrderStoreError>;

    async fn find_by_tracking_id(
        &self,
        tracking_id: &TrackingId,
    ) -> Result<Option<Order>, OrderStoreError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError>;

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderStoreError>;

    /// Remove an order. Returns `false` when nothing matched.
    async fn delete(&self, id: OrderId) -> Result<bool, OrderStoreError>;

    /// Set `Dispatched` + `dispatched_at` only if the order is still pending.
    async fn update_status_to_dispatched_if_pending(
        &self,
        id: OrderId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<ConditionalDispatch, OrderStoreError>;
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn insert(&self, order: Order) -> Result<Order, OrderStoreError> {
        (**self).insert(order).await
    }

    async fn find_by_tracking_id(
        &self,
        tracking_id: &TrackingId,
    ) -> Result<Option<Order>, OrderStoreError> {
        (**self).find_by_tracking_id(tracking_id).await
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        (**self).find_by_id(id).await
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderStoreError> {
        (**self).list(filter).await
    }

    async fn delete(&self, id: OrderId) -> Result<bool, OrderStoreError> {
        (**self).delete(id).await
    }

    async fn update_status_to_dispatched_if_pending(
        &self,
        id: OrderId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<ConditionalDispatch, OrderStoreError> {
        (**self).update_status_to_dispatched_if_pending(id, dispatched_at).await
    }
}
