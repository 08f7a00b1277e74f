//! Dispatch commit: the one persisted state change of the scan workflow.
//!
//! ```text
//! all parts scanned
//!   ↓
//! update_status_to_dispatched_if_pending(id, now)   (single conditional write)
//!   ↓
//! Dispatched ──────────────→ CommitOutcome::Dispatched
//! AlreadyDispatched ───────→ CommitOutcome::AlreadyDispatched   (retry or racing station)
//! NotFound ────────────────→ CommitError::NotFound              (fatal for the session)
//! store error ─────────────→ CommitError::Store                 (retryable when transient)
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use shipcheck_orders::{Order, OrderId};

use crate::order_store::{ConditionalDispatch, OrderStore, OrderStoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This commit performed the transition.
    Dispatched(Order),
    /// The order was already past dispatch; the desired end state holds.
    AlreadyDispatched(Order),
}

impl CommitOutcome {
    pub fn order(&self) -> &Order {
        match self {
            CommitOutcome::Dispatched(o) | CommitOutcome::AlreadyDispatched(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            CommitOutcome::Dispatched(o) | CommitOutcome::AlreadyDispatched(o) => o,
        }
    }

    pub fn was_already_dispatched(&self) -> bool {
        matches!(self, CommitOutcome::AlreadyDispatched(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("order {0} disappeared before dispatch")]
    NotFound(OrderId),

    #[error(transparent)]
    Store(#[from] OrderStoreError),
}

impl CommitError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CommitError::NotFound(_) => false,
            CommitError::Store(e) => e.is_transient(),
        }
    }
}

/// Performs the conditional `Pending → Dispatched` transition.
#[derive(Debug, Clone)]
pub struct DispatchCommitter<S> {
    store: S,
}

impl<S> DispatchCommitter<S>
where
    S: OrderStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Commit the dispatch of `order_id` stamped with `now`.
    ///
    /// Idempotent: a repeated call reports `AlreadyDispatched` and leaves
    /// `dispatched_at` as the first commit wrote it.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn commit(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome, CommitError> {
        match self
            .store
            .update_status_to_dispatched_if_pending(order_id, now)
            .await?
        {
            ConditionalDispatch::Dispatched(order) => {
                tracing::info!(tracking_id = %order.tracking_id(), "order dispatched");
                Ok(CommitOutcome::Dispatched(order))
            }
            ConditionalDispatch::AlreadyDispatched(order) => {
                tracing::info!(
                    tracking_id = %order.tracking_id(),
                    "dispatch commit found order already dispatched"
                );
                Ok(CommitOutcome::AlreadyDispatched(order))
            }
            ConditionalDispatch::NotFound => Err(CommitError::NotFound(order_id)),
        }
    }
}
