//! Postgres-backed order store.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `OrderStoreError` |
//! |------------|---------------|-------------------|
//! | Database (unique violation) | `23505` | `Conflict` (duplicate tracking id) |
//! | Database (other) | any | `Unavailable` |
//! | PoolClosed / Io / Tls / timeouts | n/a | `Unavailable` |
//! | Decode / ColumnNotFound | n/a | `Corrupt` |
//!
//! ## Dispatch
//!
//! The dispatch transition is one `UPDATE ... WHERE status = 'pending' RETURNING`.
//! Postgres row locking makes it the compare-and-set: of two concurrent commits
//! exactly one gets the row back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use shipcheck_core::AggregateId;
use shipcheck_orders::{Order, OrderId, OrderRecord, OrderStatus, TrackingId};

use super::document::{decode_entries, encode_entries};
use super::r#trait::{ConditionalDispatch, OrderFilter, OrderStore, OrderStoreError};

const ORDER_COLUMNS: &str =
    "id, tracking_id, customer_name, platform, entries, status, dispatched_at, created_at, version";

/// Postgres-backed order store.
///
/// `Send + Sync`; all calls go through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, OrderStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `orders` table and its indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), OrderStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id UUID PRIMARY KEY,
                tracking_id TEXT NOT NULL UNIQUE,
                customer_name TEXT NOT NULL,
                platform TEXT NULL,
                entries JSONB NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                dispatched_at TIMESTAMPTZ NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                version BIGINT NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_orders_table", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS orders_created_at_idx ON orders (created_at DESC)")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_orders_index", e))?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(
        skip(self, order),
        fields(order_id = %order.id_typed(), tracking_id = %order.tracking_id()),
        err
    )]
    async fn insert(&self, order: Order) -> Result<Order, OrderStoreError> {
        let record = order.to_record();
        let entries = encode_entries(&record.entries)?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id,
                tracking_id,
                customer_name,
                platform,
                entries,
                status,
                dispatched_at,
                created_at,
                version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id.0.as_uuid())
        .bind(record.tracking_id.as_str())
        .bind(&record.customer_name)
        .bind(record.platform.as_deref())
        .bind(&entries)
        .bind(record.status.as_str())
        .bind(record.dispatched_at)
        .bind(record.created_at)
        .bind(record.version as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                OrderStoreError::Conflict(format!(
                    "tracking id '{}' already exists",
                    record.tracking_id
                ))
            } else {
                map_sqlx_error("insert_order", e)
            }
        })?;

        Ok(order)
    }

    #[instrument(
        skip(self),
        fields(tracking_id = %tracking_id, found = tracing::field::Empty),
        err
    )]
    async fn find_by_tracking_id(
        &self,
        tracking_id: &TrackingId,
    ) -> Result<Option<Order>, OrderStoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE tracking_id = $1");
        let row = sqlx::query(&sql)
            .bind(tracking_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_tracking_id", e))?;

        Span::current().record("found", row.is_some());
        row.map(|r| order_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.0.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        row.map(|r| order_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(order_count = tracing::field::Empty), err)]
    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderStoreError> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE ($1::TEXT IS NULL OR lower(status) = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
            ORDER BY created_at DESC, tracking_id DESC
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.created_since)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(order_from_row(row)?);
        }
        Span::current().record("order_count", orders.len());
        Ok(orders)
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete(&self, id: OrderId) -> Result<bool, OrderStoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.0.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(order_id = %id, dispatched_at = %dispatched_at), err)]
    async fn update_status_to_dispatched_if_pending(
        &self,
        id: OrderId,
        dispatched_at: DateTime<Utc>,
    ) -> Result<ConditionalDispatch, OrderStoreError> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = 'dispatched', dispatched_at = $2, version = version + 1
            WHERE id = $1 AND lower(status) = 'pending'
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let updated = sqlx::query(&sql)
            .bind(id.0.as_uuid())
            .bind(dispatched_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("dispatch_if_pending", e))?;

        if let Some(row) = updated {
            return Ok(ConditionalDispatch::Dispatched(order_from_row(&row)?));
        }

        // Nothing updated: either gone or no longer pending.
        unapplied_dispatch_outcome(self.find_by_id(id).await?)
    }
}

/// Classify a conditional dispatch that matched no row, given the order as re-read afterwards.
fn unapplied_dispatch_outcome(
    current: Option<Order>,
) -> Result<ConditionalDispatch, OrderStoreError> {
    match current {
        None => Ok(ConditionalDispatch::NotFound),
        Some(order) if order.status().is_past_dispatch() => {
            Ok(ConditionalDispatch::AlreadyDispatched(order))
        }
        Some(order) => Err(OrderStoreError::Conflict(format!(
            "order {} is {} but the conditional dispatch did not apply",
            order.id_typed(),
            order.status()
        ))),
    }
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order, OrderStoreError> {
    let record = OrderRow::try_from_row(row)
        .map_err(|e| OrderStoreError::Corrupt(format!("failed to read order row: {e}")))?
        .into_record()?;
    Order::from_record(record).map_err(|e| OrderStoreError::Corrupt(e.to_string()))
}

// SQLx row types

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    tracking_id: String,
    customer_name: String,
    platform: Option<String>,
    entries: serde_json::Value,
    status: String,
    dispatched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    version: i64,
}

impl OrderRow {
    fn try_from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            tracking_id: row.try_get("tracking_id")?,
            customer_name: row.try_get("customer_name")?,
            platform: row.try_get("platform")?,
            entries: row.try_get("entries")?,
            status: row.try_get("status")?,
            dispatched_at: row.try_get("dispatched_at")?,
            created_at: row.try_get("created_at")?,
            version: row.try_get("version")?,
        })
    }

    fn into_record(self) -> Result<OrderRecord, OrderStoreError> {
        let id = self.id;
        let corrupt = |what: String| OrderStoreError::Corrupt(format!("order {id}: {what}"));

        let tracking_id = TrackingId::parse(&self.tracking_id).map_err(|e| corrupt(e.to_string()))?;
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let entries = decode_entries(self.entries)?;

        Ok(OrderRecord {
            id: OrderId::new(AggregateId::from_uuid(id)),
            tracking_id,
            customer_name: self.customer_name,
            platform: self.platform,
            entries,
            status,
            dispatched_at: self.dispatched_at,
            created_at: self.created_at,
            version: self.version.max(1) as u64,
        })
    }
}

/// Map SQLx errors to `OrderStoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> OrderStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => OrderStoreError::Conflict(msg),
                _ => OrderStoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => {
            OrderStoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            OrderStoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => OrderStoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
