use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shipcheck_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult};

use crate::identifiers::{PartNumber, TrackingId};

/// Order identifier (opaque, assigned by the store at creation).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order status lifecycle.
///
/// Older records spell the values capitalised (`Pending`); both spellings
/// are accepted on the way in, lowercase is written on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "Dispatched")]
    Dispatched,
    #[serde(alias = "Completed")]
    Completed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Dispatched => "dispatched",
            OrderStatus::Completed => "completed",
        }
    }

    /// `true` once the order has left the warehouse (dispatched or later).
    pub fn is_past_dispatch(self) -> bool {
        matches!(self, OrderStatus::Dispatched | OrderStatus::Completed)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "dispatched" => Ok(OrderStatus::Dispatched),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// One line item: a declared count plus the part numbers it covers.
///
/// The same part number may appear several times, within one entry or across entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(alias = "partNumberCount")]
    pub part_number_count: u32,
    #[serde(alias = "partNumbers")]
    pub part_numbers: Vec<PartNumber>,
}

impl Entry {
    /// Build an entry whose declared count matches its part numbers.
    pub fn new(part_numbers: Vec<PartNumber>) -> Self {
        Self {
            part_number_count: part_numbers.len() as u32,
            part_numbers,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.part_numbers.len() == self.part_number_count as usize
    }
}

/// Flat, storage-facing snapshot of an order.
///
/// Stores persist and load this shape; `Order::from_record` re-checks the
/// invariants before handing an aggregate to domain code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub tracking_id: TrackingId,
    pub customer_name: String,
    pub platform: Option<String>,
    pub entries: Vec<Entry>,
    pub status: OrderStatus,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    tracking_id: TrackingId,
    customer_name: String,
    platform: Option<String>,
    entries: Vec<Entry>,
    status: OrderStatus,
    dispatched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    version: u64,
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub tracking_id: TrackingId,
    pub customer_name: String,
    pub platform: Option<String>,
    pub entries: Vec<Entry>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DispatchOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOrder {
    pub order_id: OrderId,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    DispatchOrder(DispatchOrder),
}

/// Event: OrderDispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDispatched {
    pub order_id: OrderId,
    pub dispatched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderDispatched(OrderDispatched),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderDispatched(_) => "orders.order.dispatched",
        }
    }
}

impl Order {
    /// Validate a `CreateOrder` command and build the new aggregate (version 1).
    pub fn create(cmd: CreateOrder) -> DomainResult<Self> {
        let customer_name = cmd.customer_name.trim();
        if customer_name.is_empty() {
            return Err(DomainError::validation("customer_name must not be blank"));
        }

        if cmd.entries.is_empty() {
            return Err(DomainError::validation("order needs at least one entry"));
        }

        for (idx, entry) in cmd.entries.iter().enumerate() {
            if entry.part_number_count == 0 {
                return Err(DomainError::validation(format!(
                    "entry {idx}: part_number_count must be positive"
                )));
            }
            if !entry.is_consistent() {
                return Err(DomainError::validation(format!(
                    "entry {idx}: declared {} part numbers but listed {}",
                    entry.part_number_count,
                    entry.part_numbers.len()
                )));
            }
        }

        let platform = cmd
            .platform
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            id: cmd.order_id,
            tracking_id: cmd.tracking_id,
            customer_name: customer_name.to_string(),
            platform,
            entries: cmd.entries,
            status: OrderStatus::Pending,
            dispatched_at: None,
            created_at: cmd.occurred_at,
            version: 1,
        })
    }

    /// Rebuild an aggregate from a stored record.
    ///
    /// A pending order must not carry `dispatched_at`; a dispatched order must.
    pub fn from_record(record: OrderRecord) -> DomainResult<Self> {
        match (record.status, record.dispatched_at) {
            (OrderStatus::Pending, Some(_)) => {
                return Err(DomainError::invariant(format!(
                    "order {}: pending order has dispatched_at set",
                    record.id
                )));
            }
            (OrderStatus::Dispatched, None) => {
                return Err(DomainError::invariant(format!(
                    "order {}: dispatched order is missing dispatched_at",
                    record.id
                )));
            }
            _ => {}
        }

        Ok(Self {
            id: record.id,
            tracking_id: record.tracking_id,
            customer_name: record.customer_name,
            platform: record.platform,
            entries: record.entries,
            status: record.status,
            dispatched_at: record.dispatched_at,
            created_at: record.created_at,
            version: record.version,
        })
    }

    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            tracking_id: self.tracking_id.clone(),
            customer_name: self.customer_name.clone(),
            platform: self.platform.clone(),
            entries: self.entries.clone(),
            status: self.status,
            dispatched_at: self.dispatched_at,
            created_at: self.created_at,
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn tracking_id(&self) -> &TrackingId {
        &self.tracking_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn dispatched_at(&self) -> Option<DateTime<Utc>> {
        self.dispatched_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_dispatch(&self, cmd: &DispatchOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;

        match self.status {
            OrderStatus::Dispatched => Err(DomainError::conflict("order already dispatched")),
            OrderStatus::Completed => Err(DomainError::conflict("order already completed")),
            OrderStatus::Pending => Ok(vec![OrderEvent::OrderDispatched(OrderDispatched {
                order_id: cmd.order_id,
                dispatched_at: cmd.dispatched_at,
            })]),
        }
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderDispatched(e) => {
                self.status = OrderStatus::Dispatched;
                self.dispatched_at = Some(e.dispatched_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::DispatchOrder(cmd) => self.handle_dispatch(cmd),
        }
    }
}
