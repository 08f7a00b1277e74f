//! Orders domain module.
//!
//! Business rules for shipment orders and the expected-part derivation the
//! scan workflow verifies against. Deterministic domain logic only (no IO,
//! no HTTP, no storage).

pub mod expected;
pub mod identifiers;
pub mod order;

pub use expected::{
    DeclaredQuantities, ExpectedParts, ExpectedPartsSource, FlattenEntries, PartsSchema,
};
pub use identifiers::{PartNumber, TrackingId};
pub use order::{
    CreateOrder, DispatchOrder, Entry, Order, OrderCommand, OrderDispatched, OrderEvent, OrderId,
    OrderRecord, OrderStatus,
};
