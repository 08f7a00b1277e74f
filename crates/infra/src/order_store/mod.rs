//! Order aggregate store boundary.
//!
//! Orders are held as current-state records. The only state change the scan
//! workflow performs, the dispatch transition, goes through
//! [`OrderStore::update_status_to_dispatched_if_pending`] as one conditional
//! update so two commits for the same order can never both win.

pub mod document;
pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use r#trait::{ConditionalDispatch, OrderFilter, OrderStore, OrderStoreError};
