//! Infrastructure layer: order storage, dispatch commit, scan sessions, config.

pub mod config;
pub mod dispatch_committer;
pub mod order_store;
pub mod scan_service;
pub mod workers;

pub use config::{AppConfig, ConfigError};
pub use dispatch_committer::{CommitError, CommitOutcome, DispatchCommitter};
pub use order_store::{
    ConditionalDispatch, InMemoryOrderStore, OrderFilter, OrderStore, OrderStoreError,
    PostgresOrderStore,
};
pub use scan_service::{
    BeginScan, OrderSummary, PartLine, ScanError, ScanReport, ScanService, SessionView,
};
pub use workers::{SessionSweeper, WorkerHandle};
