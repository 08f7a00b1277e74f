use std::sync::Arc;
use std::time::Duration;

use shipcheck_infra::{
    AppConfig, InMemoryOrderStore, OrderStore, OrderStoreError, PostgresOrderStore, ScanService,
    SessionSweeper, WorkerHandle,
};

/// Type-erased order store shared by the order routes and the scan service.
pub type SharedOrderStore = Arc<dyn OrderStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::InMemory => "in_memory",
            StoreBackend::Postgres => "postgres",
        }
    }
}

/// Long-lived services behind the router.
pub struct AppServices {
    pub orders: SharedOrderStore,
    pub scans: Arc<ScanService<SharedOrderStore>>,
    pub backend: StoreBackend,
    // Held for its lifetime; dropping the services stops the sweeper.
    _sweeper: WorkerHandle,
}

/// Idle sessions are swept a few times per timeout window, at most once a minute apart.
fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, OrderStoreError> {
    let (orders, backend): (SharedOrderStore, StoreBackend) = match &config.database_url {
        Some(url) => {
            let store = PostgresOrderStore::connect(url).await?;
            store.ensure_schema().await?;
            tracing::info!("using postgres order store");
            let store: SharedOrderStore = Arc::new(store);
            (store, StoreBackend::Postgres)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory order store");
            let store: SharedOrderStore = Arc::new(InMemoryOrderStore::new());
            (store, StoreBackend::InMemory)
        }
    };

    let scans = Arc::new(ScanService::new(
        orders.clone(),
        config.parts_schema.source(),
        config.session_idle_timeout,
    ));
    let sweeper = SessionSweeper::spawn(scans.clone(), sweep_interval(config.session_idle_timeout));

    Ok(AppServices {
        orders,
        scans,
        backend,
        _sweeper: sweeper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_interval_is_bounded() {
        assert_eq!(sweep_interval(Duration::from_secs(900)), Duration::from_secs(60));
        assert_eq!(sweep_interval(Duration::from_secs(40)), Duration::from_secs(10));
        assert_eq!(sweep_interval(Duration::from_secs(2)), Duration::from_secs(1));
    }
}
