use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::order_store::OrderStore;
use crate::scan_service::ScanService;

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(j) = self.join.take() {
            let _ = j.await;
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(j) = self.join.take() {
            j.abort();
        }
    }
}

/// Periodically evicts idle scan sessions.
#[derive(Debug)]
pub struct SessionSweeper;

impl SessionSweeper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn spawn<S>(service: Arc<ScanService<S>>, every: Duration) -> WorkerHandle
    where
        S: OrderStore + Clone + Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tick.tick() => {
                        let evicted = service.evict_idle(Utc::now());
                        if evicted > 0 {
                            tracing::info!(
                                worker = "session_sweeper",
                                evicted,
                                "idle scan sessions evicted"
                            );
                        }
                    }
                }
            }
        });

        WorkerHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use shipcheck_orders::FlattenEntries;

    use super::*;
    use crate::order_store::InMemoryOrderStore;

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let svc = Arc::new(ScanService::new(
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(FlattenEntries),
            Duration::from_secs(60),
        ));
        let handle = SessionSweeper::spawn(svc, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
    }
}
