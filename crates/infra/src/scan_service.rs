//! Scan workflow service: the `begin_scan` / `scan_part` surface.
//!
//! Owns the registry of live scan sessions (token → session). Each session sits
//! behind its own async mutex, so submissions for one token are evaluated one at
//! a time in arrival order (including across the store round-trip of a dispatch
//! commit) while other sessions proceed independently.
//!
//! ```text
//! begin_scan(tracking id) ── lookup ──→ bind ──→ token
//! scan_part(token, part)  ── matcher ─→ Accepted | Rejected
//!                                         └─ all satisfied ─→ commit ─→ session discarded
//!                                                               └─ store down ─→ retry_dispatch
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use shipcheck_auth::{Capability, Permission};
use shipcheck_core::SessionToken;
use shipcheck_orders::{ExpectedPartsSource, Order, OrderId, OrderStatus, PartNumber, TrackingId};
use shipcheck_scan::{Progress, RejectReason, ScanSession, ScanState, ScanStep, SessionError};

use crate::dispatch_committer::{CommitError, CommitOutcome, DispatchCommitter};
use crate::order_store::{OrderStore, OrderStoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("forbidden: capability does not grant '{0}'")]
    Forbidden(String),

    #[error("enter a tracking id")]
    EmptyTrackingId,

    #[error("tracking id '{0}' not found")]
    TrackingIdNotFound(TrackingId),

    #[error("order {0} has already been dispatched")]
    AlreadyDispatched(TrackingId),

    #[error("order {0} has no parts to verify")]
    NothingToVerify(TrackingId),

    #[error("no active scan session {0}")]
    UnknownSession(SessionToken),

    #[error("enter a part number")]
    EmptyPartNumber,

    #[error("{}", .reason.operator_message())]
    Rejected { reason: RejectReason, progress: Progress },

    #[error("not every part has been scanned yet ({}/{})", .progress.scanned, .progress.required)]
    NotReadyForDispatch { progress: Progress },

    #[error("dispatch could not be recorded: {source}")]
    DispatchFailed {
        progress: Progress,
        /// Session kept; `retry_dispatch` may succeed later.
        retryable: bool,
        source: OrderStoreError,
    },

    #[error("order {0} disappeared before it could be dispatched")]
    OrderVanished(TrackingId),

    #[error(transparent)]
    Store(#[from] OrderStoreError),

    #[error(transparent)]
    Session(SessionError),
}

/// One expected part with how many copies the order needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartLine {
    pub part_number: PartNumber,
    pub required: u32,
    pub scanned: u32,
}

/// What the operator sees once a tracking id is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub tracking_id: TrackingId,
    pub customer_name: String,
    pub platform: Option<String>,
    pub status: OrderStatus,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id_typed(),
            tracking_id: order.tracking_id().clone(),
            customer_name: order.customer_name().to_string(),
            platform: order.platform().map(str::to_string),
            status: order.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeginScan {
    pub token: SessionToken,
    pub order: OrderSummary,
    pub parts: Vec<PartLine>,
    pub progress: Progress,
}

/// Result of an accepted scan (or of a successful dispatch retry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub accepted: bool,
    pub progress: Progress,
    pub dispatched: bool,
    /// Dispatch was already recorded by an earlier commit or another station.
    pub already_dispatched: bool,
    pub state: ScanState,
    pub message: String,
}

/// Read-only view of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub token: SessionToken,
    pub state: ScanState,
    pub order: Option<OrderSummary>,
    pub parts: Vec<PartLine>,
    pub progress: Progress,
    pub ready_for_dispatch: bool,
}

#[derive(Debug)]
struct Slot {
    session: ScanSession,
    last_active: DateTime<Utc>,
    /// Set once the slot has left the registry; queued callers then see `UnknownSession`.
    closed: bool,
}

type SharedSlot = Arc<tokio::sync::Mutex<Slot>>;

/// Scan workflow over an [`OrderStore`].
pub struct ScanService<S> {
    store: S,
    committer: DispatchCommitter<S>,
    derivation: Arc<dyn ExpectedPartsSource>,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<SessionToken, SharedSlot>>,
}

impl<S> core::fmt::Debug for ScanService<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScanService")
            .field("derivation", &self.derivation)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

fn part_lines(session: &ScanSession) -> Vec<PartLine> {
    session
        .expected()
        .iter()
        .map(|(part, required)| PartLine {
            part_number: part.clone(),
            required,
            scanned: session.scanned().get(part),
        })
        .collect()
}

fn ensure_scan_capability(cap: &Capability) -> Result<(), ScanError> {
    if cap.permits(&Permission::DISPATCH_SCAN) {
        Ok(())
    } else {
        Err(ScanError::Forbidden(Permission::DISPATCH_SCAN.as_str().to_string()))
    }
}

impl<S> ScanService<S>
where
    S: OrderStore + Clone,
{
    pub fn new(store: S, derivation: Arc<dyn ExpectedPartsSource>, idle_timeout: Duration) -> Self {
        Self {
            committer: DispatchCommitter::new(store.clone()),
            store,
            derivation,
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SessionToken, SharedSlot>> {
        // Every update is a single insert/remove/retain, so a poisoned map is still consistent.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, token: SessionToken) -> Result<SharedSlot, ScanError> {
        self.registry()
            .get(&token)
            .cloned()
            .ok_or(ScanError::UnknownSession(token))
    }

    fn discard(&self, token: SessionToken, slot: &mut Slot) {
        slot.closed = true;
        self.registry().remove(&token);
    }

    /// Look up `raw_tracking_id` and open a session for it.
    ///
    /// No session is created on any error.
    #[instrument(skip(self, cap), fields(principal_id = %cap.principal_id()), err)]
    pub async fn begin_scan(
        &self,
        cap: &Capability,
        raw_tracking_id: &str,
    ) -> Result<BeginScan, ScanError> {
        ensure_scan_capability(cap)?;

        let tracking_id =
            TrackingId::parse(raw_tracking_id).map_err(|_| ScanError::EmptyTrackingId)?;

        let order = self
            .store
            .find_by_tracking_id(&tracking_id)
            .await?
            .ok_or_else(|| ScanError::TrackingIdNotFound(tracking_id.clone()))?;

        let mut session = ScanSession::new(self.derivation.clone());
        let progress = session.bind_order(order).map_err(|e| match e {
            SessionError::AlreadyDispatched(t) => ScanError::AlreadyDispatched(t),
            SessionError::NothingToVerify(t) => ScanError::NothingToVerify(t),
            e @ SessionError::UnverifiableOrder { .. } => {
                tracing::error!(error = %e, "stored order cannot be verified");
                ScanError::Store(OrderStoreError::Corrupt(e.to_string()))
            }
            other => ScanError::Session(other),
        })?;

        let summary = session.order().map(OrderSummary::from);
        let Some(order) = summary else {
            return Err(ScanError::Session(SessionError::InvalidState {
                expected: ScanState::AwaitingNextPart,
                actual: session.state(),
            }));
        };
        let parts = part_lines(&session);

        let token = SessionToken::new();
        let slot = Slot {
            session,
            last_active: Utc::now(),
            closed: false,
        };
        self.registry()
            .insert(token, Arc::new(tokio::sync::Mutex::new(slot)));

        tracing::info!(
            %token,
            tracking_id = %order.tracking_id,
            required = progress.required,
            "scan session started"
        );

        Ok(BeginScan {
            token,
            order,
            parts,
            progress,
        })
    }

    /// Evaluate one scanned part for the session behind `token`.
    ///
    /// When the scan satisfies the last expected part the dispatch is committed
    /// before this returns; on success the session is discarded.
    #[instrument(skip(self, cap), err)]
    pub async fn scan_part(
        &self,
        cap: &Capability,
        token: SessionToken,
        raw_part: &str,
    ) -> Result<ScanReport, ScanError> {
        ensure_scan_capability(cap)?;

        let shared = self.slot(token)?;
        let mut slot = shared.lock().await;
        if slot.closed {
            return Err(ScanError::UnknownSession(token));
        }
        slot.last_active = Utc::now();

        let step = slot.session.scan(raw_part).map_err(|e| match e {
            SessionError::EmptyPartNumber => ScanError::EmptyPartNumber,
            other => ScanError::Session(other),
        })?;

        match step {
            ScanStep::Accepted(progress) => {
                tracing::debug!(
                    scanned = progress.scanned,
                    required = progress.required,
                    "part accepted"
                );
                Ok(ScanReport {
                    accepted: true,
                    progress,
                    dispatched: false,
                    already_dispatched: false,
                    state: slot.session.state(),
                    message: format!("Part {} of {} matched.", progress.scanned, progress.required),
                })
            }
            ScanStep::Rejected { reason, progress } => {
                tracing::debug!(reason = reason.as_str(), "part rejected");
                Err(ScanError::Rejected { reason, progress })
            }
            ScanStep::ReadyForDispatch(progress) => {
                self.commit_locked(token, &mut slot, progress).await
            }
        }
    }

    /// Re-attempt the dispatch commit for a fully scanned session.
    #[instrument(skip(self, cap), err)]
    pub async fn retry_dispatch(
        &self,
        cap: &Capability,
        token: SessionToken,
    ) -> Result<ScanReport, ScanError> {
        ensure_scan_capability(cap)?;

        let shared = self.slot(token)?;
        let mut slot = shared.lock().await;
        if slot.closed {
            return Err(ScanError::UnknownSession(token));
        }
        slot.last_active = Utc::now();

        let progress = slot.session.progress();
        if !slot.session.is_ready_for_dispatch() {
            return Err(ScanError::NotReadyForDispatch { progress });
        }

        self.commit_locked(token, &mut slot, progress).await
    }

    async fn commit_locked(
        &self,
        token: SessionToken,
        slot: &mut Slot,
        progress: Progress,
    ) -> Result<ScanReport, ScanError> {
        let Some(order) = slot.session.order() else {
            return Err(ScanError::Session(SessionError::NotReadyForDispatch));
        };
        let order_id = order.id_typed();
        let tracking_id = order.tracking_id().clone();

        let result = self.committer.commit(order_id, Utc::now()).await;
        let retryable = result.as_ref().is_err_and(CommitError::is_retryable);

        match result {
            Ok(outcome) => {
                let already_dispatched = outcome.was_already_dispatched();
                let message = match &outcome {
                    CommitOutcome::Dispatched(_) => {
                        format!("All parts verified. Order {tracking_id} dispatched.")
                    }
                    CommitOutcome::AlreadyDispatched(_) => {
                        format!("All parts verified. Order {tracking_id} was already dispatched.")
                    }
                };

                slot.session
                    .complete(outcome.into_order())
                    .map_err(ScanError::Session)?;
                let state = slot.session.state();
                self.discard(token, slot);

                tracing::info!(%tracking_id, already_dispatched, "scan session complete");
                Ok(ScanReport {
                    accepted: true,
                    progress,
                    dispatched: true,
                    already_dispatched,
                    state,
                    message,
                })
            }
            Err(CommitError::NotFound(_)) => {
                tracing::error!(
                    %tracking_id,
                    "order vanished before dispatch commit; discarding session"
                );
                self.discard(token, slot);
                Err(ScanError::OrderVanished(tracking_id))
            }
            Err(CommitError::Store(source)) => {
                if retryable {
                    tracing::warn!(
                        %tracking_id,
                        error = %source,
                        "dispatch commit failed; session kept for retry"
                    );
                } else {
                    tracing::error!(
                        %tracking_id,
                        error = %source,
                        "dispatch commit failed permanently; discarding session"
                    );
                    self.discard(token, slot);
                }
                Err(ScanError::DispatchFailed {
                    progress,
                    retryable,
                    source,
                })
            }
        }
    }

    /// Drop a session before completion. Nothing is written to the store.
    #[instrument(skip(self), err)]
    pub async fn abandon(&self, token: SessionToken) -> Result<(), ScanError> {
        let shared = self.slot(token)?;
        let mut slot = shared.lock().await;
        if slot.closed {
            return Err(ScanError::UnknownSession(token));
        }
        self.discard(token, &mut slot);
        tracing::info!("scan session abandoned");
        Ok(())
    }

    pub async fn session(&self, token: SessionToken) -> Result<SessionView, ScanError> {
        let shared = self.slot(token)?;
        let slot = shared.lock().await;
        if slot.closed {
            return Err(ScanError::UnknownSession(token));
        }

        Ok(SessionView {
            token,
            state: slot.session.state(),
            order: slot.session.order().map(OrderSummary::from),
            parts: part_lines(&slot.session),
            progress: slot.session.progress(),
            ready_for_dispatch: slot.session.is_ready_for_dispatch(),
        })
    }

    /// Evict sessions idle for longer than the configured timeout.
    ///
    /// Sessions with a call in flight are skipped. Returns how many were evicted.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let idle = chrono::Duration::from_std(self.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut registry = self.registry();
        let before = registry.len();

        registry.retain(|token, shared| {
            let Ok(mut slot) = shared.try_lock() else {
                return true;
            };
            if now.signed_duration_since(slot.last_active) <= idle {
                return true;
            }
            slot.closed = true;
            tracing::info!(%token, "evicting idle scan session");
            false
        });

        before - registry.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use shipcheck_auth::{Principal, PrincipalId, Role, authorize};
    use shipcheck_core::AggregateId;
    use shipcheck_orders::{CreateOrder, DeclaredQuantities, Entry, FlattenEntries, OrderRecord};

    use super::*;
    use crate::order_store::{ConditionalDispatch, InMemoryOrderStore, OrderFilter};

    /// In-memory store whose dispatch write can be switched off.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: InMemoryOrderStore,
        fail_dispatch: AtomicBool,
        corrupt_dispatch: AtomicBool,
        commits: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl OrderStore for FlakyStore {
        async fn insert(&self, order: Order) -> Result<Order, OrderStoreError> {
            self.inner.insert(order).await
        }

        async fn find_by_tracking_id(
            &self,
            tracking_id: &TrackingId,
        ) -> Result<Option<Order>, OrderStoreError> {
            self.inner.find_by_tracking_id(tracking_id).await
        }

        async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, OrderStoreError> {
            self.inner.find_by_id(id).await
        }

        async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderStoreError> {
            self.inner.list(filter).await
        }

        async fn delete(&self, id: OrderId) -> Result<bool, OrderStoreError> {
            self.inner.delete(id).await
        }

        async fn update_status_to_dispatched_if_pending(
            &self,
            id: OrderId,
            dispatched_at: DateTime<Utc>,
        ) -> Result<ConditionalDispatch, OrderStoreError> {
            if self.fail_dispatch.load(Ordering::SeqCst) {
                return Err(OrderStoreError::Unavailable("connection reset".to_string()));
            }
            if self.corrupt_dispatch.load(Ordering::SeqCst) {
                return Err(OrderStoreError::Corrupt("status column holds 'shipped'".to_string()));
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.update_status_to_dispatched_if_pending(id, dispatched_at).await
        }
    }

    fn operator_cap() -> Capability {
        let p = Principal::from_roles(PrincipalId::new(), vec![Role::WAREHOUSE]);
        authorize(&p, &Permission::DISPATCH_SCAN).unwrap()
    }

    fn order(tracking: &str, parts: &[&str]) -> Order {
        Order::create(CreateOrder {
            order_id: OrderId::new(AggregateId::new()),
            tracking_id: TrackingId::parse(tracking).unwrap(),
            customer_name: "Acme".to_string(),
            platform: Some("ebay".to_string()),
            entries: vec![Entry::new(
                parts.iter().map(|p| PartNumber::parse(p).unwrap()).collect(),
            )],
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    async fn service_with(orders: Vec<Order>) -> (ScanService<Arc<FlakyStore>>, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        for o in orders {
            store.insert(o).await.unwrap();
        }
        let svc = ScanService::new(
            store.clone(),
            Arc::new(FlattenEntries),
            Duration::from_secs(900),
        );
        (svc, store)
    }

    #[tokio::test]
    async fn two_a1_scans_dispatch_and_discard_the_session() {
        let (svc, store) = service_with(vec![order("TRK-1", &["A1", "A1"])]).await;
        let cap = operator_cap();

        let begun = svc.begin_scan(&cap, " TRK-1 ").await.unwrap();
        assert_eq!(begun.progress, Progress { scanned: 0, required: 2 });
        assert_eq!(begun.parts.len(), 1);
        assert_eq!(
            svc.session(begun.token).await.unwrap().state,
            ScanState::AwaitingNextPart
        );

        let first = svc.scan_part(&cap, begun.token, "A1").await.unwrap();
        assert!(first.accepted && !first.dispatched);
        assert_eq!(first.progress, Progress { scanned: 1, required: 2 });
        assert_eq!(first.message, "Part 1 of 2 matched.");

        let second = svc.scan_part(&cap, begun.token, "A1").await.unwrap();
        assert!(second.accepted && second.dispatched && !second.already_dispatched);
        assert_eq!(second.progress, Progress { scanned: 2, required: 2 });
        assert_eq!(second.state, ScanState::Complete);

        let third = svc.scan_part(&cap, begun.token, "A1").await.unwrap_err();
        assert_eq!(third, ScanError::UnknownSession(begun.token));
        assert_eq!(svc.active_sessions(), 0);

        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
        let stored = store
            .find_by_tracking_id(&TrackingId::parse("TRK-1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), OrderStatus::Dispatched);
        assert!(stored.dispatched_at().is_some());
    }

    #[tokio::test]
    async fn already_dispatched_order_creates_no_session() {
        let (svc, store) = service_with(vec![order("TRK-2", &["A1"])]).await;
        let o = store
            .find_by_tracking_id(&TrackingId::parse("TRK-2").unwrap())
            .await
            .unwrap()
            .unwrap();
        store
            .update_status_to_dispatched_if_pending(o.id_typed(), Utc::now())
            .await
            .unwrap();

        let err = svc.begin_scan(&operator_cap(), "TRK-2").await.unwrap_err();
        assert!(matches!(err, ScanError::AlreadyDispatched(_)));
        assert_eq!(svc.active_sessions(), 0);
    }

    #[tokio::test]
    async fn lookup_misses_and_blank_input() {
        let (svc, _) = service_with(vec![order("TRK-3", &["A1"])]).await;
        let cap = operator_cap();

        assert_eq!(svc.begin_scan(&cap, "   ").await.unwrap_err(), ScanError::EmptyTrackingId);
        assert!(matches!(
            svc.begin_scan(&cap, "TRK-404").await.unwrap_err(),
            ScanError::TrackingIdNotFound(_)
        ));
        assert!(matches!(
            svc.begin_scan(&cap, "trk-3").await.unwrap_err(),
            ScanError::TrackingIdNotFound(_)
        ));

        let begun = svc.begin_scan(&cap, "TRK-3").await.unwrap();
        assert_eq!(
            svc.scan_part(&cap, begun.token, "  ").await.unwrap_err(),
            ScanError::EmptyPartNumber
        );
        assert_eq!(svc.session(begun.token).await.unwrap().progress.scanned, 0);
    }

    #[tokio::test]
    async fn order_independence_and_over_scan_rejection() {
        let cap = operator_cap();

        for seq in [["P1", "P1", "P2"], ["P1", "P2", "P1"]] {
            let (svc, _) = service_with(vec![order("TRK-4", &["P1", "P1", "P2"])]).await;
            let t = svc.begin_scan(&cap, "TRK-4").await.unwrap().token;
            let mut last = None;
            for p in seq {
                last = Some(svc.scan_part(&cap, t, p).await.unwrap());
            }
            assert!(last.unwrap().dispatched, "{seq:?}");
        }

        let (svc, store) = service_with(vec![order("TRK-4", &["P1", "P1", "P2"])]).await;
        let t = svc.begin_scan(&cap, "TRK-4").await.unwrap().token;
        svc.scan_part(&cap, t, "P1").await.unwrap();
        svc.scan_part(&cap, t, "P2").await.unwrap();
        let err = svc.scan_part(&cap, t, "P2").await.unwrap_err();
        assert_eq!(
            err,
            ScanError::Rejected {
                reason: RejectReason::AlreadyScanned,
                progress: Progress { scanned: 2, required: 3 },
            }
        );
        let err = svc.scan_part(&cap, t, "ZZ").await.unwrap_err();
        assert!(matches!(err, ScanError::Rejected { reason: RejectReason::WrongPart, .. }));
        assert_eq!(svc.session(t).await.unwrap().state, ScanState::AwaitingNextPart);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_commit_keeps_session_for_retry() {
        let (svc, store) = service_with(vec![order("TRK-5", &["A1"])]).await;
        let cap = operator_cap();
        let t = svc.begin_scan(&cap, "TRK-5").await.unwrap().token;

        store.fail_dispatch.store(true, Ordering::SeqCst);
        let err = svc.scan_part(&cap, t, "A1").await.unwrap_err();
        assert!(matches!(err, ScanError::DispatchFailed { retryable: true, .. }));

        let view = svc.session(t).await.unwrap();
        assert_eq!(view.state, ScanState::AwaitingNextPart);
        assert!(view.ready_for_dispatch);

        // Further scans of the satisfied part are rejected, not re-counted.
        assert!(matches!(
            svc.scan_part(&cap, t, "A1").await.unwrap_err(),
            ScanError::Rejected { reason: RejectReason::AlreadyScanned, .. }
        ));

        store.fail_dispatch.store(false, Ordering::SeqCst);
        let report = svc.retry_dispatch(&cap, t).await.unwrap();
        assert!(report.dispatched);
        assert_eq!(svc.active_sessions(), 0);
    }

    #[tokio::test]
    async fn permanent_commit_failure_is_not_retryable() {
        let (svc, store) = service_with(vec![order("TRK-5C", &["A1"])]).await;
        let cap = operator_cap();
        let t = svc.begin_scan(&cap, "TRK-5C").await.unwrap().token;

        store.corrupt_dispatch.store(true, Ordering::SeqCst);
        let err = svc.scan_part(&cap, t, "A1").await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::DispatchFailed {
                retryable: false,
                source: OrderStoreError::Corrupt(_),
                ..
            }
        ));
        assert_eq!(svc.session(t).await.unwrap_err(), ScanError::UnknownSession(t));
        assert_eq!(svc.active_sessions(), 0);
    }

    #[tokio::test]
    async fn legacy_order_with_overflowing_quantity_is_reported_not_panicked() {
        let store = Arc::new(FlakyStore::default());
        let legacy = Order::from_record(OrderRecord {
            id: OrderId::new(AggregateId::new()),
            tracking_id: TrackingId::parse("TRK-OLD").unwrap(),
            customer_name: "Acme".to_string(),
            platform: None,
            entries: vec![
                Entry {
                    part_number_count: u32::MAX,
                    part_numbers: vec![PartNumber::parse("A").unwrap()],
                },
                Entry {
                    part_number_count: 1,
                    part_numbers: vec![PartNumber::parse("B").unwrap()],
                },
            ],
            status: OrderStatus::Pending,
            dispatched_at: None,
            created_at: Utc::now(),
            version: 1,
        })
        .unwrap();
        store.insert(legacy).await.unwrap();
        let svc = ScanService::new(store, Arc::new(DeclaredQuantities), Duration::from_secs(900));

        let err = svc.begin_scan(&operator_cap(), "TRK-OLD").await.unwrap_err();
        assert!(matches!(err, ScanError::Store(OrderStoreError::Corrupt(_))));
        assert_eq!(svc.active_sessions(), 0);
    }

    #[tokio::test]
    async fn retry_before_all_parts_is_refused() {
        let (svc, _) = service_with(vec![order("TRK-6", &["A1", "B1"])]).await;
        let cap = operator_cap();
        let t = svc.begin_scan(&cap, "TRK-6").await.unwrap().token;
        svc.scan_part(&cap, t, "A1").await.unwrap();
        assert!(matches!(
            svc.retry_dispatch(&cap, t).await.unwrap_err(),
            ScanError::NotReadyForDispatch { progress: Progress { scanned: 1, required: 2 } }
        ));
    }

    #[tokio::test]
    async fn racing_station_dispatch_is_reported_as_benign() {
        let (svc, store) = service_with(vec![order("TRK-7", &["A1"])]).await;
        let cap = operator_cap();
        let t = svc.begin_scan(&cap, "TRK-7").await.unwrap().token;

        let o = store
            .find_by_tracking_id(&TrackingId::parse("TRK-7").unwrap())
            .await
            .unwrap()
            .unwrap();
        store
            .update_status_to_dispatched_if_pending(o.id_typed(), Utc::now())
            .await
            .unwrap();

        let report = svc.scan_part(&cap, t, "A1").await.unwrap();
        assert!(report.dispatched && report.already_dispatched);
        assert!(report.message.contains("already dispatched"));
    }

    #[tokio::test]
    async fn vanished_order_discards_the_session() {
        let (svc, store) = service_with(vec![order("TRK-8", &["A1"])]).await;
        let cap = operator_cap();
        let begun = svc.begin_scan(&cap, "TRK-8").await.unwrap();
        store.delete(begun.order.order_id).await.unwrap();

        let err = svc.scan_part(&cap, begun.token, "A1").await.unwrap_err();
        assert!(matches!(err, ScanError::OrderVanished(_)));
        assert!(matches!(
            svc.session(begun.token).await.unwrap_err(),
            ScanError::UnknownSession(_)
        ));
    }

    #[tokio::test]
    async fn capability_must_be_for_scanning() {
        let (svc, _) = service_with(vec![order("TRK-9", &["A1"])]).await;
        let admin = Principal::from_roles(PrincipalId::new(), vec![Role::ADMIN]);
        let read_cap = authorize(&admin, &Permission::ORDERS_READ).unwrap();
        assert!(matches!(
            svc.begin_scan(&read_cap, "TRK-9").await.unwrap_err(),
            ScanError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn abandon_and_idle_eviction() {
        let (svc, store) =
            service_with(vec![order("TRK-10", &["A1"]), order("TRK-11", &["B1"])]).await;
        let cap = operator_cap();

        let a = svc.begin_scan(&cap, "TRK-10").await.unwrap().token;
        svc.abandon(a).await.unwrap();
        assert!(matches!(svc.abandon(a).await.unwrap_err(), ScanError::UnknownSession(_)));

        let b = svc.begin_scan(&cap, "TRK-11").await.unwrap().token;
        assert_eq!(svc.evict_idle(Utc::now()), 0);
        assert_eq!(svc.evict_idle(Utc::now() + chrono::Duration::seconds(901)), 1);
        assert!(matches!(
            svc.scan_part(&cap, b, "B1").await.unwrap_err(),
            ScanError::UnknownSession(_)
        ));
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scans_on_one_session_are_serialised() {
        let (svc, store) = service_with(vec![order("TRK-12", &["A1", "A1", "A1", "A1"])]).await;
        let svc = Arc::new(svc);
        let cap = operator_cap();
        let t = svc.begin_scan(&cap, "TRK-12").await.unwrap().token;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let svc = svc.clone();
                let cap = cap.clone();
                tokio::spawn(async move { svc.scan_part(&cap, t, "A1").await })
            })
            .collect();

        let mut accepted = 0;
        let mut dispatched = 0;
        for h in handles {
            if let Ok(report) = h.await.unwrap() {
                accepted += 1;
                if report.dispatched {
                    dispatched += 1;
                }
            }
        }
        assert_eq!(accepted, 4);
        assert_eq!(dispatched, 1);
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    }
}
