//! Scan session state machine.
//!
//! `AwaitingTrackingId → AwaitingNextPart → Complete`. The session itself is
//! synchronous and does no IO: the caller looks the order up, hands it to
//! [`ScanSession::bind_order`], feeds scans through [`ScanSession::scan`] and,
//! once a scan reports [`ScanStep::ReadyForDispatch`], commits the dispatch and
//! reports the result back with [`ScanSession::complete`].

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use shipcheck_orders::{ExpectedParts, ExpectedPartsSource, Order, PartNumber, TrackingId};

use crate::matcher::{self, MatchOutcome, Progress, RejectReason, ScannedCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    AwaitingTrackingId,
    AwaitingNextPart,
    Complete,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is {actual:?}, expected {expected:?}")]
    InvalidState { expected: ScanState, actual: ScanState },

    #[error("enter a part number")]
    EmptyPartNumber,

    #[error("order {0} is already dispatched")]
    AlreadyDispatched(TrackingId),

    #[error("order {0} has no parts to verify")]
    NothingToVerify(TrackingId),

    #[error("parts for order {tracking_id} cannot be verified: {reason}")]
    UnverifiableOrder { tracking_id: TrackingId, reason: String },

    #[error("not every part has been scanned yet")]
    NotReadyForDispatch,
}

/// What one scan did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Counted; more parts are still expected.
    Accepted(Progress),
    /// Counted and every expected part is now scanned; dispatch may be committed.
    ReadyForDispatch(Progress),
    /// Not counted; session unchanged.
    Rejected { reason: RejectReason, progress: Progress },
}

/// Ephemeral per-operator verification state for one order.
#[derive(Debug, Clone)]
pub struct ScanSession {
    derivation: Arc<dyn ExpectedPartsSource>,
    order: Option<Order>,
    expected: ExpectedParts,
    scanned: ScannedCounts,
    state: ScanState,
}

impl ScanSession {
    pub fn new(derivation: Arc<dyn ExpectedPartsSource>) -> Self {
        Self {
            derivation,
            order: None,
            expected: ExpectedParts::new(),
            scanned: ScannedCounts::new(),
            state: ScanState::AwaitingTrackingId,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn scanned(&self) -> &ScannedCounts {
        &self.scanned
    }

    /// Expected multiset for the bound order (empty before a tracking id is confirmed).
    pub fn expected(&self) -> &ExpectedParts {
        &self.expected
    }

    pub fn progress(&self) -> Progress {
        Progress::of(&self.expected, &self.scanned)
    }

    /// All parts scanned, dispatch not yet committed.
    pub fn is_ready_for_dispatch(&self) -> bool {
        self.state == ScanState::AwaitingNextPart
            && self.order.is_some()
            && self.progress().is_complete()
    }

    fn ensure_state(&self, expected: ScanState) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Confirm the order found for the operator's tracking id.
    ///
    /// On error the session stays in `AwaitingTrackingId` with nothing bound.
    pub fn bind_order(&mut self, order: Order) -> Result<Progress, SessionError> {
        self.ensure_state(ScanState::AwaitingTrackingId)?;

        if order.status().is_past_dispatch() {
            return Err(SessionError::AlreadyDispatched(order.tracking_id().clone()));
        }

        let expected = self.derivation.expected_parts(&order).map_err(|e| {
            SessionError::UnverifiableOrder {
                tracking_id: order.tracking_id().clone(),
                reason: e.to_string(),
            }
        })?;
        if expected.is_empty() {
            return Err(SessionError::NothingToVerify(order.tracking_id().clone()));
        }

        self.order = Some(order);
        self.expected = expected;
        self.scanned.clear();
        self.state = ScanState::AwaitingNextPart;

        Ok(self.progress())
    }

    /// Evaluate one scanned part number.
    pub fn scan(&mut self, raw: &str) -> Result<ScanStep, SessionError> {
        self.ensure_state(ScanState::AwaitingNextPart)?;

        let part = PartNumber::parse(raw).map_err(|_| SessionError::EmptyPartNumber)?;
        let step = match matcher::evaluate(&self.expected, &mut self.scanned, &part) {
            MatchOutcome::Accepted { all_satisfied } => {
                let progress = self.progress();
                if all_satisfied {
                    ScanStep::ReadyForDispatch(progress)
                } else {
                    ScanStep::Accepted(progress)
                }
            }
            MatchOutcome::AlreadySatisfiedOrUnknown(reason) => ScanStep::Rejected {
                reason,
                progress: self.progress(),
            },
        };

        Ok(step)
    }

    /// Record a committed dispatch and finish the session.
    pub fn complete(&mut self, dispatched: Order) -> Result<(), SessionError> {
        if !self.is_ready_for_dispatch() {
            return Err(SessionError::NotReadyForDispatch);
        }
        self.order = Some(dispatched);
        self.state = ScanState::Complete;
        Ok(())
    }

    /// Abandon the current order and go back to waiting for a tracking id.
    pub fn reset(&mut self) {
        self.order = None;
        self.expected = ExpectedParts::new();
        self.scanned.clear();
        self.state = ScanState::AwaitingTrackingId;
    }
}
