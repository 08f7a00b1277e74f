//! Scan verification domain: part multiset matcher and scan session state machine.
//!
//! Pure, synchronous logic. Order lookup and the dispatch commit happen in
//! `shipcheck-infra`; this crate only decides what a scan means.

pub mod matcher;
pub mod session;

pub use matcher::{evaluate, is_satisfied, MatchOutcome, Progress, RejectReason, ScannedCounts};
pub use session::{ScanSession, ScanState, ScanStep, SessionError};
