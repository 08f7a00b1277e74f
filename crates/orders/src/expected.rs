//! Expected part multiset: what a scan session must see before an order may ship.
//!
//! The multiset is derived on demand from the stored order. How it is derived
//! depends on the shape the order was stored in, so derivation sits behind
//! [`ExpectedPartsSource`] and the active implementation is chosen by config.

use std::collections::BTreeMap;
use std::sync::Arc;

use shipcheck_core::{DomainError, DomainResult};

use crate::identifiers::PartNumber;
use crate::order::{Entry, Order};

/// Part number → required copies. Iteration order is by part number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedParts {
    required: BTreeMap<PartNumber, u32>,
    total: u32,
}

impl ExpectedParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `copies` more of `part`.
    ///
    /// Fails without touching the multiset when a count would overflow `u32`.
    pub fn add(&mut self, part: PartNumber, copies: u32) -> DomainResult<()> {
        if copies == 0 {
            return Ok(());
        }
        let overflow = || {
            DomainError::invariant(format!("required count for part '{part}' overflows"))
        };
        let total = self.total.checked_add(copies).ok_or_else(overflow)?;
        let current = self.required(&part);
        let required = current.checked_add(copies).ok_or_else(overflow)?;

        self.required.insert(part, required);
        self.total = total;
        Ok(())
    }

    /// Copies of `part` required; 0 when the part is not on the order.
    pub fn required(&self, part: &PartNumber) -> u32 {
        self.required.get(part).copied().unwrap_or(0)
    }

    /// Sum of all required copies.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PartNumber, u32)> {
        self.required.iter().map(|(p, n)| (p, *n))
    }
}

impl FromIterator<PartNumber> for ExpectedParts {
    /// One copy per item. Counts saturate at `u32::MAX`.
    fn from_iter<I: IntoIterator<Item = PartNumber>>(iter: I) -> Self {
        let mut parts = ExpectedParts::new();
        for p in iter {
            let n = parts.required.entry(p).or_insert(0);
            *n = n.saturating_add(1);
            parts.total = parts.total.saturating_add(1);
        }
        parts
    }
}

/// Derives the expected multiset for an order.
///
/// Errors mean the stored order cannot be verified (e.g. declared quantities
/// that overflow a count); they are never panics.
pub trait ExpectedPartsSource: Send + Sync + core::fmt::Debug {
    fn expected_parts(&self, order: &Order) -> DomainResult<ExpectedParts>;
}

impl<S> ExpectedPartsSource for Arc<S>
where
    S: ExpectedPartsSource + ?Sized,
{
    fn expected_parts(&self, order: &Order) -> DomainResult<ExpectedParts> {
        (**self).expected_parts(order)
    }
}

fn warn_if_inconsistent(order: &Order, idx: usize, entry: &Entry) {
    if !entry.is_consistent() {
        tracing::warn!(
            order_id = %order.id_typed(),
            entry = idx,
            declared = entry.part_number_count,
            listed = entry.part_numbers.len(),
            "entry part count does not match its part numbers; using listed part numbers"
        );
    }
}

/// Nested `entries[].partNumbers[]` shape: every listed part number counts once.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenEntries;

impl ExpectedPartsSource for FlattenEntries {
    fn expected_parts(&self, order: &Order) -> DomainResult<ExpectedParts> {
        let mut parts = ExpectedParts::new();
        for (idx, entry) in order.entries().iter().enumerate() {
            warn_if_inconsistent(order, idx, entry);
            for p in &entry.part_numbers {
                parts.add(p.clone(), 1)?;
            }
        }
        Ok(parts)
    }
}

/// Legacy flat `partNumber`/`quantity` shape.
///
/// Flat records load as one entry holding a single part number with
/// `part_number_count = quantity`. An entry whose part numbers are all the same
/// therefore requires `part_number_count` copies; other entries flatten as usual.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredQuantities;

impl ExpectedPartsSource for DeclaredQuantities {
    fn expected_parts(&self, order: &Order) -> DomainResult<ExpectedParts> {
        let mut parts = ExpectedParts::new();
        for (idx, entry) in order.entries().iter().enumerate() {
            match entry.part_numbers.split_first() {
                Some((first, rest)) if rest.iter().all(|p| p == first) => {
                    parts.add(first.clone(), entry.part_number_count).map_err(|e| {
                        tracing::warn!(
                            order_id = %order.id_typed(),
                            entry = idx,
                            declared = entry.part_number_count,
                            "declared quantity cannot be verified"
                        );
                        e
                    })?;
                }
                _ => {
                    warn_if_inconsistent(order, idx, entry);
                    for p in &entry.part_numbers {
                        parts.add(p.clone(), 1)?;
                    }
                }
            }
        }
        Ok(parts)
    }
}

/// Storage schema an order set was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartsSchema {
    #[default]
    Entries,
    LegacyFlat,
}

impl PartsSchema {
    pub fn source(self) -> Arc<dyn ExpectedPartsSource> {
        match self {
            PartsSchema::Entries => Arc::new(FlattenEntries),
            PartsSchema::LegacyFlat => Arc::new(DeclaredQuantities),
        }
    }
}

impl core::str::FromStr for PartsSchema {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entries" => Ok(PartsSchema::Entries),
            "legacy-flat" | "legacy_flat" | "flat" => Ok(PartsSchema::LegacyFlat),
            other => Err(DomainError::validation(format!(
                "unknown parts schema '{other}' (expected 'entries' or 'legacy-flat')"
            ))),
        }
    }
}
