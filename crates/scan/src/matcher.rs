//! Part multiset matcher.
//!
//! Matching is by count, not by set membership: a part required twice must be
//! scanned twice, and a third scan of it is rejected exactly like a part that
//! is not on the order at all.

use std::collections::BTreeMap;

use serde::Serialize;

use shipcheck_orders::{ExpectedParts, PartNumber};

/// Part number → copies accepted so far in one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedCounts {
    counts: BTreeMap<PartNumber, u32>,
    total: u32,
}

impl ScannedCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, part: &PartNumber) -> u32 {
        self.counts.get(part).copied().unwrap_or(0)
    }

    /// Accepted scans across all part numbers.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PartNumber, u32)> {
        self.counts.iter().map(|(p, n)| (p, *n))
    }

    pub(crate) fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
    }

    fn increment(&mut self, part: &PartNumber) {
        *self.counts.entry(part.clone()).or_insert(0) += 1;
        self.total += 1;
    }
}

/// `scanned` of `required` parts verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub scanned: u32,
    pub required: u32,
}

impl Progress {
    pub fn of(expected: &ExpectedParts, scanned: &ScannedCounts) -> Self {
        Self {
            scanned: scanned.total(),
            required: expected.total(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.scanned >= self.required
    }
}

/// Why a scan was turned away.
///
/// Both reasons leave the session untouched; they only differ in what the
/// operator is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The part number is not on this order.
    WrongPart,
    /// Every required copy of this part number has already been scanned.
    AlreadyScanned,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::WrongPart => "wrong_part",
            RejectReason::AlreadyScanned => "already_scanned",
        }
    }

    pub fn operator_message(self) -> &'static str {
        match self {
            RejectReason::WrongPart => "Wrong part number. Please scan again.",
            RejectReason::AlreadyScanned => {
                "This part number has already been scanned. Scan the next part."
            }
        }
    }
}

/// Result of evaluating one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Counted. `all_satisfied` is set when this scan filled the last open slot.
    Accepted { all_satisfied: bool },
    /// Not counted; see [`RejectReason`].
    AlreadySatisfiedOrUnknown(RejectReason),
}

/// Evaluate `part` against `expected`, counting it into `scanned` if a slot is open.
pub fn evaluate(
    expected: &ExpectedParts,
    scanned: &mut ScannedCounts,
    part: &PartNumber,
) -> MatchOutcome {
    let need = expected.required(part);
    let have = scanned.get(part);

    if have >= need {
        let reason = if need == 0 {
            RejectReason::WrongPart
        } else {
            RejectReason::AlreadyScanned
        };
        return MatchOutcome::AlreadySatisfiedOrUnknown(reason);
    }

    scanned.increment(part);

    MatchOutcome::Accepted {
        all_satisfied: is_satisfied(expected, scanned),
    }
}

/// `true` when every expected part has been scanned at least as often as required.
pub fn is_satisfied(expected: &ExpectedParts, scanned: &ScannedCounts) -> bool {
    expected.iter().all(|(p, need)| scanned.get(p) >= need)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn expected(ids: &[&str]) -> ExpectedParts {
        ids.iter().map(|s| part(s)).collect()
    }

    #[test]
    fn duplicate_part_must_be_scanned_twice() {
        let exp = expected(&["A1", "A1"]);
        let mut scanned = ScannedCounts::new();

        assert_eq!(
            evaluate(&exp, &mut scanned, &part("A1")),
            MatchOutcome::Accepted { all_satisfied: false }
        );
        assert_eq!(
            evaluate(&exp, &mut scanned, &part("A1")),
            MatchOutcome::Accepted { all_satisfied: true }
        );
        assert_eq!(
            evaluate(&exp, &mut scanned, &part("A1")),
            MatchOutcome::AlreadySatisfiedOrUnknown(RejectReason::AlreadyScanned)
        );
        assert_eq!(scanned.get(&part("A1")), 2);
    }

    #[test]
    fn unknown_part_is_rejected_without_counting() {
        let exp = expected(&["P1"]);
        let mut scanned = ScannedCounts::new();
        let before = scanned.clone();

        assert_eq!(
            evaluate(&exp, &mut scanned, &part("ZZ")),
            MatchOutcome::AlreadySatisfiedOrUnknown(RejectReason::WrongPart)
        );
        assert_eq!(scanned, before);
    }

    #[test]
    fn second_copy_of_single_part_is_rejected() {
        // {P1: 2, P2: 1}: [P1, P2, P2] must never complete.
        let exp = expected(&["P1", "P1", "P2"]);
        let mut scanned = ScannedCounts::new();
        evaluate(&exp, &mut scanned, &part("P1"));
        evaluate(&exp, &mut scanned, &part("P2"));
        assert_eq!(
            evaluate(&exp, &mut scanned, &part("P2")),
            MatchOutcome::AlreadySatisfiedOrUnknown(RejectReason::AlreadyScanned)
        );
        assert!(!is_satisfied(&exp, &scanned));
        assert_eq!(Progress::of(&exp, &scanned), Progress { scanned: 2, required: 3 });
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn order_parts() -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec("[A-D][0-9]", 1..12)
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Any permutation of the expected multiset completes in exactly Σ scans.
            #[test]
            fn any_permutation_completes_in_exactly_total_scans(
                (ids, perm) in order_parts().prop_flat_map(|ids| {
                    let n = ids.len();
                    (Just(ids), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
                })
            ) {
                let exp: ExpectedParts = ids.iter().map(|s| part(s)).collect();
                let mut scanned = ScannedCounts::new();
                let mut completions = 0;

                for (i, idx) in perm.iter().enumerate() {
                    match evaluate(&exp, &mut scanned, &part(&ids[*idx])) {
                        MatchOutcome::Accepted { all_satisfied } => {
                            prop_assert_eq!(all_satisfied, i + 1 == ids.len());
                            if all_satisfied {
                                completions += 1;
                            }
                        }
                        other => prop_assert!(false, "unexpected rejection {:?}", other),
                    }
                }

                prop_assert_eq!(completions, 1);
                prop_assert_eq!(scanned.total(), exp.total());
            }

            /// A rejected scan never changes the counts.
            #[test]
            fn rejections_leave_counts_unchanged(
                ids in order_parts(),
                scans in prop::collection::vec("[A-F][0-9]", 0..30)
            ) {
                let exp: ExpectedParts = ids.iter().map(|s| part(s)).collect();
                let mut scanned = ScannedCounts::new();

                for s in &scans {
                    let before = scanned.clone();
                    let p = part(s);
                    match evaluate(&exp, &mut scanned, &p) {
                        MatchOutcome::AlreadySatisfiedOrUnknown(_) => {
                            prop_assert_eq!(&scanned, &before);
                        }
                        MatchOutcome::Accepted { .. } => {
                            prop_assert_eq!(scanned.get(&p), before.get(&p) + 1);
                        }
                    }
                    prop_assert!(scanned.get(&p) <= exp.required(&p));
                }
            }
        }
    }
}
