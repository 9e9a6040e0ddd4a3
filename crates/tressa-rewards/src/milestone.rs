// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Milestone crossing detection.
//!
//! Pure functions over `(old, new)` progress values. The issuance service
//! feeds them the before/after pair from a single ledger upsert, so the
//! result is exact even when one booking jumps several cycles at once.

/// How a milestone fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Fires once, when progress first reaches `threshold`.
    OneTime { threshold: i64 },
    /// Fires every time progress completes another `cycle` units.
    Repeating { cycle: i64 },
}

impl Rule {
    /// How many times this rule fires when progress moves from `old` to `new`.
    ///
    /// One-time: 1 iff `old < threshold <= new`.
    /// Repeating: `floor(new / cycle) - floor(old / cycle)`, one per completed cycle.
    /// A non-positive cycle never fires; progress that does not move forward never fires.
    pub fn crossings(&self, old: i64, new: i64) -> u64 {
        if new <= old {
            return 0;
        }
        match *self {
            Rule::OneTime { threshold } => u64::from(old < threshold && threshold <= new),
            Rule::Repeating { cycle } if cycle > 0 => {
                let completed = new.div_euclid(cycle) - old.div_euclid(cycle);
                u64::try_from(completed).unwrap_or(0)
            }
            Rule::Repeating { .. } => 0,
        }
    }

    /// Units still needed from `value` until the rule next fires, if it ever will.
    pub fn remaining(&self, value: i64) -> Option<i64> {
        match *self {
            Rule::OneTime { threshold } if value < threshold => Some(threshold - value),
            Rule::OneTime { .. } => None,
            Rule::Repeating { cycle } if cycle > 0 => Some(cycle - value.rem_euclid(cycle)),
            Rule::Repeating { .. } => None,
        }
    }
}

/// A rule that fired during one ledger transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    /// Position of the rule in the track's milestone list.
    pub index: usize,
    /// Number of grants owed: always 1 for one-time rules.
    pub times: u64,
}

/// Evaluate every rule against one transition, in list order.
pub fn evaluate<I>(old: i64, new: i64, rules: I) -> Vec<Crossing>
where
    I: IntoIterator<Item = Rule>,
{
    rules
        .into_iter()
        .enumerate()
        .filter_map(|(index, rule)| {
            let times = rule.crossings(old, new);
            (times > 0).then_some(Crossing { index, times })
        })
        .collect()
}

/// The ledger watermark for a track at `value`.
///
/// A track has one watermark meaning. With a repeating milestone it is the
/// completed cycle count of the first repeating rule in list order;
/// otherwise it is the highest one-time threshold reached (0 if none).
pub fn watermark<I>(value: i64, rules: I) -> i64
where
    I: IntoIterator<Item = Rule>,
{
    let mut highest_threshold = 0;
    for rule in rules {
        match rule {
            Rule::Repeating { cycle } if cycle > 0 => return value.div_euclid(cycle),
            Rule::OneTime { threshold } if threshold <= value => {
                highest_threshold = highest_threshold.max(threshold);
            }
            _ => {}
        }
    }
    highest_threshold
}

/// Smallest distance to the next firing across `rules`.
pub fn next_distance<I>(value: i64, rules: I) -> Option<(usize, i64)>
where
    I: IntoIterator<Item = Rule>,
{
    rules
        .into_iter()
        .enumerate()
        .filter_map(|(index, rule)| rule.remaining(value).map(|d| (index, d)))
        .min_by_key(|&(_, distance)| distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_time_fires_only_on_the_crossing_step() {
        let rule = Rule::OneTime { threshold: 5 };
        assert_eq!(rule.crossings(3, 4), 0);
        assert_eq!(rule.crossings(4, 5), 1);
        assert_eq!(rule.crossings(5, 6), 0);
        assert_eq!(rule.crossings(0, 100), 1);
    }

    #[test]
    fn repeating_counts_every_completed_cycle() {
        let rule = Rule::Repeating { cycle: 5 };
        assert_eq!(rule.crossings(4, 5), 1);
        assert_eq!(rule.crossings(5, 9), 0);
        assert_eq!(rule.crossings(3, 13), 2);
        assert_eq!(rule.crossings(0, 1000), 200);
    }

    #[test]
    fn spend_threshold_scenario() {
        let rule = Rule::Repeating { cycle: 1000 };
        assert_eq!(rule.crossings(0, 600), 0);
        assert_eq!(rule.crossings(600, 1200), 1);
    }

    #[test]
    fn backwards_or_flat_never_fires() {
        assert_eq!(Rule::Repeating { cycle: 5 }.crossings(10, 10), 0);
        assert_eq!(Rule::OneTime { threshold: 5 }.crossings(10, 0), 0);
        assert_eq!(Rule::Repeating { cycle: 0 }.crossings(0, 10), 0);
    }

    #[test]
    fn evaluate_reports_index_and_times() {
        let rules = [
            Rule::OneTime { threshold: 3 },
            Rule::Repeating { cycle: 5 },
            Rule::OneTime { threshold: 50 },
        ];
        let crossed = evaluate(2, 11, rules);
        assert_eq!(
            crossed,
            vec![
                Crossing { index: 0, times: 1 },
                Crossing { index: 1, times: 2 },
            ]
        );
    }

    #[test]
    fn watermark_has_one_meaning_per_track() {
        let mixed = [
            Rule::OneTime { threshold: 3 },
            Rule::Repeating { cycle: 5 },
        ];
        assert_eq!(watermark(11, mixed), 2, "cycle count wins on a mixed track");
        assert_eq!(watermark(2, mixed), 0);

        let one_time = [Rule::OneTime { threshold: 3 }, Rule::OneTime { threshold: 10 }];
        assert_eq!(watermark(2, one_time), 0);
        assert_eq!(watermark(11, one_time), 10);
        assert_eq!(watermark(11, std::iter::empty::<Rule>()), 0);
    }

    #[test]
    fn next_distance_picks_nearest_rule() {
        let rules = [Rule::OneTime { threshold: 3 }, Rule::Repeating { cycle: 5 }];
        assert_eq!(next_distance(1, rules), Some((0, 2)));
        assert_eq!(next_distance(4, rules), Some((1, 1)));
        assert_eq!(next_distance(5, rules), Some((1, 5)));
        assert_eq!(next_distance(7, [Rule::OneTime { threshold: 3 }]), None);
    }

    proptest! {
        #[test]
        fn repeating_is_additive_across_splits(
            a in 0i64..10_000,
            step1 in 0i64..5_000,
            step2 in 0i64..5_000,
            cycle in 1i64..500,
        ) {
            let rule = Rule::Repeating { cycle };
            let b = a + step1;
            let c = b + step2;
            prop_assert_eq!(rule.crossings(a, c), rule.crossings(a, b) + rule.crossings(b, c));
        }

        #[test]
        fn one_time_fires_at_most_once_over_any_path(
            steps in proptest::collection::vec(0i64..50, 1..40),
            threshold in 1i64..500,
        ) {
            let rule = Rule::OneTime { threshold };
            let mut value = 0;
            let mut fired = 0;
            for step in steps {
                fired += rule.crossings(value, value + step);
                value += step;
            }
            prop_assert_eq!(fired, u64::from(value >= threshold));
        }

        #[test]
        fn repeating_total_matches_final_cycle_count(
            steps in proptest::collection::vec(0i64..300, 1..40),
            cycle in 1i64..200,
        ) {
            let rule = Rule::Repeating { cycle };
            let mut value = 0;
            let mut fired = 0;
            for step in steps {
                fired += rule.crossings(value, value + step);
                value += step;
            }
            prop_assert_eq!(fired, (value / cycle) as u64);
        }
    }
}
