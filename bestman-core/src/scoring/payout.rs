// Payout distribution over ordered tie-groups.
//
// Slot-based rewards: the table lists point values for 1st place, 2nd
// place, and so on. A tie-group of size k occupies k consecutive slots and
// splits their summed value evenly (PGA-style), so a two-way tie for
// 2nd/3rd averages the 2nd- and 3rd-place values rather than both taking
// 2nd. Outputs are floating-point and never rounded; display layers may
// round for presentation only.

use std::collections::HashMap;

use super::rank::TieGroup;

/// A fixed ordered sequence of slot values, 1st-place slot first.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutTable {
    slots: Vec<f64>,
}

impl PayoutTable {
    pub fn new(slots: Vec<f64>) -> Self {
        PayoutTable { slots }
    }

    /// Number of paying slots in the table.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sum of every slot value, scaled by `multiplier`. Useful for
    /// conservation checks on fully-in-range distributions.
    pub fn total(&self, multiplier: f64) -> f64 {
        self.slots.iter().sum::<f64>() * multiplier
    }

    /// Map ordered tie-groups onto the table, returning participant ->
    /// awarded points.
    ///
    /// A running slot cursor starts at 0 (rank 1). Each group of size k
    /// occupies slots [cursor, cursor + k): the in-range slot values are
    /// summed (slots beyond the table's end contribute 0 but are still
    /// consumed), the sum is scaled by `multiplier`, divided by k, and
    /// assigned to every member. The cursor advances by k regardless of
    /// clamping, so a group starting past the table's end awards 0 to all
    /// of its members.
    pub fn distribute(&self, groups: &[TieGroup], multiplier: f64) -> HashMap<String, f64> {
        let mut awards: HashMap<String, f64> = HashMap::new();
        let mut cursor: usize = 0;

        for group in groups {
            let size = group.members.len();
            if size == 0 {
                continue;
            }

            let end = (cursor + size).min(self.slots.len());
            let slot_sum: f64 = if cursor < self.slots.len() {
                self.slots[cursor..end].iter().sum()
            } else {
                0.0
            };
            let share = slot_sum * multiplier / size as f64;

            for member in &group.members {
                awards.insert(member.clone(), share);
            }
            cursor += size;
        }

        awards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(score: f64, members: &[&str]) -> TieGroup {
        TieGroup {
            score,
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn distinct_scores_take_slots_in_order() {
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0]);
        let groups = vec![group(9.0, &["a"]), group(7.0, &["b"]), group(5.0, &["c"])];

        let awards = table.distribute(&groups, 1.0);
        assert_eq!(awards["a"], 15.0);
        assert_eq!(awards["b"], 12.0);
        assert_eq!(awards["c"], 10.0);
    }

    // A 2-way tie at slots 2/3 splits those two values evenly.
    #[test]
    fn two_way_tie_averages_consumed_slots() {
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0, 8.0]);
        let groups = vec![group(9.0, &["a"]), group(7.0, &["b", "c"]), group(5.0, &["d"])];

        let awards = table.distribute(&groups, 1.0);
        assert_eq!(awards["a"], 15.0);
        assert_eq!(awards["b"], 11.0); // (12 + 10) / 2
        assert_eq!(awards["c"], 11.0);
        assert_eq!(awards["d"], 8.0); // tie consumed slots 2 and 3
    }

    // With all groups in range, awarded points sum to the table sum.
    #[test]
    fn conservation_within_table_range() {
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0, 8.0, 7.0]);
        let groups = vec![
            group(9.0, &["a", "b"]),
            group(7.0, &["c"]),
            group(5.0, &["d", "e"]),
        ];

        let awards = table.distribute(&groups, 1.0);
        let total: f64 = awards.values().sum();
        assert!((total - table.total(1.0)).abs() < 1e-9);
    }

    // Beyond-table groups award 0; straddling groups sum in-range only.
    #[test]
    fn group_past_table_end_awards_zero() {
        let table = PayoutTable::new(vec![15.0, 12.0]);
        let groups = vec![
            group(9.0, &["a"]),
            group(7.0, &["b"]),
            group(5.0, &["c", "d"]),
        ];

        let awards = table.distribute(&groups, 1.0);
        assert_eq!(awards["c"], 0.0);
        assert_eq!(awards["d"], 0.0);
    }

    #[test]
    fn straddling_group_sums_in_range_slots_only() {
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0]);
        // Group of 3 starting at slot 1: slots 1, 2 pay; slot 3 is past the end.
        let groups = vec![group(9.0, &["a"]), group(7.0, &["b", "c", "d"])];

        let awards = table.distribute(&groups, 1.0);
        let share = (12.0 + 10.0) / 3.0;
        assert!((awards["b"] - share).abs() < 1e-9);
        assert!((awards["c"] - share).abs() < 1e-9);
        assert!((awards["d"] - share).abs() < 1e-9);
    }

    #[test]
    fn cursor_advances_past_clamped_group() {
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0]);
        // Group of 4 consumes slots 0-3 (slot 3 pays nothing); the next
        // group starts beyond the table and gets zero.
        let groups = vec![group(9.0, &["a", "b", "c", "d"]), group(7.0, &["e"])];

        let awards = table.distribute(&groups, 1.0);
        let share = (15.0 + 12.0 + 10.0) / 4.0;
        assert!((awards["a"] - share).abs() < 1e-9);
        assert_eq!(awards["e"], 0.0);
    }

    // Two-way tie for first over [15,12,10]: 13.5 / 13.5 / 10.
    #[test]
    fn scenario_two_way_tie_for_first() {
        use crate::scoring::rank::{rank_groups, Direction};
        let scores: HashMap<String, f64> = [("a", 10.0), ("b", 10.0), ("c", 8.0)]
            .iter()
            .map(|(id, s)| (id.to_string(), *s))
            .collect();

        let groups = rank_groups(&scores, Direction::HigherIsBetter);
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0]);
        let awards = table.distribute(&groups, 1.0);

        assert_eq!(awards["a"], 13.5); // (15 + 12) / 2
        assert_eq!(awards["b"], 13.5);
        assert_eq!(awards["c"], 10.0);
    }

    // Same tie with multiplier 2: 27 / 27 / 20.
    #[test]
    fn scenario_multiplier_scales_whole_table() {
        use crate::scoring::rank::{rank_groups, Direction};
        let scores: HashMap<String, f64> = [("a", 10.0), ("b", 10.0), ("c", 8.0)]
            .iter()
            .map(|(id, s)| (id.to_string(), *s))
            .collect();

        let groups = rank_groups(&scores, Direction::HigherIsBetter);
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0]);
        let awards = table.distribute(&groups, 2.0);

        assert_eq!(awards["a"], 27.0);
        assert_eq!(awards["b"], 27.0);
        assert_eq!(awards["c"], 20.0);
    }

    #[test]
    fn non_integer_averages_are_not_rounded() {
        let table = PayoutTable::new(vec![15.0, 12.0, 10.0]);
        let groups = vec![group(9.0, &["a", "b", "c"])];

        let awards = table.distribute(&groups, 1.0);
        let share = 37.0 / 3.0;
        assert!((awards["a"] - share).abs() < 1e-12);
    }

    #[test]
    fn empty_groups_yield_empty_awards() {
        let table = PayoutTable::new(vec![15.0, 12.0]);
        let awards = table.distribute(&[], 1.0);
        assert!(awards.is_empty());
    }
}
