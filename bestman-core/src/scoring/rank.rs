// Tie-group ranking: partition (participant, score) pairs into ordered
// groups of equal score.
//
// Grouping only, not intra-group ranking: every member of a group shares
// the group's rank. Payout averaging across the slots a group occupies is
// handled by the payout engine.

use std::collections::HashMap;

/// Sort direction for a scoring context. Golf-style challenges rank a lower
/// score first; tally-style challenges rank a higher score first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    /// Returns `true` if `candidate` ranks strictly ahead of `baseline`
    /// under this direction. Equal scores are never "better".
    pub fn beats(&self, candidate: f64, baseline: f64) -> bool {
        match self {
            Direction::HigherIsBetter => candidate > baseline,
            Direction::LowerIsBetter => candidate < baseline,
        }
    }
}

/// One ordered partition of equal-score participants. Groups are emitted
/// best-first; members within a group are sorted by id for deterministic
/// output, but carry no rank distinction among themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct TieGroup {
    /// The score shared by every member of the group.
    pub score: f64,
    /// Participant ids, sorted ascending.
    pub members: Vec<String>,
}

/// Partition a score map into ordered tie-groups.
///
/// Entries are sorted by score per `direction` with participant id as a
/// deterministic secondary key, then consecutive equal scores are
/// accumulated into the current group. Empty input yields empty output;
/// all-equal scores yield a single group containing everyone.
pub fn rank_groups(scores: &HashMap<String, f64>, direction: Direction) -> Vec<TieGroup> {
    let mut entries: Vec<(&str, f64)> = scores.iter().map(|(id, &s)| (id.as_str(), s)).collect();

    entries.sort_by(|a, b| {
        let score_order = match direction {
            Direction::HigherIsBetter => b.1.partial_cmp(&a.1),
            Direction::LowerIsBetter => a.1.partial_cmp(&b.1),
        }
        .unwrap_or(std::cmp::Ordering::Equal);
        score_order.then_with(|| a.0.cmp(b.0))
    });

    let mut groups: Vec<TieGroup> = Vec::new();
    for (id, score) in entries {
        match groups.last_mut() {
            Some(group) if group.score == score => group.members.push(id.to_string()),
            _ => groups.push(TieGroup {
                score,
                members: vec![id.to_string()],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let groups = rank_groups(&HashMap::new(), Direction::HigherIsBetter);
        assert!(groups.is_empty());
    }

    #[test]
    fn single_participant_single_group() {
        let groups = rank_groups(&scores(&[("a", 5.0)]), Direction::HigherIsBetter);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].score, 5.0);
        assert_eq!(groups[0].members, vec!["a"]);
    }

    #[test]
    fn all_equal_scores_one_group() {
        let groups = rank_groups(
            &scores(&[("c", 3.0), ("a", 3.0), ("b", 3.0)]),
            Direction::HigherIsBetter,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec!["a", "b", "c"]);
    }

    #[test]
    fn higher_is_better_orders_descending() {
        let groups = rank_groups(
            &scores(&[("a", 10.0), ("b", 10.0), ("c", 8.0)]),
            Direction::HigherIsBetter,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec!["a", "b"]);
        assert_eq!(groups[1].members, vec!["c"]);
    }

    #[test]
    fn lower_is_better_orders_ascending() {
        let groups = rank_groups(
            &scores(&[("a", 72.0), ("b", 68.0), ("c", 72.0)]),
            Direction::LowerIsBetter,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec!["b"]);
        assert_eq!(groups[1].members, vec!["a", "c"]);
    }

    // Groups partition the input set and strictly descend.
    #[test]
    fn groups_partition_the_input() {
        let input = scores(&[
            ("a", 4.0),
            ("b", 2.0),
            ("c", 4.0),
            ("d", 9.0),
            ("e", 2.0),
            ("f", 7.0),
        ]);
        let groups = rank_groups(&input, Direction::HigherIsBetter);

        let mut seen: Vec<String> = Vec::new();
        let mut last_score = f64::INFINITY;
        for group in &groups {
            assert!(group.score < last_score, "groups must strictly descend");
            last_score = group.score;
            for m in &group.members {
                assert!(!seen.contains(m), "participant appears in two groups");
                seen.push(m.clone());
            }
        }
        assert_eq!(seen.len(), input.len());
        for id in input.keys() {
            assert!(seen.contains(id));
        }
    }

    #[test]
    fn beats_is_strict() {
        assert!(Direction::HigherIsBetter.beats(9.0, 7.0));
        assert!(!Direction::HigherIsBetter.beats(7.0, 7.0));
        assert!(Direction::LowerIsBetter.beats(68.0, 70.0));
        assert!(!Direction::LowerIsBetter.beats(70.0, 70.0));
    }
}
