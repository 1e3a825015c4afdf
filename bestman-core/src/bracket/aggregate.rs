// Bracket leaderboard aggregation.
//
// Pure computation over one snapshot of matchups, picks, and futures
// picks: no state is carried between invocations, so a listener can
// recompute the whole leaderboard on every pushed update.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::config::BracketConfig;
use crate::roster::Lane;
use crate::store::decode_doc;

use super::matchup::{FuturesPick, Matchup, Pick};

/// Normalize a side identifier before equality comparison: trimmed,
/// lowercased, inner whitespace collapsed. Defends against inconsistent
/// upstream data entry ("FC Dragons " vs "fc dragons").
pub fn normalize_id(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Everything one leaderboard computation reads, assembled from the
/// store's per-path document maps.
#[derive(Debug, Clone, Default)]
pub struct BracketSnapshot {
    pub matchups: BTreeMap<String, Matchup>,
    pub picks: Vec<Pick>,
    pub futures: Vec<FuturesPick>,
    /// Participant id -> display name; ids without an entry display as
    /// themselves.
    pub display_names: HashMap<String, String>,
}

impl BracketSnapshot {
    /// Assemble a snapshot from raw document maps: the matchup collection,
    /// one pick collection per round (an explicit fold over a fixed set of
    /// round snapshots, so assembly order cannot change the result), and
    /// the futures collection. Malformed documents are logged and skipped.
    pub fn assemble(
        matchup_docs: &BTreeMap<String, Value>,
        round_pick_docs: &[(String, BTreeMap<String, Value>)],
        futures_docs: &BTreeMap<String, Value>,
        display_names: HashMap<String, String>,
    ) -> Self {
        let mut snapshot = BracketSnapshot {
            display_names,
            ..Default::default()
        };

        for (id, doc) in matchup_docs {
            if let Some(matchup) = decode_doc::<Matchup>("matchups", id, doc) {
                snapshot.matchups.insert(id.clone(), matchup);
            }
        }
        for (path, docs) in round_pick_docs {
            for (id, doc) in docs {
                if let Some(pick) = decode_doc::<Pick>(path, id, doc) {
                    snapshot.picks.push(pick);
                }
            }
        }
        for (id, doc) in futures_docs {
            if let Some(pick) = decode_doc::<FuturesPick>("futures", id, doc) {
                snapshot.futures.push(pick);
            }
        }

        snapshot
    }
}

/// One leaderboard entry. Rows cover both lanes; presentation filters to
/// one lane at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub participant_id: String,
    pub display_name: String,
    pub total: f64,
    /// Correct round picks (futures not included).
    pub correct: usize,
    pub futures_points: f64,
    pub by_round: BTreeMap<String, f64>,
}

/// Score every participant's picks against the decided matchups.
///
/// A decided matchup worth N round points grants exactly N to each
/// participant whose pick matches the winner (after normalization) and 0
/// otherwise. Futures bonuses settle from the declared category -> matchup
/// mapping, independently of the round pick for the same contest. Rows
/// sort by total descending, then display name ascending.
pub fn score_bracket(snapshot: &BracketSnapshot, rules: &BracketConfig) -> Vec<LeaderboardRow> {
    fn row<'a>(
        rows: &'a mut HashMap<String, LeaderboardRow>,
        names: &HashMap<String, String>,
        participant_id: &str,
    ) -> &'a mut LeaderboardRow {
        rows.entry(participant_id.to_string())
            .or_insert_with(|| LeaderboardRow {
                participant_id: participant_id.to_string(),
                display_name: names
                    .get(participant_id)
                    .cloned()
                    .unwrap_or_else(|| participant_id.to_string()),
                total: 0.0,
                correct: 0,
                futures_points: 0.0,
                by_round: BTreeMap::new(),
            })
    }

    let mut rows: HashMap<String, LeaderboardRow> = HashMap::new();
    let names = &snapshot.display_names;

    // Every participant with any pick gets a row, even at zero points.
    for pick in &snapshot.picks {
        row(&mut rows, names, &pick.participant_id);
    }
    for pick in &snapshot.futures {
        row(&mut rows, names, &pick.participant_id);
    }

    for (matchup_id, matchup) in &snapshot.matchups {
        let Some(winner) = &matchup.winner else {
            continue;
        };
        let winner = normalize_id(winner);
        let points = rules.round_points(&matchup.round).unwrap_or(0.0);

        for pick in &snapshot.picks {
            if &pick.matchup_id != matchup_id {
                continue;
            }
            if normalize_id(&pick.side_id) == winner {
                let entry = row(&mut rows, names, &pick.participant_id);
                entry.total += points;
                entry.correct += 1;
                *entry.by_round.entry(matchup.round.clone()).or_insert(0.0) += points;
            }
        }
    }

    for rule in &rules.futures {
        let Some(winner) = snapshot
            .matchups
            .get(&rule.matchup)
            .and_then(|matchup| matchup.winner.as_deref())
        else {
            continue;
        };
        let winner = normalize_id(winner);

        for pick in &snapshot.futures {
            if pick.category == rule.category && normalize_id(&pick.side_id) == winner {
                let entry = row(&mut rows, names, &pick.participant_id);
                entry.total += rule.points;
                entry.futures_points += rule.points;
            }
        }
    }

    let mut rows: Vec<LeaderboardRow> = rows.into_values().collect();
    rows.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    });
    rows
}

/// Restrict a leaderboard to one lane by identifier prefix.
pub fn lane_rows(rows: &[LeaderboardRow], lane: Lane) -> Vec<LeaderboardRow> {
    rows.iter()
        .filter(|row| Lane::of(&row.participant_id) == lane)
        .cloned()
        .collect()
}
