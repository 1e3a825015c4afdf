// Award ledger documents: per-(challenge, participant) award records and
// cached per-participant totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store path of the award ledger.
pub const AWARDS_PATH: &str = "awards";
/// Store path of the cached participant totals.
pub const TOTALS_PATH: &str = "totals";
/// Store path of the participant roster.
pub const ROSTER_PATH: &str = "roster";

/// Deterministic composite key for an award document. Re-finalizing a
/// challenge overwrites the same document instead of duplicating it.
pub fn award_doc_id(challenge_id: &str, participant_id: &str) -> String {
    format!("{challenge_id}_{participant_id}")
}

/// Synthetic challenge id under which a weekly challenge's winner bonus is
/// recorded, kept distinct from the weekly's base awards so the bonus can
/// be retracted without touching them.
pub fn weekly_bonus_challenge_id(weekly_id: &str) -> String {
    format!("{weekly_id}_weekly_bonus")
}

/// One persisted, idempotent unit of credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardRecord {
    pub challenge_id: String,
    pub participant_id: String,
    pub base_points: f64,
    pub bonus_points: f64,
    pub total_points: f64,
    pub multiplier: f64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived, cached sum of all award records for one participant. Always
/// recomputed from the ledger, never incrementally maintained by the
/// finalizer (the weekly bonus is the one writer that adjusts it by delta,
/// and only inside its reconciliation batch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTotal {
    pub participant_id: String,
    pub total_points: f64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn award_ids_are_deterministic() {
        assert_eq!(award_doc_id("scavenger_hunt", "miguel"), "scavenger_hunt_miguel");
        assert_eq!(
            award_doc_id(&weekly_bonus_challenge_id("week_3"), "miguel"),
            "week_3_weekly_bonus_miguel"
        );
    }

    #[test]
    fn award_record_round_trips_through_json() {
        let now = Utc::now();
        let record = AwardRecord {
            challenge_id: "darts".into(),
            participant_id: "tobias".into(),
            base_points: 13.5,
            bonus_points: 5.0,
            total_points: 18.5,
            multiplier: 1.0,
            title: Some("Darts night".into()),
            note: None,
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&record).unwrap();
        let back: AwardRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
