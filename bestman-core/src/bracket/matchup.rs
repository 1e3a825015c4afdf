// Bracket matchups, picks, and the administrative winner operations.
//
// A matchup's lifecycle is scheduled -> locked -> decided, where "locked"
// is derived from the lock timestamp and never stored; deciding and
// resetting are explicit administrative actions. Setting a winner writes
// the winner and decided-timestamp together; clearing removes both
// together, so the pair can never drift apart.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::store::{DocumentStore, StoreError};

/// Store path of a bracket's matchup documents (all rounds together; each
/// document carries its round).
pub fn matchups_path(bracket_id: &str) -> String {
    format!("brackets/{bracket_id}/matchups")
}

/// Store path of one round's pick documents, keyed `{participant}_{matchup}`.
pub fn round_picks_path(bracket_id: &str, round: &str) -> String {
    format!("brackets/{bracket_id}/rounds/{round}/picks")
}

/// Store path of a bracket's futures-pick documents.
pub fn futures_path(bracket_id: &str) -> String {
    format!("brackets/{bracket_id}/futures")
}

#[derive(Debug, Error)]
pub enum BracketError {
    #[error("unknown matchup `{matchup_id}`")]
    UnknownMatchup { matchup_id: String },

    #[error("`{side_id}` is not a side of matchup `{matchup_id}`")]
    InvalidWinner {
        matchup_id: String,
        side_id: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupSide {
    pub id: String,
    pub name: String,
}

/// One bracket contest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub round: String,
    pub home: MatchupSide,
    pub away: MatchupSide,
    /// Recorded winner; always one of the two side ids.
    #[serde(default)]
    pub winner: Option<String>,
    pub starts_at: DateTime<Utc>,
    /// Picks are mutable until this instant (UI-enforced).
    pub locks_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revealed_at: Option<DateTime<Utc>>,
}

/// Observed lifecycle state. Locking is derived from the clock, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchupPhase {
    Scheduled,
    Locked,
    Decided,
}

impl Matchup {
    pub fn phase(&self, now: DateTime<Utc>) -> MatchupPhase {
        if self.winner.is_some() {
            MatchupPhase::Decided
        } else if now >= self.locks_at {
            MatchupPhase::Locked
        } else {
            MatchupPhase::Scheduled
        }
    }

    pub fn has_side(&self, side_id: &str) -> bool {
        self.home.id == side_id || self.away.id == side_id
    }
}

/// A participant's prediction for one matchup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub participant_id: String,
    pub matchup_id: String,
    pub side_id: String,
}

/// A participant's prediction for a tournament-wide outcome, keyed by a
/// declared category label rather than any single matchup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesPick {
    pub participant_id: String,
    pub category: String,
    pub side_id: String,
}

/// Administrative control over one bracket's matchups.
pub struct BracketAdmin {
    store: Arc<dyn DocumentStore>,
    bracket_id: String,
}

impl BracketAdmin {
    pub fn new(store: Arc<dyn DocumentStore>, bracket_id: &str) -> Self {
        BracketAdmin {
            store,
            bracket_id: bracket_id.to_string(),
        }
    }

    async fn load(&self, matchup_id: &str) -> Result<Matchup, BracketError> {
        let path = matchups_path(&self.bracket_id);
        let doc = self.store.get(&path, matchup_id).await?.ok_or_else(|| {
            BracketError::UnknownMatchup {
                matchup_id: matchup_id.to_string(),
            }
        })?;
        Ok(serde_json::from_value(doc).map_err(StoreError::from)?)
    }

    /// Record a matchup's winner. The winner must be one of the matchup's
    /// two side ids; winner and decided-timestamp are written together.
    pub async fn record_winner(
        &self,
        matchup_id: &str,
        side_id: &str,
    ) -> Result<(), BracketError> {
        let matchup = self.load(matchup_id).await?;
        if !matchup.has_side(side_id) {
            return Err(BracketError::InvalidWinner {
                matchup_id: matchup_id.to_string(),
                side_id: side_id.to_string(),
            });
        }

        self.store
            .upsert_merge(
                &matchups_path(&self.bracket_id),
                matchup_id,
                json!({ "winner": side_id, "decided_at": Utc::now() }),
            )
            .await?;
        info!("matchup {matchup_id}: winner recorded as {side_id}");
        Ok(())
    }

    /// Clear a matchup's result, returning it to the locked state. Winner
    /// and decided-timestamp are removed in one write.
    pub async fn clear_winner(&self, matchup_id: &str) -> Result<(), BracketError> {
        // Load first so clearing an unknown matchup is still an error.
        self.load(matchup_id).await?;

        self.store
            .upsert_merge(
                &matchups_path(&self.bracket_id),
                matchup_id,
                json!({ "winner": null, "decided_at": null }),
            )
            .await?;
        info!("matchup {matchup_id}: winner cleared");
        Ok(())
    }
}
