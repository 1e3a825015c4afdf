// Challenge finalization pass and weekly-winner bonus reconciliation.
//
// The finalizer is the only writer of award records and participant
// totals. Finalization is idempotent: award documents upsert under a
// deterministic composite key and totals are recomputed from the full
// ledger, never accumulated, so re-running a pass after a partial batch
// failure is the supported repair path.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ScoringConfig;
use crate::roster::RosterProvider;
use crate::scoring::payout::PayoutTable;
use crate::scoring::rank::{rank_groups, Direction};
use crate::store::{decode_doc, DocumentStore, StoreError, WriteBatch, MAX_BATCH_OPS};

use super::award::{
    award_doc_id, weekly_bonus_challenge_id, AwardRecord, AWARDS_PATH, TOTALS_PATH,
};

/// Store path of weekly challenge documents.
pub const WEEKLIES_PATH: &str = "weeklies";

/// Store path of a weekly challenge's submission documents, keyed by
/// participant id.
pub fn weekly_submissions_path(weekly_id: &str) -> String {
    format!("{WEEKLIES_PATH}/{weekly_id}/submissions")
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("weekly challenge `{weekly_id}` is not finalized yet")]
    NotFinalized { weekly_id: String },

    #[error("no submissions found for weekly challenge `{weekly_id}`")]
    NoSubmissions { weekly_id: String },

    #[error("missing winners for weekly challenge `{weekly_id}`")]
    MissingWinners { weekly_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Weekly challenge document, owned by the challenge UI except for
/// `applied_winners`, which the bonus reconciliation writes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeeklyDoc {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub finalized: bool,
    /// Explicit winner list, preferred over computed winners when present.
    #[serde(default)]
    pub winners: Vec<String>,
    /// Winners the bonus has already been granted to.
    #[serde(default)]
    pub applied_winners: Vec<String>,
}

/// One weekly submission. A submission without a numeric score is not
/// scorable and is skipped when computing winners.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionDoc {
    #[serde(default)]
    pub score: Option<f64>,
}

/// Summary of one finalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// Award records written.
    pub awarded: usize,
    /// How many of those carried the reference bonus.
    pub bonuses: usize,
}

/// Summary of one weekly-bonus reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyBonusOutcome {
    pub winners: Vec<String>,
    pub granted: usize,
    pub retracted: usize,
}

/// Accumulates write ops and flushes a full batch whenever the backing
/// store's per-batch ceiling is reached. Atomicity is per flushed batch,
/// not across the whole pass; a crash between flushes leaves a partial but
/// re-runnable state.
struct BatchWriter<'a> {
    store: &'a dyn DocumentStore,
    batch: WriteBatch,
    flushed: usize,
}

impl<'a> BatchWriter<'a> {
    fn new(store: &'a dyn DocumentStore) -> Self {
        BatchWriter {
            store,
            batch: WriteBatch::new(),
            flushed: 0,
        }
    }

    async fn push(
        &mut self,
        op: impl FnOnce(&mut WriteBatch),
    ) -> Result<(), StoreError> {
        op(&mut self.batch);
        if self.batch.len() >= MAX_BATCH_OPS {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        let ops = batch.len();
        self.store.commit(batch).await?;
        self.flushed += 1;
        debug!("flushed batch {} ({ops} ops)", self.flushed);
        Ok(())
    }
}

pub struct ChallengeFinalizer {
    store: Arc<dyn DocumentStore>,
    roster: Arc<dyn RosterProvider>,
    config: ScoringConfig,
}

impl ChallengeFinalizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        roster: Arc<dyn RosterProvider>,
        config: ScoringConfig,
    ) -> Self {
        ChallengeFinalizer {
            store,
            roster,
            config,
        }
    }

    /// Run one finalization pass for a challenge.
    ///
    /// Eligible competitors are ranked into tie-groups and paid from the
    /// payout table (scaled by `multiplier`); anyone whose score strictly
    /// beats the reference participant's additionally receives the fixed
    /// reference bonus (never scaled). One award record is upserted per
    /// eligible participant under `{challenge_id}_{participant_id}`, then
    /// every affected participant's total is recomputed by summing their
    /// full award ledger.
    pub async fn finalize_challenge(
        &self,
        challenge_id: &str,
        scores: &HashMap<String, f64>,
        multiplier: f64,
        direction: Direction,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let roster = self.roster.roster().await?;

        // Restrict to eligible competitors; empty restriction is a no-op.
        let eligible: HashMap<String, f64> = scores
            .iter()
            .filter(|(id, _)| roster.is_eligible(id))
            .map(|(id, &s)| (id.clone(), s))
            .collect();
        if eligible.is_empty() {
            info!("finalize {challenge_id}: no eligible scores, nothing to do");
            return Ok(FinalizeOutcome::default());
        }

        // Base payouts.
        let groups = rank_groups(&eligible, direction);
        let table = PayoutTable::new(self.config.payout_table.clone());
        let base = table.distribute(&groups, multiplier);

        // Reference bonus: strictly better than the reference's score,
        // per direction. The reference participant's own score comes from
        // the unrestricted input (they are never eligible themselves).
        let reference_score = roster
            .reference
            .as_ref()
            .and_then(|id| scores.get(id))
            .copied();

        // Preserve created_at across re-finalization so idempotent re-runs
        // rewrite records rather than appearing newly created.
        let existing = self.store.list(AWARDS_PATH).await?;
        let now = Utc::now();

        let mut writer = BatchWriter::new(self.store.as_ref());
        let mut outcome = FinalizeOutcome::default();

        let mut affected: Vec<&String> = eligible.keys().collect();
        affected.sort();

        for participant_id in &affected {
            let score = eligible[*participant_id];
            let base_points = base.get(*participant_id).copied().unwrap_or(0.0);
            let bonus_points = match reference_score {
                Some(reference) if direction.beats(score, reference) => {
                    self.config.reference_bonus
                }
                _ => 0.0,
            };
            if bonus_points > 0.0 {
                outcome.bonuses += 1;
            }

            let doc_id = award_doc_id(challenge_id, participant_id);
            let created_at = existing
                .get(&doc_id)
                .and_then(|doc| decode_doc::<AwardRecord>(AWARDS_PATH, &doc_id, doc))
                .map(|record| record.created_at)
                .unwrap_or(now);

            let record = AwardRecord {
                challenge_id: challenge_id.to_string(),
                participant_id: (*participant_id).clone(),
                base_points,
                bonus_points,
                total_points: base_points + bonus_points,
                multiplier,
                title: None,
                note: None,
                created_at,
                updated_at: now,
            };
            let value = serde_json::to_value(&record).map_err(StoreError::from)?;
            writer
                .push(|batch| batch.upsert(AWARDS_PATH, &doc_id, value))
                .await?;
            outcome.awarded += 1;
        }
        writer.flush().await?;

        // Recompute totals from the committed ledger. O(total historical
        // awards) per pass, fine at this roster size.
        let affected_set: BTreeSet<String> = eligible.keys().cloned().collect();
        self.recompute_totals(&affected_set, now).await?;

        info!(
            "finalize {challenge_id}: {} awards, {} bonuses",
            outcome.awarded, outcome.bonuses
        );
        Ok(outcome)
    }

    /// Sum every award record for each affected participant and persist
    /// absolute totals.
    async fn recompute_totals(
        &self,
        affected: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let ledger = self.store.list(AWARDS_PATH).await?;

        let mut sums: HashMap<&String, f64> =
            affected.iter().map(|id| (id, 0.0)).collect();
        for (doc_id, doc) in &ledger {
            let Some(record) = decode_doc::<AwardRecord>(AWARDS_PATH, doc_id, doc) else {
                continue;
            };
            if let Some(sum) = sums.get_mut(&record.participant_id) {
                *sum += record.total_points;
            }
        }

        let mut writer = BatchWriter::new(self.store.as_ref());
        for participant_id in affected {
            let total = sums.get(participant_id).copied().unwrap_or(0.0);
            writer
                .push(|batch| {
                    batch.upsert(
                        TOTALS_PATH,
                        participant_id,
                        json!({
                            "participant_id": participant_id,
                            "total_points": total,
                            "updated_at": now,
                        }),
                    )
                })
                .await?;
        }
        writer.flush().await
    }

    /// Grant the fixed weekly bonus to the weekly challenge's winner set,
    /// reconciling against whatever was applied before.
    ///
    /// Winner sets can change between passes (late corrections), so this is
    /// a set-difference reconciliation rather than a blind overwrite:
    /// removed winners lose their bonus record and have their total
    /// decremented; added winners gain both; unchanged winners only get
    /// their record metadata refreshed. The new applied-winners list
    /// commits in the same single batch as the award writes.
    pub async fn apply_weekly_winner_bonus(
        &self,
        weekly_id: &str,
    ) -> Result<WeeklyBonusOutcome, FinalizeError> {
        let weekly: WeeklyDoc = match self.store.get(WEEKLIES_PATH, weekly_id).await? {
            Some(doc) => serde_json::from_value(doc).map_err(StoreError::from)?,
            None => {
                return Err(FinalizeError::NotFinalized {
                    weekly_id: weekly_id.to_string(),
                })
            }
        };
        if !weekly.finalized {
            return Err(FinalizeError::NotFinalized {
                weekly_id: weekly_id.to_string(),
            });
        }

        let roster = self.roster.roster().await?;
        let winners = self.resolve_winners(weekly_id, &weekly, &roster).await?;

        let previous: BTreeSet<String> = weekly.applied_winners.iter().cloned().collect();
        let current: BTreeSet<String> = winners.iter().cloned().collect();
        let bonus_challenge = weekly_bonus_challenge_id(weekly_id);
        let bonus = self.config.weekly_bonus;
        let now = Utc::now();
        let title = weekly
            .title
            .clone()
            .map(|t| format!("Weekly winner bonus: {t}"))
            .unwrap_or_else(|| format!("Weekly winner bonus: {weekly_id}"));

        let mut batch = WriteBatch::new();
        let mut outcome = WeeklyBonusOutcome {
            winners: winners.clone(),
            ..Default::default()
        };

        for removed in previous.difference(&current) {
            batch.delete(AWARDS_PATH, &award_doc_id(&bonus_challenge, removed));
            batch.upsert(
                TOTALS_PATH,
                removed,
                json!({ "participant_id": removed, "updated_at": now }),
            );
            batch.increment(TOTALS_PATH, removed, "total_points", -bonus);
            outcome.retracted += 1;
        }

        for added in current.difference(&previous) {
            let record = AwardRecord {
                challenge_id: bonus_challenge.clone(),
                participant_id: added.clone(),
                base_points: 0.0,
                bonus_points: bonus,
                total_points: bonus,
                multiplier: 1.0,
                title: Some(title.clone()),
                note: Some(format!("won {weekly_id}")),
                created_at: now,
                updated_at: now,
            };
            batch.upsert(
                AWARDS_PATH,
                &award_doc_id(&bonus_challenge, added),
                serde_json::to_value(&record).map_err(StoreError::from)?,
            );
            batch.upsert(
                TOTALS_PATH,
                added,
                json!({ "participant_id": added, "updated_at": now }),
            );
            batch.increment(TOTALS_PATH, added, "total_points", bonus);
            outcome.granted += 1;
        }

        // Unchanged winners: metadata refresh only, points untouched.
        for unchanged in previous.intersection(&current) {
            batch.upsert(
                AWARDS_PATH,
                &award_doc_id(&bonus_challenge, unchanged),
                json!({
                    "title": title.clone(),
                    "note": format!("won {weekly_id}"),
                    "updated_at": now,
                }),
            );
        }

        let applied: Vec<&String> = current.iter().collect();
        batch.upsert(WEEKLIES_PATH, weekly_id, json!({ "applied_winners": applied }));

        // Single atomic commit: the applied-winners list must never drift
        // from the award writes it describes.
        self.store.commit(batch).await?;

        info!(
            "weekly bonus {weekly_id}: {} winners ({} granted, {} retracted)",
            outcome.winners.len(),
            outcome.granted,
            outcome.retracted
        );
        Ok(outcome)
    }

    /// Resolve the weekly winner set: prefer the explicit stored list
    /// (minus ineligible participants); otherwise compute the max-score
    /// tie-group from scorable submissions.
    async fn resolve_winners(
        &self,
        weekly_id: &str,
        weekly: &WeeklyDoc,
        roster: &crate::roster::Roster,
    ) -> Result<Vec<String>, FinalizeError> {
        let explicit: Vec<String> = weekly
            .winners
            .iter()
            .filter(|id| roster.is_eligible(id))
            .cloned()
            .collect();
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let path = weekly_submissions_path(weekly_id);
        let submissions = self.store.list(&path).await?;

        let mut scorable: HashMap<String, f64> = HashMap::new();
        let mut eligible_scorable: HashMap<String, f64> = HashMap::new();
        for (participant_id, doc) in &submissions {
            let Some(submission) = decode_doc::<SubmissionDoc>(&path, participant_id, doc) else {
                continue;
            };
            let Some(score) = submission.score else {
                continue;
            };
            scorable.insert(participant_id.clone(), score);
            if roster.is_eligible(participant_id) {
                eligible_scorable.insert(participant_id.clone(), score);
            }
        }

        if scorable.is_empty() {
            return Err(FinalizeError::NoSubmissions {
                weekly_id: weekly_id.to_string(),
            });
        }
        if eligible_scorable.is_empty() {
            return Err(FinalizeError::MissingWinners {
                weekly_id: weekly_id.to_string(),
            });
        }

        let groups = rank_groups(&eligible_scorable, Direction::HigherIsBetter);
        Ok(groups
            .into_iter()
            .next()
            .map(|group| group.members)
            .unwrap_or_default())
    }
}
