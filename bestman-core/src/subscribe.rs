// Live-view plumbing on top of `DocumentStore` subscriptions: a settle
// helper for first paint, and the leaderboard feed loop that recomputes
// bracket standings whenever a matchup changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::bracket::aggregate::{score_bracket, BracketSnapshot, LeaderboardRow};
use crate::bracket::matchup::{futures_path, matchups_path, round_picks_path};
use crate::config::BracketConfig;
use crate::roster::ParticipantDoc;
use crate::store::{decode_doc, DocumentStore, Snapshot};

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("subscription did not settle within {0:?}")]
    Timeout(Duration),
    #[error("subscription channel closed")]
    Closed,
}

/// Wait until a subscription has produced a usable first snapshot: either
/// documents arrived, or the store confirmed the path is loaded (and thus
/// genuinely empty). Callers use this to gate first render instead of
/// flashing an empty view.
pub async fn wait_for_settled(
    rx: &mut watch::Receiver<Snapshot>,
    deadline: Duration,
) -> Result<Snapshot, SubscribeError> {
    let settled = tokio::time::timeout(deadline, async {
        loop {
            let current = rx.borrow().clone();
            if current.loaded || !current.is_empty() {
                return Ok(current);
            }
            rx.changed().await.map_err(|_| SubscribeError::Closed)?;
        }
    })
    .await;

    match settled {
        Ok(result) => result,
        Err(_) => Err(SubscribeError::Timeout(deadline)),
    }
}

/// Push-recompute loop for one bracket's leaderboard.
///
/// Subscribes to the matchup collection and, on every change, re-reads
/// picks and roster, rescores the whole bracket, and publishes the rows.
/// Picks lock before any matchup decides, so matchup changes are the only
/// events that can move the standings; rereading picks per recompute keeps
/// the loop stateless. Exits cleanly when every receiver is dropped.
pub async fn run_leaderboard_feed(
    store: Arc<dyn DocumentStore>,
    bracket_id: &str,
    roster_path: &str,
    rules: BracketConfig,
    tx: watch::Sender<Vec<LeaderboardRow>>,
) -> anyhow::Result<()> {
    let mut matchups_rx = store.subscribe(&matchups_path(bracket_id)).await?;
    info!("leaderboard feed for bracket {bracket_id} started");

    loop {
        let matchup_docs = matchups_rx.borrow_and_update().docs.clone();

        let mut round_docs = Vec::with_capacity(rules.rounds.len());
        for rule in &rules.rounds {
            let path = round_picks_path(bracket_id, &rule.round);
            let docs = store.list(&path).await?;
            round_docs.push((path, docs));
        }
        let futures_docs = store.list(&futures_path(bracket_id)).await?;
        let names = display_names(store.as_ref(), roster_path).await?;

        let snapshot =
            BracketSnapshot::assemble(&matchup_docs, &round_docs, &futures_docs, names);
        let rows = score_bracket(&snapshot, &rules);
        debug!("bracket {bracket_id}: leaderboard recomputed ({} rows)", rows.len());

        if tx.send(rows).is_err() {
            info!("bracket {bracket_id}: last leaderboard receiver dropped, feed stopping");
            return Ok(());
        }
        if matchups_rx.changed().await.is_err() {
            info!("bracket {bracket_id}: matchup subscription closed, feed stopping");
            return Ok(());
        }
    }
}

async fn display_names(
    store: &dyn DocumentStore,
    roster_path: &str,
) -> anyhow::Result<HashMap<String, String>> {
    let docs = store.list(roster_path).await?;
    Ok(docs
        .iter()
        .filter_map(|(id, doc)| {
            decode_doc::<ParticipantDoc>(roster_path, id, doc)
                .map(|p| (id.clone(), p.display_name))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::matchup::{Matchup, MatchupSide};
    use crate::config::RoundRule;
    use crate::store::{MemoryStore, WriteBatch};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    fn decided_winner_merge(winner: &str) -> serde_json::Value {
        json!({ "winner": winner, "decided_at": Utc::now() })
    }

    fn seeded_matchup() -> Matchup {
        let start = Utc::now() - ChronoDuration::hours(2);
        Matchup {
            round: "round_1".into(),
            home: MatchupSide {
                id: "s1".into(),
                name: "Side One".into(),
            },
            away: MatchupSide {
                id: "s2".into(),
                name: "Side Two".into(),
            },
            winner: None,
            starts_at: start,
            locks_at: start,
            decided_at: None,
            revealed_at: None,
        }
    }

    fn rules() -> BracketConfig {
        BracketConfig {
            rounds: vec![RoundRule {
                round: "round_1".into(),
                points: 2.0,
            }],
            futures: vec![],
        }
    }

    #[tokio::test]
    async fn settled_resolves_once_loaded() {
        let store = Arc::new(MemoryStore::new());
        let mut rx = store.subscribe("roster").await.unwrap();
        let snapshot = wait_for_settled(&mut rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(snapshot.loaded);
        assert!(snapshot.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn settled_times_out_without_a_first_snapshot() {
        let (_tx, mut rx) = watch::channel(Snapshot::default());
        let err = wait_for_settled(&mut rx, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscribeError::Timeout(_)));
    }

    #[tokio::test]
    async fn settled_errors_when_sender_drops() {
        let (tx, mut rx) = watch::channel(Snapshot::default());
        drop(tx);
        let err = wait_for_settled(&mut rx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscribeError::Closed));
    }

    #[tokio::test]
    async fn feed_recomputes_when_a_matchup_is_decided() {
        let store = Arc::new(MemoryStore::new());

        let mut batch = WriteBatch::new();
        batch.upsert(
            "roster",
            "amy",
            json!({ "display_name": "Amy", "role": "competitor" }),
        );
        batch.upsert(
            &matchups_path("main"),
            "m1",
            serde_json::to_value(seeded_matchup()).unwrap(),
        );
        batch.upsert(
            &round_picks_path("main", "round_1"),
            "amy_m1",
            json!({ "participant_id": "amy", "matchup_id": "m1", "side_id": "s1" }),
        );
        store.commit(batch).await.unwrap();

        let (tx, mut rx) = watch::channel(Vec::new());
        let feed = tokio::spawn(run_leaderboard_feed(
            store.clone() as Arc<dyn DocumentStore>,
            "main",
            "roster",
            rules(),
            tx,
        ));

        // First publish: matchup undecided, everyone at zero.
        rx.changed().await.unwrap();
        {
            let rows = rx.borrow_and_update();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].display_name, "Amy");
            assert_eq!(rows[0].total, 0.0);
        }

        store
            .upsert_merge(&matchups_path("main"), "m1", decided_winner_merge("s1"))
            .await
            .unwrap();

        rx.changed().await.unwrap();
        {
            let rows = rx.borrow_and_update();
            assert_eq!(rows[0].total, 2.0);
            assert_eq!(rows[0].correct, 1);
        }

        // Dropping the receiver ends the loop on its next publish.
        drop(rx);
        store
            .upsert_merge(&matchups_path("main"), "m1", decided_winner_merge("s1"))
            .await
            .unwrap();
        feed.await.unwrap().unwrap();
    }
}
