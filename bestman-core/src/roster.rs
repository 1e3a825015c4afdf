// Roster collaborator: who is eligible for payouts, who the reference
// participant is, and which leaderboard lane an identifier belongs to.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::store::{decode_doc, DocumentStore, StoreError};

/// Identifier prefix that scopes a participant to the admin lane. A lane is
/// derived from the prefix alone and never stored, so an identifier's lane
/// is stable for as long as the identifier exists.
pub const ADMIN_LANE_PREFIX: &str = "admin_";

/// Which leaderboard view a participant appears on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Standard,
    Admin,
}

impl Lane {
    pub fn of(participant_id: &str) -> Lane {
        if participant_id.starts_with(ADMIN_LANE_PREFIX) {
            Lane::Admin
        } else {
            Lane::Standard
        }
    }
}

/// A participant's scoring role. Only competitors receive base payouts; the
/// reference participant is the bonus-comparison baseline; excluded
/// participants never score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Competitor,
    Reference,
    Excluded,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantDoc {
    pub display_name: String,
    pub role: ParticipantRole,
}

/// The resolved eligible-participant view the finalizer works from.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    /// Ordinary competitors, eligible for base payout.
    pub competitors: BTreeSet<String>,
    /// The reference participant, used only for bonus comparison. A roster
    /// can legitimately lack one; bonus logic then grants nothing.
    pub reference: Option<String>,
    /// Participants barred from scoring and from weekly-winner sets.
    pub excluded: BTreeSet<String>,
}

impl Roster {
    pub fn is_eligible(&self, participant_id: &str) -> bool {
        self.competitors.contains(participant_id)
    }
}

/// Read-only identity/roster collaborator. A trait so tests can hand the
/// finalizer a fixed roster without a store.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn roster(&self) -> Result<Roster, StoreError>;
}

/// Roster read from participant documents under a store path.
pub struct StoreRoster {
    store: Arc<dyn DocumentStore>,
    path: String,
}

impl StoreRoster {
    pub fn new(store: Arc<dyn DocumentStore>, path: &str) -> Self {
        StoreRoster {
            store,
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl RosterProvider for StoreRoster {
    async fn roster(&self) -> Result<Roster, StoreError> {
        let docs = self.store.list(&self.path).await?;

        let mut roster = Roster::default();
        for (id, doc) in &docs {
            let Some(participant) = decode_doc::<ParticipantDoc>(&self.path, id, doc) else {
                // Malformed participant documents are skipped, which means
                // excluded from scoring until the upstream data is fixed.
                continue;
            };
            match participant.role {
                ParticipantRole::Competitor => {
                    roster.competitors.insert(id.clone());
                }
                ParticipantRole::Reference => {
                    if let Some(existing) = &roster.reference {
                        warn!(
                            "multiple reference participants in {}: keeping {existing}, ignoring {id}",
                            self.path
                        );
                    } else {
                        roster.reference = Some(id.clone());
                    }
                }
                ParticipantRole::Excluded => {
                    roster.excluded.insert(id.clone());
                }
            }
        }
        Ok(roster)
    }
}

/// Fixed in-memory roster for tests and one-off tooling.
pub struct StaticRoster(pub Roster);

#[async_trait]
impl RosterProvider for StaticRoster {
    async fn roster(&self) -> Result<Roster, StoreError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn lane_derived_from_prefix() {
        assert_eq!(Lane::of("admin_tobias"), Lane::Admin);
        assert_eq!(Lane::of("miguel"), Lane::Standard);
        // Prefix must lead the identifier, not merely appear in it.
        assert_eq!(Lane::of("not_admin_miguel"), Lane::Standard);
    }

    #[tokio::test]
    async fn roster_partitions_by_role() {
        let store = Arc::new(MemoryStore::new());
        for (id, role) in [
            ("miguel", "competitor"),
            ("tobias", "competitor"),
            ("groom", "reference"),
            ("photographer", "excluded"),
        ] {
            store
                .upsert_merge(
                    "roster",
                    id,
                    json!({"display_name": id, "role": role}),
                )
                .await
                .unwrap();
        }

        let roster = StoreRoster::new(store, "roster").roster().await.unwrap();
        assert_eq!(roster.competitors.len(), 2);
        assert!(roster.is_eligible("miguel"));
        assert!(!roster.is_eligible("groom"));
        assert_eq!(roster.reference.as_deref(), Some("groom"));
        assert!(roster.excluded.contains("photographer"));
    }

    #[tokio::test]
    async fn malformed_participant_docs_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_merge("roster", "ok", json!({"display_name": "Ok", "role": "competitor"}))
            .await
            .unwrap();
        store
            .upsert_merge("roster", "broken", json!({"display_name": 7}))
            .await
            .unwrap();

        let roster = StoreRoster::new(store, "roster").roster().await.unwrap();
        assert_eq!(roster.competitors.len(), 1);
        assert!(!roster.is_eligible("broken"));
    }

    #[tokio::test]
    async fn first_reference_wins_on_duplicates() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_merge("roster", "a_ref", json!({"display_name": "A", "role": "reference"}))
            .await
            .unwrap();
        store
            .upsert_merge("roster", "b_ref", json!({"display_name": "B", "role": "reference"}))
            .await
            .unwrap();

        let roster = StoreRoster::new(store, "roster").roster().await.unwrap();
        // Docs list in id order, so the first id is kept.
        assert_eq!(roster.reference.as_deref(), Some("a_ref"));
    }
}
