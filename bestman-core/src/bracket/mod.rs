// Tournament bracket: matchup documents, administrative winner control,
// and leaderboard aggregation.

pub mod aggregate;
pub mod matchup;
