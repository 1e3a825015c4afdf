// Pure scoring computation: tie-group ranking and payout distribution.

pub mod payout;
pub mod rank;
