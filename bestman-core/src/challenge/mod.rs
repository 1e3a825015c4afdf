// Challenge finalization: the award ledger, the finalize pass, and the
// weekly-winner bonus reconciliation.

pub mod award;
pub mod finalize;
