// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod bracket;
pub mod challenge;
pub mod config;
pub mod roster;
pub mod scoring;
pub mod store;
pub mod subscribe;
