// logsift - app/mod.rs
//
// Application layer: search orchestration, follow mode, profile loading.
// Dependencies: core layer, platform::fs for file identity.

pub mod follow;
pub mod profile_mgr;
pub mod search;
