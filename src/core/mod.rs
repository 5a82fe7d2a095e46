// logsift - core/mod.rs
//
// Core search logic: configuration, line sources, timestamps, matching,
// field extraction and export.
// Must NOT depend on: app, platform.

pub mod config;
pub mod discovery;
pub mod export;
pub mod extract;
pub mod matcher;
pub mod model;
pub mod profile;
pub mod source;
pub mod timestamp;
