// logsift - platform/mod.rs
//
// Platform abstraction layer: config file locations and file identity.
// Dependencies: standard library, directories crate, core settings types.

pub mod config;
pub mod fs;
