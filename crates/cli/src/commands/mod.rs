//! CLI Commands

pub mod addresses;
pub mod check;
pub mod config;
pub mod findings;
pub mod probe;
