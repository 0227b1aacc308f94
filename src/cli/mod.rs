//! CLI command handlers

pub mod commands;

pub use commands::{columns, group, lookup, GroupArgs, LookupArgs};
