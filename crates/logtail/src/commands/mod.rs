//! Subcommand handlers.

pub mod config_cmd;
pub mod tail;
