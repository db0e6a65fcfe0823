//! Subcommand implementations.

pub mod inspect;
pub mod pack;
pub mod stage;
