//! Resource packer for onebin launchers
//!
//! Library side of the `onebin-pack` binary, so the subcommands can be driven
//! from tests without spawning processes.

pub mod commands;
pub mod icons;
pub mod output;
