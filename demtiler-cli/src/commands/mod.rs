//! CLI subcommands.

pub mod common;
pub mod expand;
pub mod run;
pub mod tiles;
