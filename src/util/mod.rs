//! Process helpers: external filter commands and privilege checks.

pub mod command;
pub mod privilege;
