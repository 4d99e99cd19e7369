//! API key credential cache in the Linux kernel keyring.
//!
//! Verifier material for API keys is kept in the kernel's key-management
//! facility, grouped per user under a namespace keyring, encrypted by a
//! pluggable transform and expired by the kernel itself.
//!
//! ## Modules
//! - `core` — Keyring handles, pruning iterator, navigator, lifecycle
//! - `models` — Credential records and configuration
//! - `cli` — Command-line handlers
//! - `util` — Filter commands and privilege checks

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;

pub use error::{KeyringError, Result};
