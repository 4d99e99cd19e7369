//! Data structures: credential records and configuration.

pub mod credential;
pub mod store_config;
