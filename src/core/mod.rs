//! Keyring primitives and the credential lifecycle built on them.

pub mod backend;
pub mod config;
pub mod handle;
pub mod iter;
pub mod kernel;
pub mod lifecycle;
pub mod memory;
pub mod navigator;
pub mod transform;

pub use backend::{KeyBackend, KeySerial, KeyType, SpecialKeyring};
pub use handle::{Handle, Key, Keyring};
pub use iter::{KeyringIter, PruneOptions};
pub use lifecycle::{CommitSummary, CredentialStore, KeyringLayout};
pub use transform::{CommandTransform, PayloadTransform, Plaintext, TransformError};
