//! Configuration file model.

use crate::constants;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub keyring: KeyringSection,
    #[serde(default)]
    pub transform: TransformSection,
}

/// Root keyring the namespace keyring hangs from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RootKeyring {
    /// Per-uid keyring that survives the session; shared by all root processes.
    #[default]
    Persistent,
    Thread,
    Process,
    Session,
    User,
    UserSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_credential_class")]
    pub credential_class: String,
    #[serde(default)]
    pub root: RootKeyring,
    /// Owner of the persistent keyring; the caller's uid when unset.
    #[serde(default)]
    pub persistent_uid: Option<u32>,
}

impl Default for KeyringSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            credential_class: default_credential_class(),
            root: RootKeyring::default(),
            persistent_uid: None,
        }
    }
}

/// External filter commands (argv) applied to payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSection {
    #[serde(default = "default_encrypt")]
    pub encrypt: Vec<String>,
    #[serde(default = "default_decrypt")]
    pub decrypt: Vec<String>,
}

impl Default for TransformSection {
    fn default() -> Self {
        Self {
            encrypt: default_encrypt(),
            decrypt: default_decrypt(),
        }
    }
}

fn default_namespace() -> String {
    constants::DEFAULT_NAMESPACE.to_string()
}

fn default_credential_class() -> String {
    constants::DEFAULT_CREDENTIAL_CLASS.to_string()
}

fn systemd_creds(verb: &str) -> Vec<String> {
    vec![
        "systemd-creds".to_string(),
        verb.to_string(),
        format!("--name={}", constants::SYSTEMD_CREDENTIAL_NAME),
        "-".to_string(),
        "-".to_string(),
    ]
}

fn default_encrypt() -> Vec<String> {
    systemd_creds("encrypt")
}

fn default_decrypt() -> Vec<String> {
    systemd_creds("decrypt")
}
