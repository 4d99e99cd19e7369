//! API key records as stored in leaf keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zeroize::Zeroize;

/// Key-derivation algorithm a record's verifiers were produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiKeyAlgorithm {
    Sha512,
}

impl fmt::Display for ApiKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKeyAlgorithm::Sha512 => f.write_str("SHA512"),
        }
    }
}

/// Verifier material for one API key of one user.
///
/// `record_id` doubles as the leaf key description, so a record is found by
/// a single search on its id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub username: String,
    #[serde(rename = "dbid")]
    pub record_id: i64,
    pub algorithm: ApiKeyAlgorithm,
    #[serde(rename = "iterations")]
    pub iteration_count: u32,
    /// Unix timestamp; `-1` revoked, `0` never expires.
    pub expiry: i64,
    /// Base64 salt.
    pub salt: String,
    /// Base64 SCRAM ServerKey.
    pub server_key: String,
    /// Base64 SCRAM StoredKey.
    pub stored_key: String,
}

/// What the expiry policy says to do with a record at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryDisposition {
    /// Revoked at creation; never stored.
    Revoked,
    /// Already past its expiry; never stored.
    Expired,
    /// Stored without a kernel timeout.
    Permanent,
    /// Stored with a kernel timeout of this length.
    Expires(Duration),
}

impl ExpiryDisposition {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Permanent | Self::Expires(_))
    }
}

impl CredentialRecord {
    /// Leaf key description for this record.
    pub fn key_description(&self) -> String {
        self.record_id.to_string()
    }

    /// Classify against `now` (Unix seconds). Negative expiries other than
    /// `-1` are treated as revoked as well.
    pub fn disposition(&self, now: i64) -> ExpiryDisposition {
        match self.expiry {
            e if e < 0 => ExpiryDisposition::Revoked,
            0 => ExpiryDisposition::Permanent,
            e if e <= now => ExpiryDisposition::Expired,
            e => ExpiryDisposition::Expires(Duration::from_secs((e - now) as u64)),
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("username", &self.username)
            .field("record_id", &self.record_id)
            .field("algorithm", &self.algorithm)
            .field("iteration_count", &self.iteration_count)
            .field("expiry", &self.expiry)
            .field("salt", &"<redacted>")
            .field("server_key", &"<redacted>")
            .field("stored_key", &"<redacted>")
            .finish()
    }
}

impl Drop for CredentialRecord {
    fn drop(&mut self) {
        self.salt.zeroize();
        self.server_key.zeroize();
        self.stored_key.zeroize();
    }
}
