//! Credential lifecycle: commit, dump and clear per-user credential sets.
//!
//! Layout below the root keyring:
//!
//! ```text
//! <root>
//! └── <namespace>             e.g. API_KEY_CACHE
//!     └── <username>
//!         └── <credential_class>   e.g. API_KEYS
//!             └── <record_id>      user key, encrypted JSON payload
//! ```
//!
//! `commit` clears and repopulates the credential-class keyring in place, so
//! a concurrent `dump` may observe a partial set. Callers treat the cache as
//! eventually consistent with their source of truth.

use super::backend::{KeyBackend, SpecialKeyring};
use super::handle::{Handle, Key, Keyring};
use super::iter::PruneOptions;
use super::kernel::KernelBackend;
use super::navigator;
use super::transform::PayloadTransform;
use crate::constants;
use crate::error::{KeyringError, Result};
use crate::models::credential::{CredentialRecord, ExpiryDisposition};
use crate::models::store_config::{KeyringSection, RootKeyring, StoreConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Names of the two fixed levels of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringLayout {
    pub namespace: String,
    pub credential_class: String,
}

impl Default for KeyringLayout {
    fn default() -> Self {
        Self {
            namespace: constants::DEFAULT_NAMESPACE.to_string(),
            credential_class: constants::DEFAULT_CREDENTIAL_CLASS.to_string(),
        }
    }
}

impl From<&KeyringSection> for KeyringLayout {
    fn from(section: &KeyringSection) -> Self {
        Self {
            namespace: section.namespace.clone(),
            credential_class: section.credential_class.clone(),
        }
    }
}

/// Outcome of a [`CredentialStore::commit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub stored: usize,
    pub skipped_revoked: usize,
    pub skipped_expired: usize,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: Keyring,
    layout: KeyringLayout,
}

impl CredentialStore {
    pub fn new(root: Keyring, layout: KeyringLayout) -> Self {
        Self { root, layout }
    }

    /// Open the store on the kernel keyring facility.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::open_with(Arc::new(KernelBackend::new()), config)
    }

    pub fn open_with(backend: Arc<dyn KeyBackend>, config: &StoreConfig) -> Result<Self> {
        let section = &config.keyring;
        let root = match section.root {
            RootKeyring::Persistent => Keyring::persistent(backend, section.persistent_uid)?,
            RootKeyring::Thread => Keyring::special(backend, SpecialKeyring::Thread)?,
            RootKeyring::Process => Keyring::special(backend, SpecialKeyring::Process)?,
            RootKeyring::Session => Keyring::special(backend, SpecialKeyring::Session)?,
            RootKeyring::User => Keyring::special(backend, SpecialKeyring::User)?,
            RootKeyring::UserSession => Keyring::special(backend, SpecialKeyring::UserSession)?,
        };
        debug!(root = root.serial(), kind = ?section.root, "opened credential store");
        Ok(Self::new(root, KeyringLayout::from(section)))
    }

    pub fn root(&self) -> &Keyring {
        &self.root
    }

    pub fn layout(&self) -> &KeyringLayout {
        &self.layout
    }

    /// The namespace keyring, created on first use.
    pub fn namespace_keyring(&self) -> Result<Keyring> {
        navigator::get_or_create_keyring(&self.root, &self.layout.namespace)
    }

    /// The per-user keyring, created on first use.
    pub fn user_keyring(&self, username: &str) -> Result<Keyring> {
        validate_username(username)?;
        navigator::path(&self.root, &[self.layout.namespace.as_str(), username])
    }

    fn class_path<'a>(&'a self, username: &'a str) -> Result<[&'a str; 3]> {
        validate_username(username)?;
        Ok([
            self.layout.namespace.as_str(),
            username,
            self.layout.credential_class.as_str(),
        ])
    }

    /// Replace the stored credential set of `username` with `records`.
    ///
    /// Revoked and already-expired records are left out. Records with a
    /// future expiry get a kernel timeout so they vanish on their own.
    pub fn commit(
        &self,
        username: &str,
        records: &[CredentialRecord],
        encrypt: &dyn PayloadTransform,
    ) -> Result<CommitSummary> {
        if let Some(stray) = records.iter().find(|r| r.username != username) {
            return Err(KeyringError::InvalidArgument(format!(
                "record {} belongs to '{}', not '{}'",
                stray.record_id, stray.username, username
            )));
        }

        let ring = navigator::path(&self.root, &self.class_path(username)?)?;
        ring.clear()?;

        let now = chrono::Utc::now().timestamp();
        let mut summary = CommitSummary::default();
        for record in records {
            let timeout = match record.disposition(now) {
                ExpiryDisposition::Revoked => {
                    summary.skipped_revoked += 1;
                    continue;
                }
                ExpiryDisposition::Expired => {
                    summary.skipped_expired += 1;
                    continue;
                }
                ExpiryDisposition::Permanent => None,
                ExpiryDisposition::Expires(duration) => Some(duration),
            };

            let plain = Zeroizing::new(serde_json::to_string(record).map_err(|e| {
                KeyringError::InvalidArgument(format!("serialize record {}: {}", record.record_id, e))
            })?);
            let sealed = Zeroizing::new(
                encrypt
                    .transform(&plain)
                    .map_err(|e| KeyringError::Transform(format!("record {}: {}", record.record_id, e)))?,
            );
            let key = ring.add_key(&record.key_description(), sealed.as_bytes())?;
            if let Some(duration) = timeout {
                if let Err(e) = key.set_expiry(duration) {
                    discard(&ring, &key);
                    return Err(e);
                }
            }
            summary.stored += 1;
        }

        info!(
            username,
            stored = summary.stored,
            skipped_revoked = summary.skipped_revoked,
            skipped_expired = summary.skipped_expired,
            "committed credentials"
        );
        Ok(summary)
    }

    /// Decrypt and return the live credential set of `username`.
    ///
    /// Fails with `NotFound` if the user never had a commit. Expired and
    /// revoked leaves are unlinked along the way. Any payload that cannot be
    /// decrypted or parsed fails the whole call.
    pub fn dump(&self, username: &str, decrypt: &dyn PayloadTransform) -> Result<Vec<CredentialRecord>> {
        let ring = navigator::find_path(&self.root, &self.class_path(username)?)?;
        let mut records = Vec::new();
        for key in leaves(&ring)? {
            let payload = match key.read_payload() {
                Ok(payload) => payload,
                Err(e) if e.is_not_found() => {
                    debug!(serial = key.serial(), "credential vanished before read");
                    continue;
                }
                Err(e) => return Err(e),
            };
            records.push(decode_record(&key, &payload, username, decrypt)?);
        }
        debug!(username, count = records.len(), "dumped credentials");
        Ok(records)
    }

    /// Drop every stored credential of `username`, keeping the user keyring.
    pub fn clear_user(&self, username: &str) -> Result<()> {
        match navigator::find_path(&self.root, &self.class_path(username)?) {
            Ok(ring) => {
                ring.clear()?;
                info!(username, "cleared credentials");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Clear the credential-class keyring of every user under the namespace.
    ///
    /// Returns how many were cleared. Dead user keyrings are unlinked while
    /// walking the namespace.
    pub fn clear_all(&self) -> Result<usize> {
        let namespace = match self.find_namespace()? {
            Some(ring) => ring,
            None => return Ok(0),
        };

        let mut cleared = 0;
        for handle in namespace.iter(PruneOptions::prune_all())? {
            let user = match handle? {
                Handle::Keyring(ring) => ring,
                Handle::Key(key) => {
                    warn!(serial = key.serial(), description = key.description(), "skipping non-keyring entry in namespace");
                    continue;
                }
            };
            match navigator::child_keyring(&user, &self.layout.credential_class) {
                Ok(class) => {
                    class.clear()?;
                    cleared += 1;
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        info!(cleared, "cleared all credentials");
        Ok(cleared)
    }

    /// Usernames with a keyring under the namespace.
    pub fn users(&self) -> Result<Vec<String>> {
        let Some(namespace) = self.find_namespace()? else {
            return Ok(Vec::new());
        };
        let mut users = Vec::new();
        for handle in namespace.iter(PruneOptions::prune_all())? {
            if let Handle::Keyring(ring) = handle? {
                users.push(ring.description().to_string());
            }
        }
        Ok(users)
    }

    /// Live leaf keys of `username` without decrypting them.
    pub fn entries(&self, username: &str) -> Result<Vec<Key>> {
        let ring = navigator::find_path(&self.root, &self.class_path(username)?)?;
        leaves(&ring)
    }

    fn find_namespace(&self) -> Result<Option<Keyring>> {
        match navigator::find_path(&self.root, &[self.layout.namespace.as_str()]) {
            Ok(ring) => Ok(Some(ring)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Usernames become keyring descriptions, and describe output is split on
/// `;`, so those and control characters are refused.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(KeyringError::InvalidArgument("username cannot be empty".into()));
    }
    if username.contains(';') || username.chars().any(char::is_control) {
        return Err(KeyringError::InvalidArgument(format!(
            "username {:?} cannot contain ';' or control characters",
            username
        )));
    }
    Ok(())
}

/// Undo a half-written leaf so it cannot outlive its record's expiry.
fn discard(ring: &Keyring, key: &Key) {
    if let Err(e) = ring.unlink(key) {
        warn!(serial = key.serial(), error = %e, "unlink of partially stored credential failed");
    }
    if let Err(e) = key.invalidate() {
        debug!(serial = key.serial(), error = %e, "invalidate of partially stored credential failed");
    }
}

/// Leaf keys of a credential-class keyring, pruning dead ones.
fn leaves(ring: &Keyring) -> Result<Vec<Key>> {
    let mut keys = Vec::new();
    for handle in ring.iter(PruneOptions::prune_all())? {
        match handle? {
            Handle::Key(key) => keys.push(key),
            Handle::Keyring(nested) => {
                warn!(
                    serial = nested.serial(),
                    description = nested.description(),
                    "skipping nested keyring in credential keyring"
                );
            }
        }
    }
    Ok(keys)
}

fn decode_record(
    key: &Key,
    payload: &[u8],
    username: &str,
    decrypt: &dyn PayloadTransform,
) -> Result<CredentialRecord> {
    let corrupt = |what: String| KeyringError::Corrupt(format!("key {} ({}): {}", key.serial(), key.description(), what));

    let sealed = std::str::from_utf8(payload).map_err(|_| corrupt("payload is not UTF-8".into()))?;
    let plain = Zeroizing::new(
        decrypt
            .transform(sealed)
            .map_err(|e| corrupt(format!("decrypt failed: {}", e)))?,
    );
    let record: CredentialRecord =
        serde_json::from_str(&plain).map_err(|e| corrupt(format!("invalid record: {}", e)))?;

    if record.key_description() != key.description() {
        return Err(corrupt(format!("payload carries record id {}", record.record_id)));
    }
    if record.username != username {
        return Err(corrupt(format!("payload belongs to '{}'", record.username)));
    }
    Ok(record)
}
