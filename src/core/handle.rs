//! Typed handles over kernel keys and keyrings.
//!
//! A [`Key`] pairs a serial with the metadata parsed from the kernel's
//! describe string. A [`Keyring`] is a `Key` whose type has been checked to
//! be `keyring`; only keyrings expose child operations. Search and
//! enumeration yield a [`Handle`], the tagged union of the two.

use super::backend::{decode_serials, KeyBackend, KeySerial, KeyType, SpecialKeyring};
use super::iter::{KeyringIter, PruneOptions};
use crate::error::{KeyringError, Result};
use std::str::FromStr;
use std::sync::Arc;
use nix::errno::Errno;
use std::time::{Duration, SystemTime};
use tracing::debug;
use zeroize::Zeroizing;

/// Metadata reported by `KEYCTL_DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    pub key_type: KeyType,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub permissions: Option<u32>,
    pub description: String,
}

impl FromStr for KeyDescription {
    type Err = KeyringError;

    /// Parse `type;uid;gid;perm;description`. The description is whatever
    /// follows the last separator, since newer kernels may insert fields.
    fn from_str(raw: &str) -> Result<Self> {
        let (head, description) = raw
            .rsplit_once(';')
            .ok_or_else(|| KeyringError::InvalidArgument(format!("malformed key description '{}'", raw)))?;
        let mut fields = head.split(';');
        let key_type = fields
            .next()
            .unwrap_or_default()
            .parse::<KeyType>()
            .map_err(KeyringError::InvalidArgument)?;
        let uid = fields.next().and_then(|v| v.parse().ok());
        let gid = fields.next().and_then(|v| v.parse().ok());
        let permissions = fields.next().and_then(|v| u32::from_str_radix(v, 16).ok());
        Ok(Self {
            key_type,
            uid,
            gid,
            permissions,
            description: description.to_string(),
        })
    }
}

/// A kernel key of any type.
#[derive(Debug, Clone)]
pub struct Key {
    backend: Arc<dyn KeyBackend>,
    serial: KeySerial,
    meta: KeyDescription,
}

impl Key {
    /// Build a handle for an existing serial by describing it.
    pub fn load(backend: Arc<dyn KeyBackend>, serial: KeySerial) -> Result<Self> {
        let raw = backend
            .describe(serial)
            .map_err(|e| KeyringError::from_errno(e, format!("describe key {}", serial)))?;
        let meta = raw.parse()?;
        Ok(Self { backend, serial, meta })
    }

    pub fn serial(&self) -> KeySerial {
        self.serial
    }

    pub fn key_type(&self) -> KeyType {
        self.meta.key_type
    }

    pub fn description(&self) -> &str {
        &self.meta.description
    }

    pub fn uid(&self) -> Option<u32> {
        self.meta.uid
    }

    pub fn gid(&self) -> Option<u32> {
        self.meta.gid
    }

    pub fn permissions(&self) -> Option<u32> {
        self.meta.permissions
    }

    pub fn metadata(&self) -> &KeyDescription {
        &self.meta
    }

    pub fn is_keyring(&self) -> bool {
        self.meta.key_type == KeyType::Keyring
    }

    pub(crate) fn backend(&self) -> &Arc<dyn KeyBackend> {
        &self.backend
    }

    /// Read the payload of a leaf key.
    ///
    /// Fails with `NotFound` once the key has been revoked, invalidated or
    /// has expired, even though this handle is still held.
    pub fn read_payload(&self) -> Result<Zeroizing<Vec<u8>>> {
        if self.is_keyring() {
            return Err(KeyringError::InvalidArgument(format!(
                "cannot read data from keyring {}",
                self.serial
            )));
        }
        self.backend
            .read(self.serial)
            .map(Zeroizing::new)
            .map_err(|e| KeyringError::from_errno(e, format!("read key {}", self.serial)))
    }

    /// Schedule automatic removal after `duration`, replacing any prior
    /// schedule. A zero duration cancels the timeout.
    pub fn set_expiry(&self, duration: Duration) -> Result<()> {
        let seconds = u32::try_from(duration.as_secs()).unwrap_or(u32::MAX);
        // Round sub-second requests up so they still expire.
        let seconds = if seconds == 0 && !duration.is_zero() { 1 } else { seconds };
        self.backend
            .set_timeout(self.serial, seconds)
            .map_err(|e| KeyringError::from_errno(e, format!("set timeout on key {}", self.serial)))
    }

    /// Whether the kernel now reports this key as revoked.
    ///
    /// A revoked key stays linked until pruned, so this is observed rather
    /// than remembered. Expired keys report `false`.
    pub fn is_revoked(&self) -> Result<bool> {
        match self.backend.payload_len(self.serial) {
            Err(Errno::EKEYREVOKED) => Ok(true),
            // Readability is not the question here.
            Ok(_) | Err(Errno::EKEYEXPIRED) | Err(Errno::EOPNOTSUPP) | Err(Errno::EACCES) => Ok(false),
            Err(e) => Err(KeyringError::from_errno(e, format!("probe key {}", self.serial))),
        }
    }

    /// Absolute time the kernel will expire this key, or `None` if it has no
    /// timeout.
    pub fn expires_at(&self) -> Result<Option<SystemTime>> {
        let remaining = self
            .backend
            .expiry(self.serial)
            .map_err(|e| KeyringError::from_errno(e, format!("query timeout of key {}", self.serial)))?;
        Ok(remaining.map(|left| SystemTime::now() + left))
    }

    pub fn revoke(&self) -> Result<()> {
        debug!(serial = self.serial, "revoking key");
        self.backend
            .revoke(self.serial)
            .map_err(|e| KeyringError::from_errno(e, format!("revoke key {}", self.serial)))
    }

    pub fn invalidate(&self) -> Result<()> {
        debug!(serial = self.serial, "invalidating key");
        self.backend
            .invalidate(self.serial)
            .map_err(|e| KeyringError::from_errno(e, format!("invalidate key {}", self.serial)))
    }
}

/// A key whose type is `keyring`.
#[derive(Debug, Clone)]
pub struct Keyring {
    key: Key,
}

impl Keyring {
    pub fn from_key(key: Key) -> Result<Self> {
        if !key.is_keyring() {
            return Err(KeyringError::InvalidArgument(format!(
                "key {} has type '{}', expected 'keyring'",
                key.serial,
                key.key_type()
            )));
        }
        Ok(Self { key })
    }

    pub fn load(backend: Arc<dyn KeyBackend>, serial: KeySerial) -> Result<Self> {
        Self::from_key(Key::load(backend, serial)?)
    }

    /// The persistent keyring of `uid` (the caller when `None`).
    pub fn persistent(backend: Arc<dyn KeyBackend>, uid: Option<u32>) -> Result<Self> {
        let serial = backend
            .persistent_keyring(uid)
            .map_err(|e| KeyringError::from_errno(e, "get persistent keyring"))?;
        Self::load(backend, serial)
    }

    /// One of the keyrings attached to the calling process, created on demand.
    pub fn special(backend: Arc<dyn KeyBackend>, id: SpecialKeyring) -> Result<Self> {
        let serial = backend
            .special_keyring(id, true)
            .map_err(|e| KeyringError::from_errno(e, format!("get {:?} keyring", id)))?;
        Self::load(backend, serial)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn serial(&self) -> KeySerial {
        self.key.serial
    }

    pub fn description(&self) -> &str {
        self.key.description()
    }

    pub fn search(&self, kind: KeyType, description: &str) -> Result<Handle> {
        search(self, kind, description)
    }

    /// Create a `user` key holding `payload` under this keyring.
    pub fn add_key(&self, description: &str, payload: &[u8]) -> Result<Key> {
        create_key(KeyType::User, description, payload, self)
    }

    pub fn add_keyring(&self, description: &str) -> Result<Keyring> {
        create_keyring(description, self)
    }

    pub fn link(&self, key: &Key) -> Result<()> {
        self.key
            .backend
            .link(key.serial, self.serial())
            .map_err(|e| KeyringError::from_errno(e, format!("link key {} into {}", key.serial, self.serial())))
    }

    pub fn unlink(&self, key: &Key) -> Result<()> {
        self.unlink_serial(key.serial)
    }

    pub(crate) fn unlink_serial(&self, serial: KeySerial) -> Result<()> {
        self.key
            .backend
            .unlink(serial, self.serial())
            .map_err(|e| KeyringError::from_errno(e, format!("unlink key {} from {}", serial, self.serial())))
    }

    /// Unlink all direct children in one kernel operation. Nested keyrings
    /// keep their own children.
    pub fn clear(&self) -> Result<()> {
        debug!(serial = self.serial(), description = self.description(), "clearing keyring");
        self.key
            .backend
            .clear(self.serial())
            .map_err(|e| KeyringError::from_errno(e, format!("clear keyring {}", self.serial())))
    }

    /// Serials currently linked into this keyring, in kernel order.
    pub fn child_serials(&self) -> Result<Vec<KeySerial>> {
        let context = || format!("read keyring {}", self.serial());
        let buf = self
            .key
            .backend
            .read(self.serial())
            .map_err(|e| KeyringError::from_errno(e, context()))?;
        decode_serials(&buf).map_err(|e| KeyringError::from_errno(e, context()))
    }

    /// Lazily enumerate direct children, pruning per `options`.
    pub fn iter(&self, options: PruneOptions) -> Result<KeyringIter> {
        KeyringIter::new(self.clone(), options)
    }

    /// Eager counterpart of [`Keyring::iter`] with identical filtering.
    pub fn list(&self, options: PruneOptions) -> Result<Vec<Handle>> {
        self.iter(options)?.collect()
    }

    pub fn revoke(&self) -> Result<()> {
        self.key.revoke()
    }

    pub fn invalidate(&self) -> Result<()> {
        self.key.invalidate()
    }
}

/// Either kind of kernel object, tagged by type.
#[derive(Debug, Clone)]
pub enum Handle {
    Key(Key),
    Keyring(Keyring),
}

impl Handle {
    pub fn load(backend: Arc<dyn KeyBackend>, serial: KeySerial) -> Result<Self> {
        let key = Key::load(backend, serial)?;
        Ok(if key.is_keyring() {
            Handle::Keyring(Keyring { key })
        } else {
            Handle::Key(key)
        })
    }

    pub fn key(&self) -> &Key {
        match self {
            Handle::Key(key) => key,
            Handle::Keyring(ring) => ring.key(),
        }
    }

    pub fn serial(&self) -> KeySerial {
        self.key().serial()
    }

    pub fn key_type(&self) -> KeyType {
        self.key().key_type()
    }

    pub fn description(&self) -> &str {
        self.key().description()
    }

    pub fn into_keyring(self) -> Result<Keyring> {
        match self {
            Handle::Keyring(ring) => Ok(ring),
            Handle::Key(key) => Keyring::from_key(key),
        }
    }

    pub fn into_key(self) -> Key {
        match self {
            Handle::Key(key) => key,
            Handle::Keyring(ring) => ring.key,
        }
    }
}

fn check_description(description: &str) -> Result<()> {
    if description.is_empty() {
        return Err(KeyringError::InvalidArgument("key description cannot be empty".into()));
    }
    Ok(())
}

/// Create a leaf key under `parent`. Keyrings must go through
/// [`create_keyring`]; asking for one here is a programming error.
pub fn create_key(kind: KeyType, description: &str, payload: &[u8], parent: &Keyring) -> Result<Key> {
    if kind == KeyType::Keyring {
        return Err(KeyringError::InvalidArgument(
            "cannot create keyring with create_key, use create_keyring instead".into(),
        ));
    }
    check_description(description)?;
    if let Some(max) = kind.max_payload().filter(|max| payload.len() > *max) {
        return Err(KeyringError::InvalidArgument(format!(
            "payload of {} bytes exceeds the {} byte limit for {} keys",
            payload.len(),
            max,
            kind
        )));
    }
    let backend = parent.key.backend.clone();
    let serial = backend
        .add_key(kind, description, payload, parent.serial())
        .map_err(|e| KeyringError::from_errno(e, format!("add key '{}' to {}", description, parent.serial())))?;
    debug!(serial, description, parent = parent.serial(), "created key");
    Key::load(backend, serial)
}

pub fn create_keyring(description: &str, parent: &Keyring) -> Result<Keyring> {
    check_description(description)?;
    let backend = parent.key.backend.clone();
    let serial = backend
        .add_key(KeyType::Keyring, description, &[], parent.serial())
        .map_err(|e| {
            KeyringError::from_errno(e, format!("add keyring '{}' to {}", description, parent.serial()))
        })?;
    debug!(serial, description, parent = parent.serial(), "created keyring");
    Keyring::load(backend, serial)
}

/// Read-only lookup below `parent`, direct or through nested keyrings.
pub fn search(parent: &Keyring, kind: KeyType, description: &str) -> Result<Handle> {
    check_description(description)?;
    let backend = parent.key.backend.clone();
    let serial = backend.search(parent.serial(), kind, description).map_err(|e| {
        KeyringError::from_errno(e, format!("search {} '{}' in {}", kind, description, parent.serial()))
    })?;
    Handle::load(backend, serial)
}

/// Look a key up through the caller's attached keyrings.
pub fn request_key(backend: Arc<dyn KeyBackend>, kind: KeyType, description: &str) -> Result<Handle> {
    check_description(description)?;
    let serial = backend
        .request_key(kind, description)
        .map_err(|e| KeyringError::from_errno(e, format!("request {} '{}'", kind, description)))?;
    Handle::load(backend, serial)
}
