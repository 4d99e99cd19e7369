//! Capability surface of the kernel key-management facility.
//!
//! Every call reports failure as a raw [`Errno`] so that the kernel and the
//! in-memory model share one error vocabulary. The handle layer maps these
//! into [`crate::error::KeyringError`].

use crate::constants;
use nix::errno::Errno;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kernel-assigned key identity.
pub type KeySerial = i32;

/// Kind of kernel object behind a serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Leaf holding one opaque payload.
    User,
    /// Container of links to other keys.
    Keyring,
    /// Like `user`, but the payload cannot be read back from userspace.
    Logon,
    /// Large payload, possibly spilled to shmem by the kernel.
    BigKey,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::User => constants::KEY_TYPE_USER,
            KeyType::Keyring => constants::KEY_TYPE_KEYRING,
            KeyType::Logon => constants::KEY_TYPE_LOGON,
            KeyType::BigKey => constants::KEY_TYPE_BIG_KEY,
        }
    }

    /// Every type except `keyring` is a leaf.
    pub fn is_leaf(&self) -> bool {
        *self != KeyType::Keyring
    }

    /// Largest payload the kernel accepts at creation, if bounded here.
    pub fn max_payload(&self) -> Option<usize> {
        match self {
            KeyType::User | KeyType::Logon => Some(constants::MAX_USER_PAYLOAD),
            KeyType::BigKey => Some(constants::MAX_BIG_KEY_PAYLOAD),
            KeyType::Keyring => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            constants::KEY_TYPE_USER => Ok(KeyType::User),
            constants::KEY_TYPE_KEYRING => Ok(KeyType::Keyring),
            constants::KEY_TYPE_LOGON => Ok(KeyType::Logon),
            constants::KEY_TYPE_BIG_KEY => Ok(KeyType::BigKey),
            other => Err(format!("unexpected key type '{}'", other)),
        }
    }
}

/// Keyrings the kernel attaches to every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKeyring {
    Thread,
    Process,
    Session,
    User,
    UserSession,
}

impl SpecialKeyring {
    /// The `KEY_SPEC_*` identifier understood by keyctl.
    pub fn id(&self) -> KeySerial {
        match self {
            SpecialKeyring::Thread => -1,
            SpecialKeyring::Process => -2,
            SpecialKeyring::Session => -3,
            SpecialKeyring::User => -4,
            SpecialKeyring::UserSession => -5,
        }
    }
}

pub trait KeyBackend: Send + Sync + fmt::Debug {
    /// Create (or, for an existing `user` key, update) a key linked into `keyring`.
    fn add_key(
        &self,
        key_type: KeyType,
        description: &str,
        payload: &[u8],
        keyring: KeySerial,
    ) -> Result<KeySerial, Errno>;

    /// Recursive search below `keyring`. Never creates anything.
    fn search(
        &self,
        keyring: KeySerial,
        key_type: KeyType,
        description: &str,
    ) -> Result<KeySerial, Errno>;

    /// Search the caller's attached keyrings.
    fn request_key(&self, key_type: KeyType, description: &str) -> Result<KeySerial, Errno>;

    /// Raw `type;uid;gid;perm;description` string.
    fn describe(&self, serial: KeySerial) -> Result<String, Errno>;

    /// Payload of a leaf, or the native-endian serial array of a keyring.
    fn read(&self, serial: KeySerial) -> Result<Vec<u8>, Errno>;

    /// Size of what [`KeyBackend::read`] would return. Used to probe liveness.
    fn payload_len(&self, serial: KeySerial) -> Result<usize, Errno>;

    /// Time left before the key expires; `None` when it has no timeout.
    /// An already expired key reports zero.
    fn expiry(&self, serial: KeySerial) -> Result<Option<Duration>, Errno>;

    /// Schedule removal after `seconds`; zero cancels the timeout.
    fn set_timeout(&self, serial: KeySerial, seconds: u32) -> Result<(), Errno>;

    fn revoke(&self, serial: KeySerial) -> Result<(), Errno>;

    fn invalidate(&self, serial: KeySerial) -> Result<(), Errno>;

    /// Unlink every direct child of `keyring`.
    fn clear(&self, keyring: KeySerial) -> Result<(), Errno>;

    fn link(&self, serial: KeySerial, keyring: KeySerial) -> Result<(), Errno>;

    fn unlink(&self, serial: KeySerial, keyring: KeySerial) -> Result<(), Errno>;

    /// Persistent keyring of `uid` (caller's uid when `None`).
    fn persistent_keyring(&self, uid: Option<u32>) -> Result<KeySerial, Errno>;

    fn special_keyring(&self, id: SpecialKeyring, create: bool) -> Result<KeySerial, Errno>;
}

/// Decode the serial array returned by reading a keyring.
pub fn decode_serials(buf: &[u8]) -> Result<Vec<KeySerial>, Errno> {
    const WIDTH: usize = std::mem::size_of::<KeySerial>();
    if buf.len() % WIDTH != 0 {
        return Err(Errno::EINVAL);
    }
    Ok(buf
        .chunks_exact(WIDTH)
        .map(|c| KeySerial::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn encode_serials(serials: &[KeySerial]) -> Vec<u8> {
    serials.iter().flat_map(|s| s.to_ne_bytes()).collect()
}
