//! Error taxonomy for keyring operations.

use nix::errno::Errno;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyringError>;

#[derive(Debug, Error)]
pub enum KeyringError {
    /// Lookup miss, stale serial, or an entry that expired/was revoked.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Per-user key quota exhausted. Never retried.
    #[error("key quota exhausted: {0}")]
    ResourceLimit(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Decrypt or deserialize failure while reading stored credentials.
    #[error("corrupt credential payload: {0}")]
    Corrupt(String),

    /// The encrypt hook rejected a payload during commit.
    #[error("payload transform failed: {0}")]
    Transform(String),

    #[error("{context}: {source}")]
    Os {
        context: String,
        #[source]
        source: Errno,
    },
}

impl KeyringError {
    /// Map a kernel errno into the taxonomy, keeping `context` for the message.
    pub fn from_errno(errno: Errno, context: impl Into<String>) -> Self {
        let context = context.into();
        match errno {
            Errno::ENOKEY | Errno::ENOENT | Errno::EKEYEXPIRED | Errno::EKEYREVOKED => {
                Self::NotFound(format!("{} ({})", context, errno.desc()))
            }
            Errno::EEXIST => Self::AlreadyExists(context),
            Errno::EDQUOT => Self::ResourceLimit(context),
            Errno::EACCES | Errno::EPERM => Self::PermissionDenied(context),
            Errno::EINVAL | Errno::ENOTDIR => {
                Self::InvalidArgument(format!("{} ({})", context, errno.desc()))
            }
            source => Self::Os { context, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_keys_map_to_not_found() {
        for errno in [Errno::ENOKEY, Errno::EKEYEXPIRED, Errno::EKEYREVOKED, Errno::ENOENT] {
            assert!(KeyringError::from_errno(errno, "read").is_not_found());
        }
    }

    #[test]
    fn test_quota_and_permission_mapping() {
        assert!(matches!(
            KeyringError::from_errno(Errno::EDQUOT, "add"),
            KeyringError::ResourceLimit(_)
        ));
        assert!(matches!(
            KeyringError::from_errno(Errno::EACCES, "read"),
            KeyringError::PermissionDenied(_)
        ));
        assert!(matches!(
            KeyringError::from_errno(Errno::EEXIST, "add"),
            KeyringError::AlreadyExists(_)
        ));
    }

    #[test]
    fn test_unmapped_errno_keeps_source() {
        match KeyringError::from_errno(Errno::ENOMEM, "read 42") {
            KeyringError::Os { context, source } => {
                assert_eq!(context, "read 42");
                assert_eq!(source, Errno::ENOMEM);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
