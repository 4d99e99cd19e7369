//! Enumeration of keyring children with optional pruning.
//!
//! The child list is snapshotted when the iterator is built. Each serial is
//! probed only when visited, and the unlink decision for an expired or
//! revoked child is taken at that moment. Independent iterators over the same
//! keyring therefore never share state; a child removed by one of them is
//! simply skipped by the others.

use super::backend::KeySerial;
use super::handle::{Handle, Keyring};
use crate::error::{KeyringError, Result};
use nix::errno::Errno;
use std::vec::IntoIter;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOptions {
    /// Unlink children whose kernel timeout has passed.
    pub unlink_expired: bool,
    /// Unlink children that have been revoked.
    pub unlink_revoked: bool,
}

impl PruneOptions {
    /// Skip dead children without touching the keyring.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn prune_all() -> Self {
        Self {
            unlink_expired: true,
            unlink_revoked: true,
        }
    }
}

/// One-shot cursor over a keyring's direct children.
///
/// Dead children are never yielded. Ordering is whatever the kernel reports.
#[derive(Debug)]
pub struct KeyringIter {
    keyring: Keyring,
    serials: IntoIter<KeySerial>,
    options: PruneOptions,
}

impl KeyringIter {
    pub(crate) fn new(keyring: Keyring, options: PruneOptions) -> Result<Self> {
        let serials = keyring.child_serials()?.into_iter();
        Ok(Self {
            keyring,
            serials,
            options,
        })
    }
}

/// Unlink `serial` if `options` ask for it. Returns whether to skip it.
fn prune_dead(keyring: &Keyring, options: PruneOptions, serial: KeySerial, errno: Errno) -> bool {
    let prune = match errno {
        Errno::EKEYEXPIRED => options.unlink_expired,
        Errno::EKEYREVOKED => options.unlink_revoked,
        _ => return false,
    };
    if prune {
        match keyring.unlink_serial(serial) {
            Ok(()) => debug!(
                serial,
                keyring = keyring.serial(),
                reason = errno.desc(),
                "unlinked dead key"
            ),
            // Another caller may have removed it first.
            Err(e) => debug!(serial, error = %e, "prune unlink failed"),
        }
    }
    true
}

impl Iterator for KeyringIter {
    type Item = Result<Handle>;

    fn next(&mut self) -> Option<Self::Item> {
        let backend = self.keyring.key().backend().clone();
        for serial in self.serials.by_ref() {
            match backend.payload_len(serial) {
                Err(Errno::ENOKEY) => continue,
                Err(errno) if prune_dead(&self.keyring, self.options, serial, errno) => continue,
                _ => {}
            }

            match Handle::load(backend.clone(), serial) {
                Ok(handle) => return Some(Ok(handle)),
                // Removed between the probe and the describe.
                Err(KeyringError::NotFound(_)) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::SpecialKeyring;
    use crate::core::memory::MemoryBackend;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryBackend>, Keyring) {
        let backend = Arc::new(MemoryBackend::new());
        let root = Keyring::special(backend.clone(), SpecialKeyring::Process).unwrap();
        let ring = root.add_keyring("iter-test").unwrap();
        (backend, ring)
    }

    fn serials(handles: &[Handle]) -> BTreeSet<KeySerial> {
        handles.iter().map(Handle::serial).collect()
    }

    #[test]
    fn test_empty_keyring() {
        let (_backend, ring) = setup();
        assert_eq!(ring.iter(PruneOptions::none()).unwrap().count(), 0);
        assert!(ring.list(PruneOptions::prune_all()).unwrap().is_empty());
    }

    #[test]
    fn test_iter_matches_list() {
        let (_backend, ring) = setup();
        for i in 0..5 {
            ring.add_key(&format!("key_{}", i), b"x").unwrap();
        }
        let lazy: Vec<Handle> = ring
            .iter(PruneOptions::none())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let eager = ring.list(PruneOptions::none()).unwrap();
        assert_eq!(lazy.len(), 5);
        assert_eq!(serials(&lazy), serials(&eager));
    }

    #[test]
    fn test_dead_keys_skipped_without_flags() {
        let (_backend, ring) = setup();
        let live = ring.add_key("live", b"x").unwrap();
        let revoked = ring.add_key("revoked", b"x").unwrap();
        revoked.revoke().unwrap();

        let seen = ring.list(PruneOptions::none()).unwrap();
        assert_eq!(serials(&seen), BTreeSet::from([live.serial()]));
        // Still linked: nothing was pruned.
        assert_eq!(ring.child_serials().unwrap().len(), 2);
    }

    #[test]
    fn test_unlink_expired_removes_link() {
        let (backend, ring) = setup();
        let live = ring.add_key("live", b"x").unwrap();
        let expiring = ring.add_key("expiring", b"x").unwrap();
        expiring.set_expiry(Duration::from_secs(1)).unwrap();
        backend.advance(Duration::from_secs(2));

        let options = PruneOptions {
            unlink_expired: true,
            unlink_revoked: false,
        };
        let seen = ring.list(options).unwrap();
        assert_eq!(serials(&seen), BTreeSet::from([live.serial()]));
        assert_eq!(ring.child_serials().unwrap(), vec![live.serial()]);
        let plain = ring.list(PruneOptions::none()).unwrap();
        assert_eq!(serials(&plain), BTreeSet::from([live.serial()]));
    }

    #[test]
    fn test_unlink_revoked_only_touches_revoked() {
        let (backend, ring) = setup();
        let revoked = ring.add_key("revoked", b"x").unwrap();
        let expiring = ring.add_key("expiring", b"x").unwrap();
        revoked.revoke().unwrap();
        expiring.set_expiry(Duration::from_secs(1)).unwrap();
        backend.advance(Duration::from_secs(2));

        let options = PruneOptions {
            unlink_expired: false,
            unlink_revoked: true,
        };
        assert!(ring.list(options).unwrap().is_empty());
        assert_eq!(ring.child_serials().unwrap(), vec![expiring.serial()]);
    }

    #[test]
    fn test_unlink_decision_taken_per_visit() {
        let (_backend, ring) = setup();
        let first = ring.add_key("first", b"x").unwrap();
        let second = ring.add_key("second", b"x").unwrap();

        let mut iter = ring.iter(PruneOptions::prune_all()).unwrap();
        let visited = iter.next().unwrap().unwrap();
        assert_eq!(visited.serial(), first.serial());
        // Revoked after the snapshot but before it is visited.
        second.revoke().unwrap();
        assert!(iter.next().is_none());
        assert_eq!(ring.child_serials().unwrap(), vec![first.serial()]);
    }

    #[test]
    fn test_concurrent_iterators_are_independent() {
        let (_backend, ring) = setup();
        let keep = ring.add_key("keep", b"x").unwrap();
        let doomed = ring.add_key("doomed", b"x").unwrap();
        doomed.revoke().unwrap();

        let mut a = ring.iter(PruneOptions::prune_all()).unwrap();
        let mut b = ring.iter(PruneOptions::prune_all()).unwrap();
        let from_a: Vec<_> = a.by_ref().collect::<Result<_>>().unwrap();
        // `a` already unlinked the revoked key; `b` must tolerate the ENOENT.
        let from_b: Vec<_> = b.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(serials(&from_a), BTreeSet::from([keep.serial()]));
        assert_eq!(serials(&from_b), BTreeSet::from([keep.serial()]));
    }

    #[test]
    fn test_invalidated_key_skipped() {
        let (_backend, ring) = setup();
        let gone = ring.add_key("gone", b"x").unwrap();
        let kept = ring.add_key("kept", b"x").unwrap();
        let mut iter = ring.iter(PruneOptions::none()).unwrap();
        gone.invalidate().unwrap();
        let rest: Vec<_> = iter.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(serials(&rest), BTreeSet::from([kept.serial()]));
    }

    #[test]
    fn test_nested_keyrings_yielded_as_keyrings() {
        let (_backend, ring) = setup();
        ring.add_keyring("child").unwrap();
        let seen = ring.list(PruneOptions::none()).unwrap();
        assert!(matches!(seen.as_slice(), [Handle::Keyring(_)]));
    }
}
