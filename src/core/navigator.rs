//! Get-or-create navigation over nested keyrings.

use super::backend::KeyType;
use super::handle::{Handle, Keyring};
use super::iter::PruneOptions;
use crate::error::{KeyringError, Result};
use tracing::debug;

/// The keyring `description` linked directly into `parent`.
///
/// Kernel search descends into nested keyrings, so a hit may belong to a
/// grandchild with the same name. Only a direct link counts.
pub fn child_keyring(parent: &Keyring, description: &str) -> Result<Keyring> {
    let found = parent.search(KeyType::Keyring, description)?;
    if parent.child_serials()?.contains(&found.serial()) {
        return found.into_keyring();
    }
    debug!(
        description,
        parent = parent.serial(),
        nested = found.serial(),
        "search hit is not a direct child"
    );
    for handle in parent.iter(PruneOptions::none())? {
        if let Handle::Keyring(ring) = handle? {
            if ring.description() == description {
                return Ok(ring);
            }
        }
    }
    Err(KeyringError::NotFound(format!(
        "keyring '{}' in {}",
        description,
        parent.serial()
    )))
}

/// Find the keyring `description` below `parent`, creating it on a miss.
///
/// A concurrent creator may win the race between our search and our create;
/// the resulting "already exists" is resolved by searching again.
pub fn get_or_create_keyring(parent: &Keyring, description: &str) -> Result<Keyring> {
    match child_keyring(parent, description) {
        Ok(found) => Ok(found),
        Err(e) if e.is_not_found() => match parent.add_keyring(description) {
            Ok(created) => Ok(created),
            Err(KeyringError::AlreadyExists(_)) => {
                debug!(description, parent = parent.serial(), "lost keyring create race");
                child_keyring(parent, description)
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    }
}

/// Fold [`get_or_create_keyring`] over `segments`, materializing any missing
/// intermediate keyring.
pub fn path<S: AsRef<str>>(root: &Keyring, segments: &[S]) -> Result<Keyring> {
    segments.iter().try_fold(root.clone(), |parent, segment| {
        get_or_create_keyring(&parent, segment.as_ref())
    })
}

/// Read-only counterpart of [`path`]: fails with `NotFound` at the first
/// missing segment and never creates.
pub fn find_path<S: AsRef<str>>(root: &Keyring, segments: &[S]) -> Result<Keyring> {
    segments
        .iter()
        .try_fold(root.clone(), |parent, segment| child_keyring(&parent, segment.as_ref()))
}
