//! Effective-uid checks for commands that mutate the keyring tree.

use anyhow::{bail, Result};

/// Whether the process runs with euid 0.
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Bail unless running as root. The persistent keyring of uid 0 is shared
/// by every root process, so only root may write credentials into it.
pub fn require_root(command: &str) -> Result<()> {
    if !is_root() {
        bail!("'{}' modifies the credential cache and must run as root", command);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_root_matches_euid() {
        assert_eq!(require_root("commit").is_ok(), is_root());
    }
}
