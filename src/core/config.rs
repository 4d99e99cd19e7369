//! Configuration file resolution and loading.

use crate::constants;
use crate::models::store_config::StoreConfig;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the config path from CLI arg, env var, or the default location.
///
/// Returns `None` when nothing was requested and the default file is absent.
pub fn resolve_path(arg: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = arg {
        return Some(path);
    }
    if let Ok(path) = env::var(constants::CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let default = PathBuf::from(constants::DEFAULT_CONFIG_PATH);
    default.exists().then_some(default)
}

/// Load configuration, falling back to defaults when no file is in play.
pub fn load(path: Option<&Path>) -> Result<StoreConfig> {
    let Some(path) = path else {
        return Ok(StoreConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse(&content).with_context(|| format!("parse config {}", path.display()))
}

pub fn parse(content: &str) -> Result<StoreConfig> {
    let config: StoreConfig = toml::from_str(content)?;
    if config.keyring.namespace.is_empty() || config.keyring.credential_class.is_empty() {
        anyhow::bail!("keyring names cannot be empty");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::store_config::RootKeyring;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config.keyring.namespace, constants::DEFAULT_NAMESPACE);
        assert_eq!(config.keyring.credential_class, constants::DEFAULT_CREDENTIAL_CLASS);
        assert_eq!(config.keyring.root, RootKeyring::Persistent);
        assert_eq!(config.transform.encrypt[0], "systemd-creds");
        assert_eq!(config.transform.decrypt[1], "decrypt");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse("[keyring]\nroot = \"user-session\"\npersistent_uid = 0\n").unwrap();
        assert_eq!(config.keyring.root, RootKeyring::UserSession);
        assert_eq!(config.keyring.persistent_uid, Some(0));
        assert_eq!(config.keyring.namespace, constants::DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[keyring]\nnamespace = \"TEST_NS\"\n\n[transform]\nencrypt = [\"cat\"]\ndecrypt = [\"cat\"]"
        )
        .unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.keyring.namespace, "TEST_NS");
        assert_eq!(config.transform.encrypt, vec!["cat".to_string()]);
    }

    #[test]
    fn test_invalid_file_is_error() {
        assert!(parse("[keyring]\nroot = \"nowhere\"\n").is_err());
        assert!(parse("[keyring]\nnamespace = \"\"\n").is_err());
    }

    #[test]
    fn test_missing_requested_file_is_error() {
        assert!(load(Some(Path::new("/nonexistent/apikey-keyring.toml"))).is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(resolve_path(Some(path.clone())), Some(path));
    }
}
