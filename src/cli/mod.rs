//! CLI routing and command dispatch.

use crate::core::{config, lifecycle};
use crate::core::{CommandTransform, CredentialStore};
use crate::models::store_config::StoreConfig;
use crate::util::privilege;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

pub mod clear;
pub mod commit;
pub mod dump;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub config: StoreConfig,
}

impl CliContext {
    pub fn store(&self) -> Result<CredentialStore> {
        CredentialStore::open(&self.config).context("open credential keyring")
    }

    pub fn encrypt(&self) -> CommandTransform {
        CommandTransform::new(self.config.transform.encrypt.clone())
    }

    pub fn decrypt(&self) -> CommandTransform {
        CommandTransform::new(self.config.transform.decrypt.clone())
    }
}

#[derive(Parser, Debug)]
#[command(name = "apikey-keyring", version, about = "Kernel keyring cache for API key credentials")]
pub struct Cli {
    /// Configuration file (falls back to $APIKEY_KEYRING_CONFIG, then
    /// /etc/apikey-keyring.toml if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config_path = config::resolve_path(self.config);
        debug!(config = ?config_path, "loading configuration");
        let config = config::load(config_path.as_deref())?;
        let ctx = CliContext { config };

        if self.command.requires_root() {
            privilege::require_root(self.command.name())?;
        }

        match self.command {
            Commands::Commit(args) => commit::run(&ctx, args),
            Commands::Dump(args) => dump::run_dump(&ctx, args),
            Commands::List(args) => dump::run_list(&ctx, args),
            Commands::Users => dump::run_users(&ctx),
            Commands::Clear(args) => clear::run_clear(&ctx, args),
            Commands::ClearAll => clear::run_clear_all(&ctx),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replace a user's cached credentials with records read as JSON
    Commit(commit::CommitArgs),
    /// Decrypt and show a user's cached credentials
    Dump(dump::DumpArgs),
    /// Show key metadata of a user's cached credentials (no decryption)
    List(dump::ListArgs),
    /// List users that have a keyring in the cache
    Users,
    /// Drop a user's cached credentials
    Clear(clear::ClearArgs),
    /// Drop the cached credentials of every user
    ClearAll,
}

impl Commands {
    /// Whether this command requires root privileges.
    pub fn requires_root(&self) -> bool {
        matches!(self, Commands::Commit(_) | Commands::Clear(_) | Commands::ClearAll)
    }

    /// Command name for error messages.
    pub fn name(&self) -> &str {
        match self {
            Commands::Commit(_) => "commit",
            Commands::Dump(_) => "dump",
            Commands::List(_) => "list",
            Commands::Users => "users",
            Commands::Clear(_) => "clear",
            Commands::ClearAll => "clear-all",
        }
    }
}

/// clap value parser over [`lifecycle::validate_username`].
pub(crate) fn parse_username(s: &str) -> Result<String, String> {
    lifecycle::validate_username(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commit() {
        let cli = Cli::try_parse_from(["apikey-keyring", "commit", "admin", "--from", "-"]).unwrap();
        assert!(cli.command.requires_root());
        assert_eq!(cli.command.name(), "commit");
    }

    #[test]
    fn test_read_commands_do_not_require_root() {
        let cli = Cli::try_parse_from(["apikey-keyring", "list", "admin"]).unwrap();
        assert!(!cli.command.requires_root());
        let cli = Cli::try_parse_from(["apikey-keyring", "users"]).unwrap();
        assert!(!cli.command.requires_root());
    }

    #[test]
    fn test_clear_all_subcommand_name() {
        let cli = Cli::try_parse_from(["apikey-keyring", "clear-all"]).unwrap();
        assert_eq!(cli.command.name(), "clear-all");
    }

    #[test]
    fn test_parse_username() {
        assert!(parse_username("admin").is_ok());
        assert!(parse_username("").is_err());
        assert!(parse_username("a;b").is_err());
        assert!(parse_username("a\nb").is_err());
    }
}
