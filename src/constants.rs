//! Centralized constants for keyring names, limits, and defaults.

/// Namespace keyring that isolates our entries under the root keyring.
pub const DEFAULT_NAMESPACE: &str = "API_KEY_CACHE";

/// Credential-class sub-keyring holding API keys inside a user keyring.
pub const DEFAULT_CREDENTIAL_CLASS: &str = "API_KEYS";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/apikey-keyring.toml";

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "APIKEY_KEYRING_CONFIG";

/// Kernel type string for leaf keys holding opaque payloads.
pub const KEY_TYPE_USER: &str = "user";

/// Kernel type string for keyrings.
pub const KEY_TYPE_KEYRING: &str = "keyring";

/// Kernel type string for `logon` keys (write-only payloads).
pub const KEY_TYPE_LOGON: &str = "logon";

/// Kernel type string for `big_key` keys.
pub const KEY_TYPE_BIG_KEY: &str = "big_key";

/// Maximum payload the kernel accepts for a `big_key` key (1 MiB).
pub const MAX_BIG_KEY_PAYLOAD: usize = 1_048_576;

/// Maximum payload the kernel accepts for a `user` or `logon` key.
pub const MAX_USER_PAYLOAD: usize = 32_767;

/// Credential name passed to systemd-creds by the default transforms.
pub const SYSTEMD_CREDENTIAL_NAME: &str = "apikey";

/// Maximum size of a records file accepted by `commit` (1 MiB).
pub const MAX_RECORDS_INPUT: usize = 1_048_576;

/// Procfs listing of keys viewable by the caller, with their timeouts.
pub const PROC_KEYS_PATH: &str = "/proc/keys";
