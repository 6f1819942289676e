use serde::{Deserialize, Serialize};

/// Name of the config file looked up in the working directory
pub const CONFIG_FILE: &str = "ordertree.toml";

/// Configuration from ordertree.toml. Every table is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderTreeConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub ids: IdsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of per-filter records, relative to the config directory
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "subtasks".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a writer waits for the per-filter lock
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdsConfig {
    /// TOML file mapping local ids to stable ids, used by `--stable` and `export`
    #[serde(default)]
    pub table: Option<String>,
}
