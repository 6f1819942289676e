use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::model::config::{CONFIG_FILE, OrderTreeConfig};
use crate::ops::id_map::IdTable;

/// Error type for configuration and id-table loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("no id table configured: set `table` under [ids] in ordertree.toml")]
    NoIdTable,
}

/// Id table file: `[ids]` maps local ids to stable ids. Later lines win
/// when two entries claim the same stable id.
#[derive(Debug, Default, Deserialize)]
struct IdTableFile {
    #[serde(default)]
    ids: IndexMap<String, String>,
}

/// Read ordertree.toml from `dir`. A missing file yields the defaults.
pub fn read_config(dir: &Path) -> Result<OrderTreeConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    match read_optional(&path)? {
        Some(text) => toml::from_str(&text).map_err(|source| ConfigError::ParseError { path, source }),
        None => Ok(OrderTreeConfig::default()),
    }
}

/// Directory holding the per-filter records
pub fn store_dir(dir: &Path, config: &OrderTreeConfig) -> PathBuf {
    dir.join(&config.store.path)
}

/// Load the id table named by the config
pub fn load_id_table(dir: &Path, config: &OrderTreeConfig) -> Result<IdTable, ConfigError> {
    let file = config.ids.table.as_ref().ok_or(ConfigError::NoIdTable)?;
    read_id_table(&dir.join(file))
}

pub fn read_id_table(path: &Path) -> Result<IdTable, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let file: IdTableFile = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.ids.into_iter().collect())
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}
