use std::fs;
use std::path::Path;

use super::Workspace;
use crate::cli::commands::InitArgs;
use crate::cli::output::ChangeJson;
use crate::io::config_io;
use crate::io::metadata_store::FilterMetadataStore;
use crate::model::config::CONFIG_FILE;
use crate::ops::updater::IdSpace;

const CONFIG_TEMPLATE: &str = r##"# ordertree configuration. Every table is optional.

[store]
# Directory of per-filter records, relative to this file
path = "{store}"

[lock]
# How long a writer waits for another writer on the same filter
timeout_ms = 5000

# --- Stable ids ---
# Point at a TOML file with an [ids] table mapping local ids to stable ids
# to use `ot init --stable` and `ot export`.
#
# [ids]
# table = "ids.toml"
"##;

/// Validate a filter key: non-empty, no control characters.
fn validate_filter(filter: &str) -> Result<(), String> {
    if filter.trim().is_empty() {
        return Err("filter cannot be empty".to_string());
    }
    if filter.chars().any(char::is_control) {
        return Err(format!("invalid filter {:?}: control characters are not allowed", filter));
    }
    Ok(())
}

fn render_config(store_path: &str) -> String {
    CONFIG_TEMPLATE.replace("{store}", store_path)
}

/// Initialize a filter's tree, writing a commented ordertree.toml first if
/// the directory has none.
pub fn cmd_init(dir: &Path, args: InitArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    validate_filter(&args.filter)?;

    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        let defaults = config_io::read_config(dir)?;
        fs::write(&config_path, render_config(&defaults.store.path))?;
        eprintln!("Created {}", config_path.display());
    }

    let ws = Workspace::open(dir)?;
    let _lock = ws.lock(&args.filter)?;

    if !args.force && ws.updater.store().get(&args.filter)?.is_some() {
        return Err(format!(
            "filter already initialized: {} (use --force to replace it)",
            args.filter
        )
        .into());
    }

    let text = args.tree.as_deref().unwrap_or("");
    if args.stable {
        let table = config_io::load_id_table(&ws.dir, &ws.config)?;
        ws.updater
            .initialize_from_serialized_tree(&args.filter, text, IdSpace::Stable(&table))?;
    } else {
        ws.updater
            .initialize_from_serialized_tree(&args.filter, text, IdSpace::Local)?;
    }

    let tree = ws.tree(&args.filter);
    if json {
        let out = ChangeJson {
            filter: args.filter,
            changed: true,
            tree,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Initialized {}: {}", args.filter, tree);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_filter() {
        assert!(validate_filter("today").is_ok());
        assert!(validate_filter("tag:work/home").is_ok());
        assert!(validate_filter("").is_err());
        assert!(validate_filter("  ").is_err());
        assert!(validate_filter("a\nb").is_err());
    }

    #[test]
    fn test_render_config_is_valid_toml() {
        let text = render_config("trees");
        let config: crate::model::config::OrderTreeConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.store.path, "trees");
        assert_eq!(config.lock.timeout_ms, 5000);
        assert!(config.ids.table.is_none());
    }
}
