mod init;
pub use init::cmd_init;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io::{self, ConfigError};
use crate::io::lock::{FileLock, LockError};
use crate::io::metadata_store::{FilterMetadataStore, JsonDirStore};
use crate::model::config::OrderTreeConfig;
use crate::ops::updater::SubtaskTreeUpdater;
use crate::parse::{self, flatten};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let dir = resolve_dir(cli.project_dir.as_deref())?;

    match cli.command {
        None => Err("no command given (try `ot --help`)".into()),
        Some(cmd) => match cmd {
            // Pure text commands, no workspace needed
            Commands::Check(args) => cmd_check(args, json),
            Commands::Flatten(args) => cmd_flatten(args, json),

            Commands::Init(args) => cmd_init(&dir, args, json),

            // Read commands
            Commands::Show(args) => cmd_show(&dir, args, json),
            Commands::Positions(args) => cmd_positions(&dir, args, json),
            Commands::Find(args) => cmd_find(&dir, args, json),
            Commands::Export(args) => cmd_export(&dir, args),

            // Write commands
            Commands::Mv(args) => cmd_mv(&dir, args, json),
            Commands::Indent(args) => cmd_indent(&dir, args, json),
            Commands::Add(args) => cmd_add(&dir, args, json),
            Commands::Rm(args) => cmd_rm(&dir, args, json),
            Commands::Reconcile(args) => cmd_reconcile(&dir, args, json),
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_dir(project_dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match project_dir {
        Some(dir) => Ok(std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?),
        None => Ok(std::env::current_dir()?),
    }
}

/// Tree text from the command line, or stdin for `-`
fn read_tree_text(text: &str) -> Result<String, std::io::Error> {
    if text == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(text.to_string())
    }
}

/// Config, store and updater for one directory
pub(crate) struct Workspace {
    dir: PathBuf,
    config: OrderTreeConfig,
    store_dir: PathBuf,
    updater: SubtaskTreeUpdater<JsonDirStore>,
}

impl Workspace {
    pub(crate) fn open(dir: &Path) -> Result<Self, ConfigError> {
        let config = config_io::read_config(dir)?;
        let store_dir = config_io::store_dir(dir, &config);
        Ok(Workspace {
            dir: dir.to_path_buf(),
            updater: SubtaskTreeUpdater::new(JsonDirStore::new(&store_dir)),
            store_dir,
            config,
        })
    }

    /// Take the cross-process lock on `filter`
    pub(crate) fn lock(&self, filter: &str) -> Result<FileLock, LockError> {
        FileLock::acquire(
            &self.store_dir,
            filter,
            Duration::from_millis(self.config.lock.timeout_ms),
        )
    }

    /// Lock and load an existing filter. Loading may rewrite a record whose
    /// text was not canonical, so reads take the lock too.
    fn open_filter(&self, filter: &str) -> Result<FileLock, Box<dyn std::error::Error>> {
        let lock = self.lock(filter)?;
        if self.updater.store().get(filter)?.is_none() {
            return Err(format!("filter not initialized: {} (try `ot init {}`)", filter, filter).into());
        }
        self.updater.load(filter)?;
        Ok(lock)
    }

    fn tree(&self, filter: &str) -> String {
        self.updater
            .snapshot(filter)
            .map(|s| s.tree().to_string())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Text commands
// ---------------------------------------------------------------------------

fn cmd_check(args: TreeTextArgs, json: bool) -> CmdResult {
    let text = read_tree_text(&args.text)?;
    let result = parse::parse(text.trim());

    if json {
        let out = match &result {
            Ok(forest) => CheckJson {
                valid: true,
                tasks: Some(forest.len()),
                error: None,
            },
            Err(e) => CheckJson {
                valid: false,
                tasks: None,
                error: Some(e.to_string()),
            },
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    }

    match result {
        Ok(forest) => {
            if !json {
                println!("✓ valid tree ({} tasks)", forest.len());
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_flatten(args: TreeTextArgs, json: bool) -> CmdResult {
    let text = read_tree_text(&args.text)?;
    let ids = flatten(text.trim()).collect::<Result<Vec<_>, _>>()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        for id in ids {
            println!("{}", id);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_show(dir: &Path, args: FilterArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let snapshot = ws
        .updater
        .snapshot(&args.filter)
        .ok_or_else(|| format!("filter not loaded: {}", args.filter))?;

    if json {
        let out = tree_to_json(&args.filter, snapshot.tree(), snapshot.forest());
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", snapshot.tree());
        println!();
        for line in format_outline(snapshot.forest()) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_positions(dir: &Path, args: FilterArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let snapshot = ws
        .updater
        .snapshot(&args.filter)
        .ok_or_else(|| format!("filter not loaded: {}", args.filter))?;

    if json {
        println!("{}", serde_json::to_string_pretty(snapshot.positions())?);
    } else {
        for line in format_positions(snapshot.positions()) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_find(dir: &Path, args: TaskArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let node = ws
        .updater
        .find_node_for_task(&args.filter, &args.id)
        .ok_or_else(|| format!("task not found: {}", args.id))?;
    let descendants = ws.updater.descendants(&args.filter, &args.id);

    if json {
        let out = FindJson { node, descendants };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for line in format_node_info(&node, &descendants) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_export(dir: &Path, args: FilterArgs) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let table = config_io::load_id_table(&ws.dir, &ws.config)?;
    let _lock = ws.open_filter(&args.filter)?;
    println!("{}", ws.updater.export_stable(&args.filter, &table)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Write command handlers
// ---------------------------------------------------------------------------

fn cmd_mv(dir: &Path, args: MvArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let outcome = ws
        .updater
        .move_to(&args.filter, &args.target, args.before.as_deref())?;

    if json {
        let out = MoveJson {
            tree: ws.tree(&args.filter),
            filter: args.filter,
            target: args.target,
            before: args.before,
            outcome,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", format_outcome(&args.target, outcome));
    }
    Ok(())
}

fn cmd_indent(dir: &Path, args: IndentArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let delta = if args.out { -1 } else { 1 };
    let outcome = ws.updater.indent(&args.filter, &args.id, delta)?;

    if json {
        let out = MoveJson {
            tree: ws.tree(&args.filter),
            filter: args.filter,
            target: args.id,
            before: None,
            outcome,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", format_outcome(&args.id, outcome));
    }
    Ok(())
}

fn cmd_add(dir: &Path, args: TaskArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let changed = ws.updater.on_create_task(&args.filter, &args.id)?;
    print_change(&ws, &args.filter, changed, json, || {
        if changed {
            format!("added {}", args.id)
        } else {
            format!("unchanged {}: already in tree or not a task id", args.id)
        }
    })
}

fn cmd_rm(dir: &Path, args: TaskArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let changed = ws.updater.on_delete_task(&args.filter, &args.id)?;
    print_change(&ws, &args.filter, changed, json, || {
        if changed {
            format!("removed {}", args.id)
        } else {
            format!("unchanged {}: task not in tree", args.id)
        }
    })
}

fn cmd_reconcile(dir: &Path, args: ReconcileArgs, json: bool) -> CmdResult {
    let ws = Workspace::open(dir)?;
    let _lock = ws.open_filter(&args.filter)?;
    let changed = ws.updater.reconcile(&args.filter, &args.ids)?;
    print_change(&ws, &args.filter, changed, json, || {
        if changed {
            format!("reconciled {}", args.filter)
        } else {
            format!("{} already up to date", args.filter)
        }
    })
}

fn print_change(
    ws: &Workspace,
    filter: &str,
    changed: bool,
    json: bool,
    message: impl FnOnce() -> String,
) -> CmdResult {
    if json {
        let out = ChangeJson {
            filter: filter.to_string(),
            changed,
            tree: ws.tree(filter),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", message());
    }
    Ok(())
}
