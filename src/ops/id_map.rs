use std::collections::HashMap;

use tracing::warn;

use crate::model::forest::{DuplicateIdError, Forest};
use crate::model::node::{NodeIdx, TaskKey};

/// Resolves task ids between the device-local and the stable id space.
/// A missing answer means the task is deleted locally or not yet replicated.
pub trait TaskLookup {
    fn local_to_remote(&self, local_id: &str) -> Option<String>;
    fn remote_to_local(&self, remote_id: &str) -> Option<String>;
}

/// In-memory bidirectional id table
#[derive(Debug, Clone, Default)]
pub struct IdTable {
    to_remote: HashMap<String, String>,
    to_local: HashMap<String, String>,
}

impl IdTable {
    pub fn new() -> Self {
        IdTable::default()
    }

    /// Record that `local` and `remote` name the same task, replacing any
    /// earlier pairing of either side.
    pub fn insert(&mut self, local: impl Into<String>, remote: impl Into<String>) {
        let local = local.into();
        let remote = remote.into();
        if let Some(old_remote) = self.to_remote.remove(&local) {
            self.to_local.remove(&old_remote);
        }
        if let Some(old_local) = self.to_local.remove(&remote) {
            self.to_remote.remove(&old_local);
        }
        self.to_remote.insert(local.clone(), remote.clone());
        self.to_local.insert(remote, local);
    }

    pub fn len(&self) -> usize {
        self.to_remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_remote.is_empty()
    }
}

impl<L: Into<String>, R: Into<String>> FromIterator<(L, R)> for IdTable {
    fn from_iter<I: IntoIterator<Item = (L, R)>>(iter: I) -> Self {
        let mut table = IdTable::new();
        for (local, remote) in iter {
            table.insert(local, remote);
        }
        table
    }
}

impl TaskLookup for IdTable {
    fn local_to_remote(&self, local_id: &str) -> Option<String> {
        self.to_remote.get(local_id).cloned()
    }

    fn remote_to_local(&self, remote_id: &str) -> Option<String> {
        self.to_local.get(remote_id).cloned()
    }
}

/// Rewrite every task id into the stable id space. Stable ids are written
/// quoted.
///
/// A node whose id has no stable counterpart is dropped and its children
/// take its place in its parent, in order. The same happens when two local
/// ids resolve to one stable id: the later node in document order yields.
pub fn map_local_to_remote(forest: &Forest, lookup: &dyn TaskLookup) -> Forest {
    map_forest(forest, "local-to-remote", |id| {
        lookup.local_to_remote(id).map(TaskKey::quoted)
    })
}

/// Rewrite every task id into the local id space. Local ids are written bare.
/// Unresolvable ids are spliced out as in [`map_local_to_remote`].
pub fn map_remote_to_local(forest: &Forest, lookup: &dyn TaskLookup) -> Forest {
    map_forest(forest, "remote-to-local", |id| {
        lookup.remote_to_local(id).map(TaskKey::bare)
    })
}

fn map_forest(
    forest: &Forest,
    direction: &'static str,
    resolve: impl Fn(&str) -> Option<TaskKey>,
) -> Forest {
    let mut mapped = Forest::new();
    let root = mapped.root();
    copy_children(forest, forest.root(), &mut mapped, root, direction, &resolve);
    mapped
}

fn copy_children(
    src: &Forest,
    from: NodeIdx,
    dst: &mut Forest,
    into: NodeIdx,
    direction: &'static str,
    resolve: &dyn Fn(&str) -> Option<TaskKey>,
) {
    for &child in src.children(from) {
        let id = src.id(child);
        // Children of an elided node land in `into`, right where it stood
        let target = match resolve(id) {
            Some(key) => {
                let end = dst.children(into).len();
                match dst.insert_key(key, into, end) {
                    Ok(idx) => idx,
                    Err(DuplicateIdError(mapped)) => {
                        warn!(
                            id,
                            mapped = %mapped,
                            direction,
                            "mapped id already present, splicing children into parent"
                        );
                        into
                    }
                }
            }
            None => {
                warn!(id, direction, "no mapping for task id, splicing children into parent");
                into
            }
        };
        copy_children(src, child, dst, target, direction, resolve);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, serialize};

    const SAMPLE: &str = "[-1, [1, 2, [3, 4]], 5, 6]";

    fn sample_table() -> IdTable {
        [("1", "6"), ("2", "4"), ("3", "3"), ("4", "1"), ("5", "2"), ("6", "5")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_local_to_remote_example() {
        let forest = parse(SAMPLE).unwrap();
        let remote = map_local_to_remote(&forest, &sample_table());
        assert_eq!(
            serialize(&remote),
            r#"[-1, ["6", "4", ["3", "1"]], "2", "5"]"#
        );
    }

    #[test]
    fn test_remote_to_local_inverts() {
        let table = sample_table();
        let forest = parse(SAMPLE).unwrap();
        let remote = map_local_to_remote(&forest, &table);
        let local = map_remote_to_local(&remote, &table);
        assert_eq!(serialize(&local), SAMPLE);
    }

    #[test]
    fn test_unresolved_node_splices_children_in_place() {
        let table: IdTable = [("2", "b"), ("3", "c"), ("4", "d"), ("5", "e"), ("6", "f")]
            .into_iter()
            .collect();
        let forest = parse(SAMPLE).unwrap();
        let remote = map_local_to_remote(&forest, &table);
        assert_eq!(serialize(&remote), r#"[-1, "b", ["c", "d"], "e", "f"]"#);
        assert!(remote.validate().is_ok());
    }

    #[test]
    fn test_unresolved_nested_node() {
        let table: IdTable = [("1", "a"), ("2", "b"), ("4", "d"), ("5", "e")]
            .into_iter()
            .collect();
        let forest = parse(SAMPLE).unwrap();
        let remote = map_local_to_remote(&forest, &table);
        // 3 vanishes (4 moves up under 1), 6 vanishes as a leaf
        assert_eq!(serialize(&remote), r#"[-1, ["a", "b", "d"], "e"]"#);
    }

    #[test]
    fn test_colliding_mapping_keeps_first() {
        let mut table = IdTable::new();
        table.insert("1", "x");
        table.insert("2", "y");
        let forest = parse("[-1, 1, [2, 3]]").unwrap();
        // Lookup that sends both 1 and 2 to "x"
        struct Collide;
        impl TaskLookup for Collide {
            fn local_to_remote(&self, id: &str) -> Option<String> {
                match id {
                    "1" | "2" => Some("x".into()),
                    "3" => Some("z".into()),
                    _ => None,
                }
            }
            fn remote_to_local(&self, _: &str) -> Option<String> {
                None
            }
        }
        let remote = map_local_to_remote(&forest, &Collide);
        assert_eq!(serialize(&remote), r#"[-1, "x", "z"]"#);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_empty_lookup_yields_root_only() {
        let forest = parse(SAMPLE).unwrap();
        let remote = map_local_to_remote(&forest, &IdTable::new());
        assert_eq!(serialize(&remote), "[-1]");
    }

    #[test]
    fn test_id_table_insert_replaces_pairings() {
        let mut table = IdTable::new();
        table.insert("1", "a");
        table.insert("1", "b");
        assert_eq!(table.local_to_remote("1").as_deref(), Some("b"));
        assert_eq!(table.remote_to_local("a"), None);
        table.insert("2", "b");
        assert_eq!(table.local_to_remote("1"), None);
        assert_eq!(table.remote_to_local("b").as_deref(), Some("2"));
        assert_eq!(table.len(), 1);
    }
}
