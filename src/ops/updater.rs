//! Per-filter orchestration of the subtask tree.
//!
//! The updater keeps one immutable [`Snapshot`] per loaded filter. Readers
//! clone the snapshot's `Arc` and never see a half-applied edit. Writers on
//! the same filter queue on that filter's mutex, edit a private copy of the
//! forest, persist it, and only then publish the new snapshot. If the store
//! rejects the write, the previous snapshot stays current.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use crate::io::metadata_store::{FilterMetadataStore, StoreError};
use crate::model::forest::Forest;
use crate::model::node::{NodeIdx, PositionRow, SENTINEL, TaskKey};
use crate::ops::id_map::{TaskLookup, map_local_to_remote, map_remote_to_local};
use crate::ops::tree_ops::{self, MoveOutcome};
use crate::parse::{TreeError, parse, serialize};

/// Error type for updater operations
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("filter not loaded: {0}")]
    NotLoaded(String),
}

/// Which id space a serialized tree is written in
#[derive(Clone, Copy)]
pub enum IdSpace<'a> {
    Local,
    /// Stable ids, translated to local ids through the lookup on load
    Stable(&'a dyn TaskLookup),
}

/// A loaded filter's tree with its derived forms
#[derive(Debug)]
pub struct Snapshot {
    forest: Forest,
    tree: String,
    positions: Vec<PositionRow>,
}

impl Snapshot {
    fn new(mut forest: Forest) -> Self {
        // Removed nodes leave arena slots behind; reclaim them once they
        // outnumber the live tasks
        if forest.dead_slots() > forest.len() {
            forest.compact();
        }
        let tree = serialize(&forest);
        let positions = forest.position_table();
        Snapshot {
            forest,
            tree,
            positions,
        }
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    /// Canonical serialized text
    pub fn tree(&self) -> &str {
        &self.tree
    }

    pub fn positions(&self) -> &[PositionRow] {
        &self.positions
    }

    fn node_info(&self, idx: NodeIdx) -> NodeInfo {
        let forest = &self.forest;
        NodeInfo {
            id: forest.id(idx).to_string(),
            parent: forest.parent(idx).map(|p| forest.id(p).to_string()),
            position: forest.position(idx),
            depth: forest.depth(idx),
            children: forest
                .children(idx)
                .iter()
                .map(|&c| forest.id(c).to_string())
                .collect(),
        }
    }
}

/// Where a task sits in its filter's tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub id: String,
    pub parent: Option<String>,
    pub position: Option<usize>,
    pub depth: usize,
    pub children: Vec<String>,
}

/// Loads, queries, edits and re-persists the subtask trees of many filters
pub struct SubtaskTreeUpdater<S> {
    store: S,
    snapshots: RwLock<HashMap<String, Arc<Snapshot>>>,
    writers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: FilterMetadataStore> SubtaskTreeUpdater<S> {
    pub fn new(store: S) -> Self {
        SubtaskTreeUpdater {
            store,
            snapshots: RwLock::new(HashMap::new()),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load `filter` from its serialized tree, translating stable ids to
    /// local ones when needed, then persist the canonical text and position
    /// table. Blank text (or `null`) loads as an empty tree.
    pub fn initialize_from_serialized_tree(
        &self,
        filter: &str,
        text: &str,
        ids: IdSpace<'_>,
    ) -> Result<(), UpdaterError> {
        let forest = parse_stored(text)?;
        let forest = match ids {
            IdSpace::Local => forest,
            IdSpace::Stable(lookup) => map_remote_to_local(&forest, lookup),
        };

        let lock = self.writer_lock(filter);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = Snapshot::new(forest);
        self.persist(filter, &snapshot)?;
        info!(filter, nodes = snapshot.forest.len(), "initialized subtask tree");
        self.publish(filter, snapshot);
        Ok(())
    }

    /// Load `filter` from the store. Nothing is written unless the stored
    /// text was not already canonical.
    pub fn load(&self, filter: &str) -> Result<(), UpdaterError> {
        let lock = self.writer_lock(filter);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = self.store.get(filter)?;
        let snapshot = Snapshot::new(parse_stored(stored.as_deref().unwrap_or(""))?);
        if stored.as_deref() != Some(snapshot.tree()) {
            self.persist(filter, &snapshot)?;
        }
        debug!(filter, nodes = snapshot.forest.len(), "loaded subtask tree");
        self.publish(filter, snapshot);
        Ok(())
    }

    /// Forget a loaded filter
    pub fn unload(&self, filter: &str) {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(filter);
    }

    pub fn is_loaded(&self, filter: &str) -> bool {
        self.snapshot(filter).is_some()
    }

    /// The current snapshot of `filter`, if loaded
    pub fn snapshot(&self, filter: &str) -> Option<Arc<Snapshot>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(filter)
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn find_node_for_task(&self, filter: &str, task_id: &str) -> Option<NodeInfo> {
        let snapshot = self.snapshot(filter)?;
        let idx = snapshot.forest.find_node(task_id)?;
        Some(snapshot.node_info(idx))
    }

    /// Nesting depth of a task; unknown tasks sit at the top level
    pub fn indent_for_task(&self, filter: &str, task_id: &str) -> usize {
        self.find_node_for_task(filter, task_id)
            .map_or(0, |info| info.depth)
    }

    /// Ids below a task, in document order
    pub fn descendants(&self, filter: &str, task_id: &str) -> Vec<String> {
        let Some(snapshot) = self.snapshot(filter) else {
            return Vec::new();
        };
        let forest = &snapshot.forest;
        match forest.find_node(task_id) {
            Some(idx) => forest
                .descendants(idx)
                .into_iter()
                .map(|d| forest.id(d).to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    /// All task ids in display order
    pub fn ordered_ids(&self, filter: &str) -> Result<Vec<String>, UpdaterError> {
        let snapshot = self.require(filter)?;
        Ok(snapshot
            .forest
            .ordered_ids()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// The filter's tree rewritten in stable ids, for sync
    pub fn export_stable(&self, filter: &str, lookup: &dyn TaskLookup) -> Result<String, UpdaterError> {
        let snapshot = self.require(filter)?;
        Ok(serialize(&map_local_to_remote(&snapshot.forest, lookup)))
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Move `target_id` right before `before_id` (or to the end of the top
    /// level when `before_id` is `None` or the sentinel).
    ///
    /// Moves that would be meaningless or unsafe are reported as
    /// `Unchanged` and write nothing.
    pub fn move_to(
        &self,
        filter: &str,
        target_id: &str,
        before_id: Option<&str>,
    ) -> Result<MoveOutcome, UpdaterError> {
        let outcome = self.mutate(filter, |forest| {
            let outcome = tree_ops::move_before(forest, target_id, before_id);
            (outcome, outcome.is_moved())
        })?;
        debug!(
            filter,
            target = target_id,
            before = before_id.unwrap_or(SENTINEL),
            ?outcome,
            "move"
        );
        Ok(outcome)
    }

    /// Indent (`delta > 0`) or outdent (`delta < 0`) a task by one level
    pub fn indent(&self, filter: &str, task_id: &str, delta: i32) -> Result<MoveOutcome, UpdaterError> {
        let outcome = self.mutate(filter, |forest| {
            let outcome = tree_ops::indent(forest, task_id, delta);
            (outcome, outcome.is_moved())
        })?;
        debug!(filter, task = task_id, delta, ?outcome, "indent");
        Ok(outcome)
    }

    /// A task was created: show it first. Returns true if the tree changed.
    pub fn on_create_task(&self, filter: &str, task_id: &str) -> Result<bool, UpdaterError> {
        self.mutate(filter, |forest| {
            let changed = tree_ops::insert_task(forest, TaskKey::bare(task_id));
            (changed, changed)
        })
    }

    /// A task was deleted: drop it, keeping its subtasks where it was
    pub fn on_delete_task(&self, filter: &str, task_id: &str) -> Result<bool, UpdaterError> {
        self.mutate(filter, |forest| {
            let changed = tree_ops::remove_task(forest, task_id);
            (changed, changed)
        })
    }

    /// Align the tree with the filter's current tasks, given oldest first
    pub fn reconcile<T: AsRef<str>>(&self, filter: &str, task_ids: &[T]) -> Result<bool, UpdaterError> {
        self.mutate(filter, |forest| {
            let changed = tree_ops::reconcile(forest, task_ids);
            (changed, changed)
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Read-modify-write under the filter's writer lock. `edit` returns its
    /// result and whether it changed the forest; unchanged edits are not
    /// persisted.
    fn mutate<T>(
        &self,
        filter: &str,
        edit: impl FnOnce(&mut Forest) -> (T, bool),
    ) -> Result<T, UpdaterError> {
        let lock = self.writer_lock(filter);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.require(filter)?;
        let mut forest = current.forest.clone();
        let (result, changed) = edit(&mut forest);
        if changed {
            let snapshot = Snapshot::new(forest);
            self.persist(filter, &snapshot)?;
            self.publish(filter, snapshot);
        }
        Ok(result)
    }

    fn require(&self, filter: &str) -> Result<Arc<Snapshot>, UpdaterError> {
        self.snapshot(filter)
            .ok_or_else(|| UpdaterError::NotLoaded(filter.to_string()))
    }

    fn writer_lock(&self, filter: &str) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        writers.entry(filter.to_string()).or_default().clone()
    }

    fn persist(&self, filter: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.store
            .put_record(filter, &snapshot.tree, &snapshot.positions)?;
        debug!(filter, bytes = snapshot.tree.len(), "persisted subtask tree");
        Ok(())
    }

    fn publish(&self, filter: &str, snapshot: Snapshot) {
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(filter.to_string(), Arc::new(snapshot));
    }
}

/// Parse stored text; absent, blank or `null` means an empty tree
fn parse_stored(text: &str) -> Result<Forest, TreeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Forest::new());
    }
    parse(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::metadata_store::MemoryStore;
    use crate::ops::id_map::IdTable;
    use crate::ops::tree_ops::NoopReason;
    use crate::parse::{MAX_DEPTH, ParseError};
    use pretty_assertions::assert_eq;

    const TREE: &str = "[-1, [A, B, [C, D]], E, F]";

    fn loaded(text: &str) -> SubtaskTreeUpdater<MemoryStore> {
        let updater = SubtaskTreeUpdater::new(MemoryStore::new());
        updater
            .initialize_from_serialized_tree("today", text, IdSpace::Local)
            .unwrap();
        updater
    }

    fn stored(updater: &SubtaskTreeUpdater<MemoryStore>) -> String {
        updater.store().get("today").unwrap().unwrap()
    }

    #[test]
    fn test_initialize_persists_canonical_text_and_positions() {
        let updater = loaded("[-1,[A,B,[C,D]],E,F]");
        assert_eq!(stored(&updater), TREE);
        let record = updater.store().record("today").unwrap();
        assert_eq!(record.positions.len(), 6);
        assert_eq!(record.positions[0].id, "A");
        assert_eq!(updater.snapshot("today").unwrap().tree(), TREE);
    }

    #[test]
    fn test_initialize_blank_is_empty_tree() {
        for text in ["", "  ", "null"] {
            let updater = loaded(text);
            assert_eq!(stored(&updater), "[-1]");
        }
    }

    #[test]
    fn test_initialize_propagates_parse_errors() {
        let updater = SubtaskTreeUpdater::new(MemoryStore::new());
        let err = updater
            .initialize_from_serialized_tree("today", "[-1, [A", IdSpace::Local)
            .unwrap_err();
        assert!(matches!(
            err,
            UpdaterError::Tree(TreeError::Parse(ParseError::Unbalanced { .. }))
        ));
        assert!(!updater.is_loaded("today"));
        assert_eq!(updater.store().write_count(), 0);
    }

    #[test]
    fn test_initialize_from_stable_ids() {
        let table: IdTable = [("1", "6"), ("2", "4"), ("3", "3"), ("4", "1"), ("5", "2"), ("6", "5")]
            .into_iter()
            .collect();
        let updater = SubtaskTreeUpdater::new(MemoryStore::new());
        updater
            .initialize_from_serialized_tree(
                "today",
                r#"[-1, ["6", "4", ["3", "1"]], "2", "5"]"#,
                IdSpace::Stable(&table),
            )
            .unwrap();
        assert_eq!(stored(&updater), "[-1, [1, 2, [3, 4]], 5, 6]");
        assert_eq!(
            updater.export_stable("today", &table).unwrap(),
            r#"[-1, ["6", "4", ["3", "1"]], "2", "5"]"#
        );
    }

    #[test]
    fn test_load_from_store() {
        let store = MemoryStore::new();
        store.put("today", TREE).unwrap();
        let updater = SubtaskTreeUpdater::new(store);
        updater.load("today").unwrap();
        // Already canonical: no second write
        assert_eq!(updater.store().write_count(), 1);
        assert_eq!(updater.ordered_ids("today").unwrap(), vec!["A", "B", "C", "D", "E", "F"]);

        updater.load("missing").unwrap();
        assert_eq!(updater.store().get("missing").unwrap().as_deref(), Some("[-1]"));
    }

    #[test]
    fn test_find_node_for_task() {
        let updater = loaded(TREE);
        let info = updater.find_node_for_task("today", "C").unwrap();
        assert_eq!(
            info,
            NodeInfo {
                id: "C".into(),
                parent: Some("A".into()),
                position: Some(1),
                depth: 1,
                children: vec!["D".into()],
            }
        );
        assert!(updater.find_node_for_task("today", "Z").is_none());
        assert!(updater.find_node_for_task("other", "C").is_none());
        assert_eq!(updater.indent_for_task("today", "D"), 2);
        assert_eq!(updater.indent_for_task("today", "Z"), 0);
        assert_eq!(updater.descendants("today", "A"), vec!["B", "C", "D"]);
    }

    #[test]
    fn test_noop_moves_write_nothing() {
        let updater = loaded(TREE);
        let writes = updater.store().write_count();
        for before in ["B", "C", "E"] {
            let outcome = updater.move_to("today", "A", Some(before)).unwrap();
            assert!(!outcome.is_moved(), "before {}", before);
            assert_eq!(stored(&updater), TREE);
        }
        assert_eq!(updater.store().write_count(), writes);
    }

    #[test]
    fn test_effective_move_persists() {
        let updater = loaded(TREE);
        let outcome = updater.move_to("today", "A", Some("F")).unwrap();
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(stored(&updater), "[-1, E, [A, B, [C, D]], F]");
        let record = updater.store().record("today").unwrap();
        assert_eq!(record.positions[0].id, "E");
        assert_eq!(record.positions[1].id, "A");
        assert_eq!(record.positions[1].position, 1);

        // Second time it is already in place
        let again = updater.move_to("today", "A", Some("F")).unwrap();
        assert_eq!(again, MoveOutcome::Unchanged(NoopReason::AlreadyInPlace));
        assert_eq!(stored(&updater), "[-1, E, [A, B, [C, D]], F]");
    }

    #[test]
    fn test_move_on_unloaded_filter() {
        let updater = SubtaskTreeUpdater::new(MemoryStore::new());
        assert!(matches!(
            updater.move_to("today", "A", None),
            Err(UpdaterError::NotLoaded(_))
        ));
    }

    #[test]
    fn test_old_snapshot_survives_move() {
        let updater = loaded(TREE);
        let before = updater.snapshot("today").unwrap();
        updater.move_to("today", "F", Some("A")).unwrap();
        assert_eq!(before.tree(), TREE);
        assert_eq!(
            updater.snapshot("today").unwrap().tree(),
            "[-1, F, [A, B, [C, D]], E]"
        );
    }

    #[test]
    fn test_indent_and_membership_hooks() {
        let updater = loaded(TREE);
        assert!(updater.indent("today", "E", 1).unwrap().is_moved());
        assert_eq!(stored(&updater), "[-1, [A, B, [C, D], E], F]");

        assert!(updater.on_create_task("today", "G").unwrap());
        assert!(!updater.on_create_task("today", "G").unwrap());
        assert!(updater.on_delete_task("today", "A").unwrap());
        assert_eq!(stored(&updater), "[-1, G, B, [C, D], E, F]");

        assert!(updater.reconcile("today", &["B", "C", "D"]).unwrap());
        assert_eq!(stored(&updater), "[-1, B, [C, D]]");
    }

    #[test]
    fn test_indent_stops_at_max_nesting() {
        let ids: Vec<String> = (1..=1005).map(|i| i.to_string()).collect();
        let updater = loaded(&format!("[-1, {}]", ids.join(", ")));

        // Each indent nests the growing chain one level under its previous
        // sibling, until the chain would no longer fit in the text format
        for id in ids[6..].iter().rev() {
            assert_eq!(updater.indent("today", id, 1).unwrap(), MoveOutcome::Moved, "{}", id);
        }
        let writes = updater.store().write_count();
        assert_eq!(
            updater.indent("today", "6", 1).unwrap(),
            MoveOutcome::Unchanged(NoopReason::TooDeep)
        );
        assert_eq!(updater.store().write_count(), writes);
        assert_eq!(updater.indent_for_task("today", "1005"), MAX_DEPTH - 1);

        // What was persisted loads again
        let store = MemoryStore::new();
        store.put("today", &stored(&updater)).unwrap();
        let reloaded = SubtaskTreeUpdater::new(store);
        reloaded.load("today").unwrap();
        assert_eq!(reloaded.snapshot("today").unwrap().tree(), stored(&updater));
    }

    #[test]
    fn test_create_delete_churn_reclaims_slots() {
        let updater = loaded(TREE);
        for i in 0..200 {
            let id = format!("tmp{}", i);
            assert!(updater.on_create_task("today", &id).unwrap());
            assert!(updater.on_delete_task("today", &id).unwrap());
            let snapshot = updater.snapshot("today").unwrap();
            assert!(snapshot.forest().dead_slots() <= snapshot.forest().len());
        }
        let snapshot = updater.snapshot("today").unwrap();
        assert_eq!(snapshot.tree(), TREE);
        assert!(snapshot.forest().validate().is_ok());
        assert_eq!(updater.find_node_for_task("today", "D").unwrap().parent.as_deref(), Some("C"));
    }

    struct FailingStore;

    impl FilterMetadataStore for FailingStore {
        fn get(&self, _filter: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn put(&self, _filter: &str, _tree: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn test_failed_write_keeps_previous_snapshot() {
        let updater = SubtaskTreeUpdater::new(FailingStore);
        // Initialization itself fails to persist, so nothing is loaded
        assert!(
            updater
                .initialize_from_serialized_tree("today", TREE, IdSpace::Local)
                .is_err()
        );
        assert!(!updater.is_loaded("today"));

        updater.publish("today", Snapshot::new(parse(TREE).unwrap()));
        assert!(updater.move_to("today", "A", Some("F")).is_err());
        assert_eq!(updater.snapshot("today").unwrap().tree(), TREE);
    }

    #[test]
    fn test_concurrent_moves_keep_tree_valid() {
        let updater = loaded("[-1, 1, 2, 3, 4, 5, 6, 7, 8]");
        let ids = ["1", "2", "3", "4", "5", "6", "7", "8"];
        std::thread::scope(|s| {
            for t in 0..4 {
                let updater = &updater;
                s.spawn(move || {
                    for i in 0..50 {
                        let target = ids[(t * 3 + i) % ids.len()];
                        let before = ids[(t + i * 5) % ids.len()];
                        updater.move_to("today", target, Some(before)).unwrap();
                        let snapshot = updater.snapshot("today").unwrap();
                        assert!(snapshot.forest().validate().is_ok());
                    }
                });
            }
        });
        let snapshot = updater.snapshot("today").unwrap();
        assert_eq!(snapshot.forest().len(), 8);
        assert_eq!(stored(&updater), snapshot.tree());
    }
}
