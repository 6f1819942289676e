use std::collections::HashSet;

use serde::Serialize;

use crate::model::forest::Forest;
use crate::model::node::{NodeIdx, SENTINEL, TaskKey};
use crate::parse::MAX_DEPTH;

/// Deepest node depth the text format can hold: a leaf at this depth sits in
/// its parent's array, nested `MAX_DEPTH` arrays down.
const MAX_NODE_DEPTH: usize = MAX_DEPTH - 1;

/// Why a move left the tree as it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoopReason {
    /// The task to move is not in the tree (or is the root)
    UnknownTarget,
    /// The anchor task is not in the tree
    UnknownBefore,
    /// Moving a task before itself
    BeforeSelf,
    /// The anchor sits inside the moved task's own subtree
    BeforeDescendant,
    /// The destination is where the task already is
    AlreadyInPlace,
    /// Indenting a first child: there is no sibling to nest under
    NoPreviousSibling,
    /// Outdenting a top-level task
    AlreadyTopLevel,
    /// Indent by zero levels
    ZeroDelta,
    /// The move would nest tasks deeper than the text format allows
    TooDeep,
}

/// Result of a reparent/reposition edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved,
    Unchanged(NoopReason),
}

impl MoveOutcome {
    pub fn is_moved(self) -> bool {
        self == MoveOutcome::Moved
    }
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

/// Move `target_id` (with its subtree) so that it sits right before
/// `before_id`, under `before_id`'s parent. With no anchor, or the sentinel,
/// the task becomes the last top-level task.
///
/// Never fails: moves that cannot or need not happen come back as
/// `Unchanged` with the tree untouched.
pub fn move_before(forest: &mut Forest, target_id: &str, before_id: Option<&str>) -> MoveOutcome {
    let Some(target) = find_task(forest, target_id) else {
        return MoveOutcome::Unchanged(NoopReason::UnknownTarget);
    };

    let (new_parent, new_index) = match before_id.filter(|id| *id != SENTINEL) {
        None => {
            let root = forest.root();
            (root, forest.children(root).len())
        }
        Some(before_id) => {
            let Some(before) = forest.find_node(before_id) else {
                return MoveOutcome::Unchanged(NoopReason::UnknownBefore);
            };
            if before == target {
                return MoveOutcome::Unchanged(NoopReason::BeforeSelf);
            }
            if forest.is_descendant(before, target) {
                return MoveOutcome::Unchanged(NoopReason::BeforeDescendant);
            }
            match (forest.parent(before), forest.position(before)) {
                (Some(parent), Some(pos)) => (parent, pos),
                _ => return MoveOutcome::Unchanged(NoopReason::UnknownBefore),
            }
        }
    };

    relocate(forest, target, new_parent, new_index)
}

/// Indent (`delta > 0`) or outdent (`delta < 0`) a task by one level.
///
/// Indenting makes the task the last child of its previous sibling.
/// Outdenting places it right after its current parent.
pub fn indent(forest: &mut Forest, task_id: &str, delta: i32) -> MoveOutcome {
    let Some(node) = find_task(forest, task_id) else {
        return MoveOutcome::Unchanged(NoopReason::UnknownTarget);
    };
    let (Some(parent), Some(index)) = (forest.parent(node), forest.position(node)) else {
        return MoveOutcome::Unchanged(NoopReason::UnknownTarget);
    };

    if delta > 0 {
        if index == 0 {
            return MoveOutcome::Unchanged(NoopReason::NoPreviousSibling);
        }
        let new_parent = forest.children(parent)[index - 1];
        let end = forest.children(new_parent).len();
        relocate(forest, node, new_parent, end)
    } else if delta < 0 {
        let (Some(grandparent), Some(parent_pos)) = (forest.parent(parent), forest.position(parent))
        else {
            return MoveOutcome::Unchanged(NoopReason::AlreadyTopLevel);
        };
        relocate(forest, node, grandparent, parent_pos + 1)
    } else {
        MoveOutcome::Unchanged(NoopReason::ZeroDelta)
    }
}

/// Put `target` at `new_index` of `new_parent`, where the index is counted
/// before `target` is unlinked. Callers have already ruled out cycles.
///
/// Refuses moves that would leave a subtree too deep to serialize and parse
/// back.
fn relocate(forest: &mut Forest, target: NodeIdx, new_parent: NodeIdx, new_index: usize) -> MoveOutcome {
    let (Some(old_parent), Some(old_index)) = (forest.parent(target), forest.position(target)) else {
        return MoveOutcome::Unchanged(NoopReason::UnknownTarget);
    };

    // Unlinking from the same list shifts later siblings left by one
    let insert_at = if new_parent == old_parent && new_index > old_index {
        new_index - 1
    } else {
        new_index
    };
    if new_parent == old_parent && insert_at == old_index {
        return MoveOutcome::Unchanged(NoopReason::AlreadyInPlace);
    }
    let new_depth = if new_parent == forest.root() {
        0
    } else {
        forest.depth(new_parent) + 1
    };
    if new_depth + forest.height(target) > MAX_NODE_DEPTH {
        return MoveOutcome::Unchanged(NoopReason::TooDeep);
    }

    forest.detach(target);
    forest.attach(target, new_parent, insert_at);
    MoveOutcome::Moved
}

/// Resolve a task id, refusing the root
fn find_task(forest: &Forest, id: &str) -> Option<NodeIdx> {
    forest.find_node(id).filter(|&idx| idx != forest.root())
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Add a new task at the top of the list. Returns false if the id is blank,
/// the sentinel, or already present.
pub fn insert_task(forest: &mut Forest, key: TaskKey) -> bool {
    if key.text.trim().is_empty() || key.is_sentinel() || forest.contains(&key.text) {
        return false;
    }
    let root = forest.root();
    forest.insert_key(key, root, 0).is_ok()
}

/// Remove a task; its children move up into its place, in order.
pub fn remove_task(forest: &mut Forest, id: &str) -> bool {
    match find_task(forest, id) {
        Some(idx) => forest.remove_spliced(idx),
        None => false,
    }
}

/// Bring the tree in line with the tasks that currently belong to a filter.
///
/// `ids` lists the filter's tasks oldest first. Tasks missing from the tree
/// are added at the top, so the newest ends up first; tree nodes whose task
/// is gone are removed with their children spliced into place.
/// Returns true if anything changed.
pub fn reconcile<S: AsRef<str>>(forest: &mut Forest, ids: &[S]) -> bool {
    let mut changed = false;
    for id in ids {
        changed |= insert_task(forest, TaskKey::bare(id.as_ref()));
    }

    let wanted: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
    let stale: Vec<NodeIdx> = forest
        .iter()
        .filter(|&idx| !wanted.contains(forest.id(idx)))
        .collect();
    for idx in stale {
        changed |= forest.remove_spliced(idx);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, serialize};
    use pretty_assertions::assert_eq;

    // A[B, C[D]], E, F
    const TREE: &str = "[-1, [A, B, [C, D]], E, F]";

    fn tree() -> Forest {
        parse(TREE).unwrap()
    }

    fn moved(text: &str, target: &str, before: Option<&str>) -> (MoveOutcome, String) {
        let mut forest = parse(text).unwrap();
        let outcome = move_before(&mut forest, target, before);
        assert!(forest.validate().is_ok());
        (outcome, serialize(&forest))
    }

    #[test]
    fn test_move_before_own_child_is_noop() {
        let (outcome, text) = moved(TREE, "A", Some("B"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::BeforeDescendant));
        assert_eq!(text, TREE);
    }

    #[test]
    fn test_move_before_nested_descendant_is_noop() {
        let (outcome, text) = moved(TREE, "A", Some("C"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::BeforeDescendant));
        assert_eq!(text, TREE);
        let (outcome, text) = moved(TREE, "A", Some("D"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::BeforeDescendant));
        assert_eq!(text, TREE);
    }

    #[test]
    fn test_move_before_next_sibling_is_noop() {
        let (outcome, text) = moved(TREE, "A", Some("E"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::AlreadyInPlace));
        assert_eq!(text, TREE);
    }

    #[test]
    fn test_move_before_self_is_noop() {
        let (outcome, text) = moved(TREE, "C", Some("C"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::BeforeSelf));
        assert_eq!(text, TREE);
    }

    #[test]
    fn test_move_down_among_siblings() {
        let (outcome, text) = moved(TREE, "A", Some("F"));
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(text, "[-1, E, [A, B, [C, D]], F]");
    }

    #[test]
    fn test_move_up_among_siblings() {
        let (outcome, text) = moved(TREE, "F", Some("A"));
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(text, "[-1, F, [A, B, [C, D]], E]");
    }

    #[test]
    fn test_move_into_other_subtree() {
        let (outcome, text) = moved(TREE, "E", Some("D"));
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(text, "[-1, [A, B, [C, E, D]], F]");
    }

    #[test]
    fn test_move_out_of_subtree() {
        let (outcome, text) = moved(TREE, "D", Some("E"));
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(text, "[-1, [A, B, C], D, E, F]");
    }

    #[test]
    fn test_move_child_before_its_parent() {
        let (outcome, text) = moved(TREE, "C", Some("A"));
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(text, "[-1, [C, D], [A, B], E, F]");
    }

    #[test]
    fn test_move_to_end() {
        let (outcome, text) = moved(TREE, "A", None);
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(text, "[-1, E, F, [A, B, [C, D]]]");

        let (outcome, text) = moved(TREE, "D", Some("-1"));
        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(text, "[-1, [A, B, C], E, F, D]");
    }

    #[test]
    fn test_move_last_to_end_is_noop() {
        let (outcome, text) = moved(TREE, "F", None);
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::AlreadyInPlace));
        assert_eq!(text, TREE);
    }

    #[test]
    fn test_move_unknown_ids() {
        let (outcome, text) = moved(TREE, "Z", Some("A"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::UnknownTarget));
        assert_eq!(text, TREE);
        let (outcome, _) = moved(TREE, "A", Some("Z"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::UnknownBefore));
        let (outcome, _) = moved(TREE, "-1", Some("A"));
        assert_eq!(outcome, MoveOutcome::Unchanged(NoopReason::UnknownTarget));
    }

    #[test]
    fn test_repeated_move_becomes_noop() {
        let mut forest = tree();
        assert_eq!(move_before(&mut forest, "A", Some("F")), MoveOutcome::Moved);
        let once = serialize(&forest);
        assert_eq!(
            move_before(&mut forest, "A", Some("F")),
            MoveOutcome::Unchanged(NoopReason::AlreadyInPlace)
        );
        assert_eq!(serialize(&forest), once);
    }

    #[test]
    fn test_indent_under_previous_sibling() {
        let mut forest = tree();
        assert_eq!(indent(&mut forest, "E", 1), MoveOutcome::Moved);
        assert_eq!(serialize(&forest), "[-1, [A, B, [C, D], E], F]");
        assert_eq!(forest.depth(forest.find_node("E").unwrap()), 1);
    }

    #[test]
    fn test_indent_first_child_is_noop() {
        let mut forest = tree();
        assert_eq!(
            indent(&mut forest, "A", 1),
            MoveOutcome::Unchanged(NoopReason::NoPreviousSibling)
        );
        assert_eq!(
            indent(&mut forest, "B", 1),
            MoveOutcome::Unchanged(NoopReason::NoPreviousSibling)
        );
        assert_eq!(serialize(&forest), TREE);
    }

    #[test]
    fn test_outdent_places_after_parent() {
        let mut forest = tree();
        assert_eq!(indent(&mut forest, "B", -1), MoveOutcome::Moved);
        assert_eq!(serialize(&forest), "[-1, [A, [C, D]], B, E, F]");
        assert_eq!(indent(&mut forest, "D", -1), MoveOutcome::Moved);
        assert_eq!(serialize(&forest), "[-1, [A, C, D], B, E, F]");
    }

    #[test]
    fn test_outdent_top_level_is_noop() {
        let mut forest = tree();
        assert_eq!(
            indent(&mut forest, "E", -1),
            MoveOutcome::Unchanged(NoopReason::AlreadyTopLevel)
        );
        assert_eq!(
            indent(&mut forest, "E", 0),
            MoveOutcome::Unchanged(NoopReason::ZeroDelta)
        );
        assert_eq!(serialize(&forest), TREE);
    }

    /// Top-level chain `n0 > n1 > ... > n{len-1}` followed by `rest`
    fn chain(len: usize, rest: &str) -> String {
        let mut text = String::from("[-1");
        for i in 0..len - 1 {
            text.push_str(&format!(", [n{}", i));
        }
        text.push_str(&format!(", n{}", len - 1));
        text.push_str(&"]".repeat(len - 1));
        text.push_str(rest);
        text.push(']');
        text
    }

    #[test]
    fn test_moves_stop_at_max_nesting() {
        let deepest = format!("n{}", MAX_NODE_DEPTH);
        let mut forest = parse(&chain(MAX_NODE_DEPTH + 1, ", [Y, Z], X")).unwrap();
        assert_eq!(forest.depth(forest.find_node(&deepest).unwrap()), MAX_NODE_DEPTH);

        // A leaf still fits at the bottom
        assert_eq!(move_before(&mut forest, "X", Some(&deepest)), MoveOutcome::Moved);
        assert!(parse(&serialize(&forest)).is_ok());

        // A subtree does not
        let text = serialize(&forest);
        assert_eq!(
            move_before(&mut forest, "Y", Some(&deepest)),
            MoveOutcome::Unchanged(NoopReason::TooDeep)
        );
        assert_eq!(
            indent(&mut forest, &deepest, 1),
            MoveOutcome::Unchanged(NoopReason::TooDeep)
        );
        assert_eq!(serialize(&forest), text);
        assert!(parse(&text).is_ok());
    }

    #[test]
    fn test_insert_task_prepends() {
        let mut forest = tree();
        assert!(insert_task(&mut forest, TaskKey::bare("G")));
        assert_eq!(serialize(&forest), "[-1, G, [A, B, [C, D]], E, F]");
        assert!(!insert_task(&mut forest, TaskKey::bare("G")));
        assert!(!insert_task(&mut forest, TaskKey::bare("  ")));
        assert!(!insert_task(&mut forest, TaskKey::sentinel()));
    }

    #[test]
    fn test_remove_task_splices_children() {
        let mut forest = tree();
        assert!(remove_task(&mut forest, "C"));
        assert_eq!(serialize(&forest), "[-1, [A, B, D], E, F]");
        assert!(!remove_task(&mut forest, "C"));
        assert!(!remove_task(&mut forest, "-1"));
    }

    #[test]
    fn test_reconcile_adds_and_removes() {
        let mut forest = tree();
        let ids = ["A", "B", "D", "E", "F", "G", "H"];
        assert!(reconcile(&mut forest, &ids));
        assert_eq!(serialize(&forest), "[-1, H, G, [A, B, D], E, F]");
        assert!(!reconcile(&mut forest, &ids));
        assert!(forest.validate().is_ok());
    }
}
