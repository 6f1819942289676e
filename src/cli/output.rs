use serde::Serialize;

use crate::model::forest::Forest;
use crate::model::node::{NodeIdx, PositionRow};
use crate::ops::tree_ops::{MoveOutcome, NoopReason};
use crate::ops::updater::NodeInfo;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskNodeJson {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<TaskNodeJson>,
}

#[derive(Serialize)]
pub struct TreeJson {
    pub filter: String,
    pub tree: String,
    pub tasks: Vec<TaskNodeJson>,
}

#[derive(Serialize)]
pub struct CheckJson {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct MoveJson {
    pub filter: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    pub outcome: MoveOutcome,
    pub tree: String,
}

#[derive(Serialize)]
pub struct ChangeJson {
    pub filter: String,
    pub changed: bool,
    pub tree: String,
}

#[derive(Serialize)]
pub struct FindJson {
    #[serde(flatten)]
    pub node: NodeInfo,
    pub descendants: Vec<String>,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn tree_to_json(filter: &str, tree: &str, forest: &Forest) -> TreeJson {
    TreeJson {
        filter: filter.to_string(),
        tree: tree.to_string(),
        tasks: subtasks_to_json(forest, forest.root()),
    }
}

fn subtasks_to_json(forest: &Forest, idx: NodeIdx) -> Vec<TaskNodeJson> {
    forest
        .children(idx)
        .iter()
        .map(|&child| TaskNodeJson {
            id: forest.id(child).to_string(),
            subtasks: subtasks_to_json(forest, child),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

/// Indented outline of the forest, two spaces per level
pub fn format_outline(forest: &Forest) -> Vec<String> {
    if forest.is_empty() {
        return vec!["(empty)".to_string()];
    }
    forest
        .iter()
        .map(|idx| format!("{}{}", "  ".repeat(forest.depth(idx)), forest.id(idx)))
        .collect()
}

/// Position table with a header row
pub fn format_positions(rows: &[PositionRow]) -> Vec<String> {
    let width = rows
        .iter()
        .flat_map(|r| [r.id.len(), r.parent.len()])
        .max()
        .unwrap_or(0)
        .max("parent".len());
    let mut lines = vec![format!(
        "{:<w$}  {:<w$}  {:>3}  {:>5}",
        "id",
        "parent",
        "pos",
        "depth",
        w = width
    )];
    for row in rows {
        lines.push(format!(
            "{:<w$}  {:<w$}  {:>3}  {:>5}",
            row.id,
            row.parent,
            row.position,
            row.depth,
            w = width
        ));
    }
    lines
}

/// One-line report of a move or indent
pub fn format_outcome(target: &str, outcome: MoveOutcome) -> String {
    match outcome {
        MoveOutcome::Moved => format!("moved {}", target),
        MoveOutcome::Unchanged(reason) => {
            format!("unchanged {}: {}", target, describe_noop(reason))
        }
    }
}

pub fn describe_noop(reason: NoopReason) -> &'static str {
    match reason {
        NoopReason::UnknownTarget => "task not in tree",
        NoopReason::UnknownBefore => "anchor task not in tree",
        NoopReason::BeforeSelf => "cannot move a task before itself",
        NoopReason::BeforeDescendant => "anchor is inside the moved subtree",
        NoopReason::AlreadyInPlace => "already in place",
        NoopReason::NoPreviousSibling => "no previous sibling to indent under",
        NoopReason::AlreadyTopLevel => "already top-level",
        NoopReason::ZeroDelta => "nothing to do",
        NoopReason::TooDeep => "would nest deeper than the tree format allows",
    }
}

/// Detail view of a single node
pub fn format_node_info(info: &NodeInfo, descendants: &[String]) -> Vec<String> {
    let mut lines = vec![info.id.clone()];
    lines.push(format!(
        "parent: {}",
        info.parent.as_deref().unwrap_or("(none)")
    ));
    if let Some(position) = info.position {
        lines.push(format!("position: {}", position));
    }
    lines.push(format!("depth: {}", info.depth));
    if !info.children.is_empty() {
        lines.push(format!("children: {}", info.children.join(", ")));
    }
    if !descendants.is_empty() {
        lines.push(format!("descendants: {}", descendants.join(", ")));
    }
    lines
}
