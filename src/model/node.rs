use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of the virtual root: "top level of this filter"
pub const SENTINEL: &str = "-1";

/// How an id token is written in the serialized tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStyle {
    /// `12`, used for local ids and the sentinel
    Bare,
    /// `"a1b2"`, used for stable ids
    Quoted,
}

/// An id token: the text plus the way it is spelled on disk.
///
/// Identity is the text alone; `1` and `"1"` name the same task.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct TaskKey {
    pub text: String,
    pub style: KeyStyle,
}

impl TaskKey {
    pub fn bare(text: impl Into<String>) -> Self {
        TaskKey {
            text: text.into(),
            style: KeyStyle::Bare,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        TaskKey {
            text: text.into(),
            style: KeyStyle::Quoted,
        }
    }

    pub fn sentinel() -> Self {
        TaskKey::bare(SENTINEL)
    }

    pub fn is_sentinel(&self) -> bool {
        self.text == SENTINEL
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for TaskKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl std::hash::Hash for TaskKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Index of a node in its forest's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub(crate) usize);

impl NodeIdx {
    pub const ROOT: NodeIdx = NodeIdx(0);
}

/// One slot of the forest arena
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) key: TaskKey,
    /// Non-owning back-reference; `None` for the root and for removed slots
    pub(crate) parent: Option<NodeIdx>,
    pub(crate) children: Vec<NodeIdx>,
}

impl Node {
    pub(crate) fn new(key: TaskKey, parent: Option<NodeIdx>) -> Self {
        Node {
            key,
            parent,
            children: Vec::new(),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        &self.key.text
    }

    pub fn parent(&self) -> Option<NodeIdx> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIdx] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Parsed form of one array entry, before it is lowered into a forest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A bare id: a child with no children of its own
    Leaf(TaskKey),
    /// `[id, child, ...]`: the id followed by its children
    Subtree(TaskKey, Vec<Entry>),
}

impl Entry {
    pub fn key(&self) -> &TaskKey {
        match self {
            Entry::Leaf(key) | Entry::Subtree(key, _) => key,
        }
    }

    pub fn children(&self) -> &[Entry] {
        match self {
            Entry::Leaf(_) => &[],
            Entry::Subtree(_, children) => children,
        }
    }
}

/// One row of the flattened parent/position table persisted next to the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRow {
    pub id: String,
    pub parent: String,
    pub position: usize,
    pub depth: usize,
}
