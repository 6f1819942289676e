use std::collections::HashMap;

use crate::model::node::{Entry, Node, NodeIdx, PositionRow, SENTINEL, TaskKey};

/// A task id occurred twice while building or editing a forest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate task id in tree: {0}")]
pub struct DuplicateIdError(pub String);

/// The subtask hierarchy of one filter.
///
/// Nodes live in an arena; parents are plain indices into it, so the only
/// ownership edge is arena → node. Slot 0 is always the sentinel root.
/// Removing a node leaves its slot behind, unreachable from the root and
/// absent from the index.
#[derive(Debug, Clone)]
pub struct Forest {
    nodes: Vec<Node>,
    index: HashMap<String, NodeIdx>,
}

impl Default for Forest {
    fn default() -> Self {
        Forest::new()
    }
}

impl Forest {
    /// A forest holding only the root
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(SENTINEL.to_string(), NodeIdx::ROOT);
        Forest {
            nodes: vec![Node::new(TaskKey::sentinel(), None)],
            index,
        }
    }

    /// Lower a parsed tree into a forest. The outer entry stands for the
    /// root; its children become the top-level nodes.
    pub fn build_from_parsed(entry: &Entry) -> Result<Self, DuplicateIdError> {
        let mut forest = Forest::new();
        forest.lower_children(NodeIdx::ROOT, entry.children())?;
        Ok(forest)
    }

    fn lower_children(&mut self, parent: NodeIdx, entries: &[Entry]) -> Result<(), DuplicateIdError> {
        for entry in entries {
            let end = self.nodes[parent.0].children.len();
            let idx = self.insert_key(entry.key().clone(), parent, end)?;
            self.lower_children(idx, entry.children())?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn root(&self) -> NodeIdx {
        NodeIdx::ROOT
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub fn key(&self, idx: NodeIdx) -> &TaskKey {
        &self.nodes[idx.0].key
    }

    pub fn id(&self, idx: NodeIdx) -> &str {
        &self.nodes[idx.0].key.text
    }

    pub fn parent(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.nodes[idx.0].parent
    }

    pub fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.nodes[idx.0].children
    }

    /// Number of task nodes (the root is not counted)
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// O(1) lookup through the id index. The sentinel resolves to the root.
    pub fn find_node(&self, id: &str) -> Option<NodeIdx> {
        self.index.get(id).copied()
    }

    /// Index of `idx` within its parent's children; `None` for the root
    pub fn position(&self, idx: NodeIdx) -> Option<usize> {
        let parent = self.parent(idx)?;
        self.children(parent).iter().position(|&c| c == idx)
    }

    /// Returns true if `candidate` is `of` or lies somewhere below it.
    /// Walks parent links from `candidate`, so cost is O(depth).
    pub fn is_descendant(&self, candidate: NodeIdx, of: NodeIdx) -> bool {
        let mut current = Some(candidate);
        while let Some(idx) = current {
            if idx == of {
                return true;
            }
            current = self.parent(idx);
        }
        false
    }

    /// Nesting depth: 0 for top-level tasks (and for the root itself)
    pub fn depth(&self, idx: NodeIdx) -> usize {
        let mut depth = 0usize;
        let mut current = self.parent(idx);
        while let Some(p) = current {
            depth += 1;
            current = self.parent(p);
        }
        depth.saturating_sub(1)
    }

    /// Every node below `idx`, in preorder, `idx` excluded
    pub fn descendants(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeIdx> = self.children(idx).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Levels below `idx`: 0 for a leaf, 1 if it only has leaf children
    pub fn height(&self, idx: NodeIdx) -> usize {
        let mut height = 0;
        let mut stack = vec![(idx, 0usize)];
        while let Some((next, level)) = stack.pop() {
            height = height.max(level);
            stack.extend(self.children(next).iter().map(|&c| (c, level + 1)));
        }
        height
    }

    /// Arena slots left behind by removed nodes
    pub fn dead_slots(&self) -> usize {
        self.nodes.len() - self.index.len()
    }

    /// All task nodes in document order
    pub fn iter(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.descendants(NodeIdx::ROOT).into_iter()
    }

    /// Task ids in document order, root excluded
    pub fn ordered_ids(&self) -> Vec<&str> {
        self.iter().map(|idx| self.id(idx)).collect()
    }

    /// Flattened parent/position table, one row per task in document order
    pub fn position_table(&self) -> Vec<PositionRow> {
        let mut rows = Vec::with_capacity(self.len());
        // (node, parent, position, depth)
        let mut stack: Vec<(NodeIdx, NodeIdx, usize, usize)> = self
            .children(NodeIdx::ROOT)
            .iter()
            .enumerate()
            .rev()
            .map(|(pos, &c)| (c, NodeIdx::ROOT, pos, 0))
            .collect();
        while let Some((idx, parent, position, depth)) = stack.pop() {
            rows.push(PositionRow {
                id: self.id(idx).to_string(),
                parent: self.id(parent).to_string(),
                position,
                depth,
            });
            for (pos, &child) in self.children(idx).iter().enumerate().rev() {
                stack.push((child, idx, pos, depth + 1));
            }
        }
        rows
    }

    /// Check the structural invariants: every reachable node is indexed under
    /// its own id, sits exactly once in its parent's children, and is reached
    /// exactly once from the root.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = vec![false; self.nodes.len()];
        seen[0] = true;
        let mut reachable = 0usize;
        for idx in self.iter() {
            if std::mem::replace(&mut seen[idx.0], true) {
                return Err(format!("node {} reached twice", self.id(idx)));
            }
            reachable += 1;
            if self.find_node(self.id(idx)) != Some(idx) {
                return Err(format!("node {} missing from index", self.id(idx)));
            }
            let parent = self
                .parent(idx)
                .ok_or_else(|| format!("node {} has no parent", self.id(idx)))?;
            let count = self.children(parent).iter().filter(|&&c| c == idx).count();
            if count != 1 {
                return Err(format!(
                    "node {} listed {} times under {}",
                    self.id(idx),
                    count,
                    self.id(parent)
                ));
            }
        }
        if reachable != self.len() {
            return Err(format!(
                "index holds {} tasks but {} are reachable",
                self.len(),
                reachable
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation primitives (callers keep the tree acyclic)
    // -----------------------------------------------------------------------

    /// Unlink `idx` from its parent, closing the gap. Returns where it was.
    pub(crate) fn detach(&mut self, idx: NodeIdx) -> Option<(NodeIdx, usize)> {
        let parent = self.parent(idx)?;
        let pos = self.position(idx)?;
        self.nodes[parent.0].children.remove(pos);
        self.nodes[idx.0].parent = None;
        Some((parent, pos))
    }

    /// Insert a detached node under `parent` at `pos` (clamped to the end)
    pub(crate) fn attach(&mut self, idx: NodeIdx, parent: NodeIdx, pos: usize) {
        let siblings = &mut self.nodes[parent.0].children;
        let pos = pos.min(siblings.len());
        siblings.insert(pos, idx);
        self.nodes[idx.0].parent = Some(parent);
    }

    /// Create a node for `key` under `parent` at `pos`
    pub(crate) fn insert_key(
        &mut self,
        key: TaskKey,
        parent: NodeIdx,
        pos: usize,
    ) -> Result<NodeIdx, DuplicateIdError> {
        if self.index.contains_key(&key.text) {
            return Err(DuplicateIdError(key.text));
        }
        let idx = NodeIdx(self.nodes.len());
        self.index.insert(key.text.clone(), idx);
        self.nodes.push(Node::new(key, None));
        self.attach(idx, parent, pos);
        Ok(idx)
    }

    /// Drop a node, moving its children into its former slot in order.
    /// The root cannot be removed.
    pub(crate) fn remove_spliced(&mut self, idx: NodeIdx) -> bool {
        if idx == NodeIdx::ROOT {
            return false;
        }
        let Some((parent, pos)) = self.detach(idx) else {
            return false;
        };
        let children = std::mem::take(&mut self.nodes[idx.0].children);
        for (offset, child) in children.into_iter().enumerate() {
            self.attach(child, parent, pos + offset);
        }
        let id = self.nodes[idx.0].key.text.clone();
        self.index.remove(&id);
        true
    }

    /// Rebuild the arena from the reachable nodes, in document order, dropping
    /// the slots of removed nodes. Ids, order and shape are unchanged; node
    /// indices are not stable across a compaction.
    pub(crate) fn compact(&mut self) {
        let order: Vec<NodeIdx> = std::iter::once(NodeIdx::ROOT).chain(self.iter()).collect();
        let mut remap = vec![NodeIdx::ROOT; self.nodes.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old.0] = NodeIdx(new);
        }

        let mut old_nodes = std::mem::take(&mut self.nodes);
        self.nodes = order
            .iter()
            .map(|&old| {
                let node = &mut old_nodes[old.0];
                Node {
                    key: node.key.clone(),
                    parent: node.parent.map(|p| remap[p.0]),
                    children: std::mem::take(&mut node.children)
                        .into_iter()
                        .map(|c| remap[c.0])
                        .collect(),
                }
            })
            .collect();
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.key.text.clone(), NodeIdx(i)))
            .collect();
    }
}
