//! A state is the session's structural snapshot at one offset: pending
//! transitions plus a (possibly unresolved) node tree.

use crate::buffer::BufferId;
use crate::error::{CompileError, CompileResult};
use crate::node::{AddAction, NodeId};
use crate::offset::Offset;
use std::collections::{BTreeSet, HashMap};

/// A pending structural mutation attached to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Add(AddAction),
    FreeNode,
}

/// An insertion-ordered `NodeId -> Transition` map. Re-inserting an
/// existing key updates its value without moving its position, matching
/// the ordered-dict semantics `spec.md` §9 calls for.
#[derive(Debug, Clone, Default)]
pub struct TransitionMap {
    order: Vec<NodeId>,
    values: HashMap<NodeId, Transition>,
}

impl TransitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: NodeId, transition: Transition) {
        if !self.values.contains_key(&node) {
            self.order.push(node);
        }
        self.values.insert(node, transition);
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Transition)> + '_ {
        self.order.iter().map(move |n| (*n, self.values[n]))
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// A resolved node tree: parent/child topology rooted at the session root.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTree {
    pub children: HashMap<NodeId, Vec<NodeId>>,
    pub parents: HashMap<NodeId, Option<NodeId>>,
}

impl ResolvedTree {
    pub fn root(root: NodeId) -> Self {
        let mut children = HashMap::new();
        children.insert(root, Vec::new());
        let mut parents = HashMap::new();
        parents.insert(root, None);
        ResolvedTree { children, parents }
    }

    /// Depth-first, child-order traversal starting at `root`.
    pub fn iter_depth_first(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        // Use an explicit stack but push children in reverse so they pop
        // in declared order (standard iterative-DFS trick).
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(kids) = self.children.get(&node) {
                for child in kids.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }
}

/// Tagged node-tree state: unresolved until propagation computes it.
#[derive(Debug, Clone)]
pub enum NodeTree {
    Unresolved,
    Resolved(ResolvedTree),
}

impl NodeTree {
    pub fn resolved(&self) -> Option<&ResolvedTree> {
        match self {
            NodeTree::Resolved(tree) => Some(tree),
            NodeTree::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub offset: Offset,
    pub transitions: TransitionMap,
    pub start_nodes: BTreeSet<NodeId>,
    pub stop_nodes: BTreeSet<NodeId>,
    pub overlap_nodes: BTreeSet<NodeId>,
    pub start_buffers: BTreeSet<BufferId>,
    pub stop_buffers: BTreeSet<BufferId>,
    pub overlap_buffers: BTreeSet<BufferId>,
    pub tree: NodeTree,
}

impl State {
    pub fn new_root(offset: Offset, root: NodeId) -> Self {
        State {
            offset,
            transitions: TransitionMap::new(),
            start_nodes: BTreeSet::new(),
            stop_nodes: BTreeSet::new(),
            overlap_nodes: BTreeSet::new(),
            start_buffers: BTreeSet::new(),
            stop_buffers: BTreeSet::new(),
            overlap_buffers: BTreeSet::new(),
            tree: NodeTree::Resolved(ResolvedTree::root(root)),
        }
    }

    /// A sparse clone at `offset`: metadata is fresh, the tree is left
    /// unresolved until propagation demands it (`spec.md` §9).
    pub fn clone_sparse_at(&self, offset: Offset) -> Self {
        State {
            offset,
            transitions: TransitionMap::new(),
            start_nodes: BTreeSet::new(),
            stop_nodes: BTreeSet::new(),
            overlap_nodes: BTreeSet::new(),
            start_buffers: BTreeSet::new(),
            stop_buffers: BTreeSet::new(),
            overlap_buffers: BTreeSet::new(),
            tree: NodeTree::Unresolved,
        }
    }

    /// A state is sparse when it has no pending mutations and no
    /// starting/stopping entities — the only states `remove_state_at` may
    /// discard.
    pub fn is_sparse(&self) -> bool {
        self.transitions.is_empty()
            && self.start_nodes.is_empty()
            && self.stop_nodes.is_empty()
            && self.start_buffers.is_empty()
            && self.stop_buffers.is_empty()
    }
}

fn remove_subtree(
    node: NodeId,
    children: &mut HashMap<NodeId, Vec<NodeId>>,
    parents: &mut HashMap<NodeId, Option<NodeId>>,
) {
    let kids = children.remove(&node).unwrap_or_default();
    for kid in kids {
        remove_subtree(kid, children, parents);
    }
    if let Some(Some(parent)) = parents.get(&node).copied() {
        if let Some(siblings) = children.get_mut(&parent) {
            siblings.retain(|&n| n != node);
        }
    }
    parents.remove(&node);
}

fn unlink_from_current_parent(
    node: NodeId,
    parents: &HashMap<NodeId, Option<NodeId>>,
    children: &mut HashMap<NodeId, Vec<NodeId>>,
) {
    if let Some(Some(parent)) = parents.get(&node).copied() {
        if let Some(siblings) = children.get_mut(&parent) {
            siblings.retain(|&n| n != node);
        }
    }
}

fn position_of(children: &[NodeId], node: NodeId) -> Option<usize> {
    children.iter().position(|&n| n == node)
}

fn insert_per_action(
    source: NodeId,
    action: AddAction,
    children: &mut HashMap<NodeId, Vec<NodeId>>,
    parents: &mut HashMap<NodeId, Option<NodeId>>,
) -> CompileResult<()> {
    children.entry(source).or_default();
    match action {
        AddAction::AddToHead(target) => {
            if !children.contains_key(&target) {
                return Err(CompileError::UnknownNode(target));
            }
            children.get_mut(&target).unwrap().insert(0, source);
            parents.insert(source, Some(target));
        }
        AddAction::AddToTail(target) => {
            if !children.contains_key(&target) {
                return Err(CompileError::UnknownNode(target));
            }
            children.get_mut(&target).unwrap().push(source);
            parents.insert(source, Some(target));
        }
        AddAction::AddBefore(reference) => {
            let parent = *parents
                .get(&reference)
                .ok_or(CompileError::UnknownNode(reference))?;
            let parent = parent.ok_or(CompileError::UnknownNode(reference))?;
            let siblings = children.get_mut(&parent).unwrap();
            let index = position_of(siblings, reference).ok_or(CompileError::UnknownNode(reference))?;
            siblings.insert(index, source);
            parents.insert(source, Some(parent));
        }
        AddAction::AddAfter(reference) => {
            let parent = *parents
                .get(&reference)
                .ok_or(CompileError::UnknownNode(reference))?;
            let parent = parent.ok_or(CompileError::UnknownNode(reference))?;
            let siblings = children.get_mut(&parent).unwrap();
            let index = position_of(siblings, reference).ok_or(CompileError::UnknownNode(reference))?;
            siblings.insert(index + 1, source);
            parents.insert(source, Some(parent));
        }
        AddAction::ReplaceNode(reference) => {
            let parent = *parents
                .get(&reference)
                .ok_or(CompileError::UnknownNode(reference))?;
            let parent = parent.ok_or(CompileError::UnknownNode(reference))?;
            let siblings = children.get_mut(&parent).unwrap();
            let index = position_of(siblings, reference).ok_or(CompileError::UnknownNode(reference))?;
            siblings[index] = source;
            parents.insert(source, Some(parent));
            if reference != source {
                remove_subtree(reference, children, parents);
            }
        }
    }
    Ok(())
}

/// Folds `transitions` and `stop_nodes` forward through `prev`, producing
/// the new resolved tree per the add-action algebra of `spec.md` §4.2.1.
///
/// Determinism: transitions are applied in their insertion order, so two
/// transitions targeting the same position are resolved by which was
/// registered first.
pub fn fold_tree(
    prev: &ResolvedTree,
    transitions: &TransitionMap,
    stop_nodes: &BTreeSet<NodeId>,
) -> CompileResult<ResolvedTree> {
    let mut children = prev.children.clone();
    let mut parents = prev.parents.clone();

    for &node in stop_nodes {
        remove_subtree(node, &mut children, &mut parents);
    }

    for (source, transition) in transitions.iter() {
        if parents.contains_key(&source) {
            unlink_from_current_parent(source, &parents, &mut children);
        }
        match transition {
            Transition::FreeNode => {
                remove_subtree(source, &mut children, &mut parents);
            }
            Transition::Add(add_action) => {
                insert_per_action(source, add_action, &mut children, &mut parents)?;
            }
        }
    }

    Ok(ResolvedTree { children, parents })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u32) -> NodeId {
        NodeId(id)
    }

    #[test]
    fn add_to_tail_then_add_before() {
        let root = n(0);
        let tree = ResolvedTree::root(root);
        let mut transitions = TransitionMap::new();
        transitions.insert(n(1), Transition::Add(AddAction::AddToTail(root)));
        transitions.insert(n(2), Transition::Add(AddAction::AddToTail(root)));
        let stop = BTreeSet::new();
        let tree = fold_tree(&tree, &transitions, &stop).unwrap();
        assert_eq!(tree.children[&root], vec![n(1), n(2)]);

        let mut transitions2 = TransitionMap::new();
        transitions2.insert(n(3), Transition::Add(AddAction::AddBefore(n(2))));
        let tree2 = fold_tree(&tree, &transitions2, &stop).unwrap();
        assert_eq!(tree2.children[&root], vec![n(1), n(3), n(2)]);
        assert_eq!(tree2.parents[&n(3)], Some(root));
    }

    #[test]
    fn free_node_removes_subtree() {
        let root = n(0);
        let tree = ResolvedTree::root(root);
        let mut transitions = TransitionMap::new();
        transitions.insert(n(1), Transition::Add(AddAction::AddToTail(root)));
        transitions.insert(n(2), Transition::Add(AddAction::AddToTail(n(1))));
        let stop = BTreeSet::new();
        let tree = fold_tree(&tree, &transitions, &stop).unwrap();

        let mut stop_nodes = BTreeSet::new();
        stop_nodes.insert(n(1));
        let tree2 = fold_tree(&tree, &TransitionMap::new(), &stop_nodes).unwrap();
        assert!(!tree2.children.contains_key(&n(1)));
        assert!(!tree2.children.contains_key(&n(2)));
        assert_eq!(tree2.children[&root], Vec::<NodeId>::new());
    }

    #[test]
    fn replace_node_splices_in_place() {
        let root = n(0);
        let tree = ResolvedTree::root(root);
        let mut transitions = TransitionMap::new();
        transitions.insert(n(1), Transition::Add(AddAction::AddToTail(root)));
        transitions.insert(n(2), Transition::Add(AddAction::AddToTail(root)));
        let stop = BTreeSet::new();
        let tree = fold_tree(&tree, &transitions, &stop).unwrap();

        let mut replace = TransitionMap::new();
        replace.insert(n(3), Transition::Add(AddAction::ReplaceNode(n(1))));
        let tree2 = fold_tree(&tree, &replace, &stop).unwrap();
        assert_eq!(tree2.children[&root], vec![n(3), n(2)]);
        assert!(!tree2.parents.contains_key(&n(1)));
    }

    #[test]
    fn depth_first_iteration_is_child_order() {
        let root = n(0);
        let tree = ResolvedTree::root(root);
        let mut transitions = TransitionMap::new();
        transitions.insert(n(1), Transition::Add(AddAction::AddToTail(root)));
        transitions.insert(n(2), Transition::Add(AddAction::AddToTail(root)));
        transitions.insert(n(3), Transition::Add(AddAction::AddToTail(n(1))));
        let stop = BTreeSet::new();
        let tree = fold_tree(&tree, &transitions, &stop).unwrap();
        assert_eq!(tree.iter_depth_first(root), vec![root, n(1), n(3), n(2)]);
    }
}
