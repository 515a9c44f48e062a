//! Folds pending transitions forward through later states
//! (`spec.md` §4.2.2), guarded by a reentrant do-not-propagate stack.

use crate::error::CompileResult;
use crate::offset::Offset;
use crate::state::fold_tree;
use crate::timeline::TimelineStore;
use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// A process-scoped reentrancy counter. While non-zero, `apply_transitions`
/// is a no-op; callers enter and leave via [`DoNotPropagateGuard`], which
/// releases on every exit path (including panics, via `Drop`).
#[derive(Clone, Default)]
pub struct DoNotPropagate(Rc<Cell<u32>>);

impl DoNotPropagate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.0.get() > 0
    }

    pub fn enter(&self) -> DoNotPropagateGuard {
        self.0.set(self.0.get() + 1);
        DoNotPropagateGuard(self.clone())
    }
}

pub struct DoNotPropagateGuard(DoNotPropagate);

impl Drop for DoNotPropagateGuard {
    fn drop(&mut self) {
        let count = self.0 .0.get();
        self.0 .0.set(count.saturating_sub(1));
    }
}

/// Propagates pending transitions forward starting from every offset in
/// `offsets`, using a min-offset priority queue. Each dequeued offset whose
/// recomputed tree differs from its stored tree is overwritten and its
/// successor (the next state with a resolved tree) is enqueued, chaining
/// the fold forward until it stabilizes.
///
/// A no-op while `guard.is_active()`.
pub fn apply_transitions(
    timeline: &mut TimelineStore,
    offsets: impl IntoIterator<Item = Offset>,
    guard: &DoNotPropagate,
) -> CompileResult<()> {
    if guard.is_active() {
        return Ok(());
    }

    let mut queue: BinaryHeap<Reverse<Offset>> = BinaryHeap::new();
    for offset in offsets {
        queue.push(Reverse(offset));
    }

    let mut previous_offset: Option<Offset> = None;
    while let Some(Reverse(offset)) = queue.pop() {
        if Some(offset) == previous_offset {
            continue;
        }
        previous_offset = Some(offset);

        let Some(_) = timeline.get(offset) else {
            continue;
        };
        let Some(previous_state) = timeline.find_before(offset, true) else {
            continue;
        };
        let previous_tree = previous_state
            .tree
            .resolved()
            .expect("find_before(with_node_tree=true) guarantees a resolved tree")
            .clone();

        let state = timeline.get(offset).unwrap();
        let new_tree = fold_tree(&previous_tree, &state.transitions, &state.stop_nodes)?;

        let changed = match &state.tree {
            crate::state::NodeTree::Unresolved => true,
            crate::state::NodeTree::Resolved(current) => {
                current.children != new_tree.children || current.parents != new_tree.parents
            }
        };

        if changed {
            timeline.get_mut(offset).unwrap().tree = crate::state::NodeTree::Resolved(new_tree);
            // Enqueue the very next state regardless of whether it is
            // already resolved — that is exactly the state this change
            // must now propagate into.
            if let Some(next) = timeline.find_after(offset, false) {
                tracing::debug!(from = offset.seconds(), to = next.offset.seconds(), "chaining tree resolution forward");
                queue.push(Reverse(next.offset));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{AddAction, NodeId};
    use crate::state::Transition;

    #[test]
    fn guard_suppresses_propagation() {
        let mut timeline = TimelineStore::new(NodeId(0));
        timeline.add_state_at(Offset::new(5.0));
        timeline
            .get_mut(Offset::new(5.0))
            .unwrap()
            .transitions
            .insert(NodeId(1), Transition::Add(AddAction::AddToTail(NodeId(0))));

        let guard = DoNotPropagate::new();
        let _held = guard.enter();
        apply_transitions(&mut timeline, [Offset::new(5.0)], &guard).unwrap();
        assert!(timeline.get(Offset::new(5.0)).unwrap().tree.resolved().is_none());
    }

    #[test]
    fn propagation_resolves_and_chains() {
        let mut timeline = TimelineStore::new(NodeId(0));
        timeline.add_state_at(Offset::new(5.0));
        timeline
            .get_mut(Offset::new(5.0))
            .unwrap()
            .transitions
            .insert(NodeId(1), Transition::Add(AddAction::AddToTail(NodeId(0))));
        timeline.add_state_at(Offset::new(10.0));

        let guard = DoNotPropagate::new();
        apply_transitions(&mut timeline, [Offset::new(5.0)], &guard).unwrap();

        let tree_at_5 = timeline.get(Offset::new(5.0)).unwrap().tree.resolved().unwrap();
        assert_eq!(tree_at_5.children[&NodeId(0)], vec![NodeId(1)]);
        // Chained forward even though the sparse clone at 10.0 had no
        // transitions of its own.
        let tree_at_10 = timeline.get(Offset::new(10.0)).unwrap().tree.resolved().unwrap();
        assert_eq!(tree_at_10.children[&NodeId(0)], vec![NodeId(1)]);
    }

    #[test]
    fn idempotent_reapplication() {
        let mut timeline = TimelineStore::new(NodeId(0));
        timeline.add_state_at(Offset::new(5.0));
        timeline
            .get_mut(Offset::new(5.0))
            .unwrap()
            .transitions
            .insert(NodeId(1), Transition::Add(AddAction::AddToTail(NodeId(0))));

        let guard = DoNotPropagate::new();
        apply_transitions(&mut timeline, [Offset::new(5.0)], &guard).unwrap();
        let first = timeline.get(Offset::new(5.0)).unwrap().tree.resolved().unwrap().children.clone();
        apply_transitions(&mut timeline, [Offset::new(5.0)], &guard).unwrap();
        let second = timeline.get(Offset::new(5.0)).unwrap().tree.resolved().unwrap().children.clone();
        assert_eq!(first, second);
    }
}
