//! Traversal helpers for [`SlotTree`]: lazy iterators and eager visitors.
//!
//! All traversals are pre-order: a node is visited before its children, and
//! children are visited in insertion order.

use super::{NodeIndex, SlotTree, TreeError};

// --- Ancestors Iterator ---

/// Walks upwards from a starting node to the top of its tree, inclusive.
///
/// Stops at the first node whose parent is missing or not live, and after
/// `slot_count()` nodes in case parent links loop.
pub struct AncestorsIter<'a, T> {
    tree: &'a SlotTree<T>,
    /// The next node to yield. `None` once the top has been yielded.
    current: Option<NodeIndex>,
    remaining: usize,
}

impl<T> Clone for AncestorsIter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree,
            current: self.current,
            remaining: self.remaining,
        }
    }
}

impl<'a, T> AncestorsIter<'a, T> {
    pub fn new(tree: &'a SlotTree<T>, start: NodeIndex) -> Self {
        AncestorsIter {
            tree,
            current: Some(start).filter(|s| tree.is_live(*s)),
            remaining: tree.slot_count(),
        }
    }
}

impl<T> Iterator for AncestorsIter<'_, T> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.remaining = self.remaining.checked_sub(1)?;
        self.current = self.tree.slots.nodes[node.0]
            .parent
            .filter(|p| self.tree.is_live(*p));
        Some(node)
    }
}

// --- Preorder Iterator ---

/// A pre-order DFS iterator.
pub struct PreorderIter<'a, T> {
    tree: &'a SlotTree<T>,
    /// Nodes still to visit, next on top.
    stack: Vec<NodeIndex>,
}

impl<T> Clone for PreorderIter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree,
            stack: self.stack.clone(),
        }
    }
}

impl<'a, T> PreorderIter<'a, T> {
    /// Starts at `start`; an empty iterator when `start` is `None`.
    pub fn new(tree: &'a SlotTree<T>, start: Option<NodeIndex>) -> Self {
        PreorderIter {
            tree,
            stack: start.into_iter().collect(),
        }
    }
}

impl<T> Iterator for PreorderIter<'_, T> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // reversed so the first child is popped next
        self.stack
            .extend(self.tree.slots.nodes[node.0].children.iter().rev());
        Some(node)
    }
}

impl<T> SlotTree<T> {
    /// Pre-order iterator over the whole tree, starting at the root.
    pub fn iter_preorder(&self) -> PreorderIter<'_, T> {
        PreorderIter::new(self, self.top_node())
    }

    /// Pre-order iterator over the subtree rooted at `start`.
    pub fn iter_preorder_from(
        &self,
        start: NodeIndex,
    ) -> Result<PreorderIter<'_, T>, TreeError> {
        self.slots.slot(start)?;
        Ok(PreorderIter::new(self, Some(start)))
    }

    /// `start`, its parent, and so on up to the root.
    pub fn iter_ancestors(&self, start: NodeIndex) -> AncestorsIter<'_, T> {
        AncestorsIter::new(self, start)
    }

    /// Calls `visitor` on every node, root first. Does nothing on an empty tree.
    pub fn walk<F>(&self, visitor: F)
    where
        F: FnMut(NodeIndex, &T),
    {
        self.visit(self.top_node(), visitor);
    }

    /// Like [`SlotTree::walk`], restricted to the subtree rooted at `start`.
    pub fn walk_from<F>(&self, start: NodeIndex, visitor: F) -> Result<(), TreeError>
    where
        F: FnMut(NodeIndex, &T),
    {
        self.slots.slot(start)?;
        self.visit(Some(start), visitor);
        Ok(())
    }

    /// Walk that also hands the visitor the depth of each node (root at 0).
    pub fn walk_with_depth<F>(&self, mut visitor: F)
    where
        F: FnMut(NodeIndex, &T, usize),
    {
        self.walk_and_pass(0, |index, payload, depth: &usize| {
            visitor(index, payload, *depth);
            depth + 1
        });
    }

    /// Pre-order walk threading a value from parent to children.
    ///
    /// The root receives `seed`; every other node receives what the visitor
    /// returned for its parent.
    pub fn walk_and_pass<R, F>(&self, seed: R, visitor: F)
    where
        F: FnMut(NodeIndex, &T, &R) -> R,
    {
        self.pass(self.top_node(), seed, visitor);
    }

    /// Like [`SlotTree::walk_and_pass`], restricted to the subtree rooted at `start`.
    pub fn walk_and_pass_from<R, F>(
        &self,
        start: NodeIndex,
        seed: R,
        visitor: F,
    ) -> Result<(), TreeError>
    where
        F: FnMut(NodeIndex, &T, &R) -> R,
    {
        self.slots.slot(start)?;
        self.pass(Some(start), seed, visitor);
        Ok(())
    }

    fn visit<F>(&self, start: Option<NodeIndex>, mut visitor: F)
    where
        F: FnMut(NodeIndex, &T),
    {
        for index in PreorderIter::new(self, start) {
            visitor(index, &self.slots.nodes[index.0].payload);
        }
    }

    fn pass<R, F>(&self, start: Option<NodeIndex>, seed: R, mut visitor: F)
    where
        F: FnMut(NodeIndex, &T, &R) -> R,
    {
        // contexts[k] is the value handed to the children of the k-th visited node
        let mut contexts = vec![seed];
        let mut stack: Vec<(NodeIndex, usize)> =
            start.into_iter().map(|s| (s, 0)).collect();

        while let Some((node, parent_context)) = stack.pop() {
            let slot = &self.slots.nodes[node.0];
            let context = visitor(node, &slot.payload, &contexts[parent_context]);
            contexts.push(context);
            let here = contexts.len() - 1;
            stack.extend(slot.children.iter().rev().map(|c| (*c, here)));
        }
    }
}
