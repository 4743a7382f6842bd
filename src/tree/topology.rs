//! Parent/child bookkeeping on top of the slot allocator.
//!
//! A non-empty tree has exactly one live node without a parent. Inserting a
//! second parentless node rebases the tree: the new node becomes the root and
//! the former root becomes its first child.

use bitvec::vec::BitVec;
use tracing::debug;

use super::{NodeIndex, Removal, SlotTree, TreeError};

impl<T> SlotTree<T> {
    /// Inserts `payload` as the last child of `parent`, or as the new root when
    /// `parent` is `None`.
    ///
    /// Returns the index of the new node: the most recently freed slot if there
    /// is one, otherwise a freshly appended slot.
    pub fn add_node(
        &mut self,
        payload: T,
        parent: Option<NodeIndex>,
    ) -> Result<NodeIndex, TreeError> {
        let previous_top = match parent {
            Some(p) => {
                self.slots.slot(p)?;
                None
            }
            None => self.top_node(),
        };

        let index = self.slots.allocate(payload, parent);

        if let Some(p) = parent {
            self.slots.nodes[p.0].children.push(index);
        } else if let Some(old_root) = previous_top {
            debug!(new_root = %index, %old_root, "rebasing tree onto new root");
            self.slots.nodes[index.0].children.push(old_root);
            self.slots.nodes[old_root.0].parent = Some(index);
        }

        debug!(%index, parent = ?parent, "added node");
        Ok(index)
    }

    /// Frees `index` and unlinks it from its parent.
    ///
    /// With [`Removal::Recursive`] every descendant is freed as well, each
    /// subtree before the child that roots it. The descendants are not unlinked
    /// from one another; the whole subtree becomes garbage as a unit.
    ///
    /// With [`Removal::Detach`] the children stay live and keep the freed slot
    /// as their parent. Resolve them with [`SlotTree::reparent`] or another
    /// removal before trusting parent links again.
    pub fn remove_node(&mut self, index: NodeIndex, removal: Removal) -> Result<(), TreeError> {
        let parent = self
            .slots
            .slot(index)?
            .parent
            .filter(|p| self.slots.is_live(*p));
        let position = match parent {
            Some(p) => Some((p, self.position_in_parent(p, index)?)),
            None => None,
        };

        self.slots.free(index)?;
        if let Some((p, pos)) = position {
            self.slots.nodes[p.0].children.remove(pos);
        }

        if removal == Removal::Recursive {
            self.free_descendants(index)?;
        }

        debug!(%index, ?removal, free = self.slots.free_list.len(), "removed node");
        Ok(())
    }

    /// The root: found by taking the lowest live slot and climbing parent links.
    ///
    /// The climb stops at the first node whose parent is not live, so a
    /// detached fragment reports its own top.
    pub fn top_node(&self) -> Option<NodeIndex> {
        if self.is_empty() {
            return None;
        }
        let first = self.slots.first_live()?;
        self.iter_ancestors(first).last()
    }

    /// Moves the live node `child` to the end of `new_parent`'s children.
    ///
    /// The old parent, if still live and still listing `child`, loses it. An
    /// old parent that was freed, or freed and recycled for another node, is
    /// left alone, so orphans of a [`Removal::Detach`] can always be adopted.
    /// Fails with
    /// [`TreeError::Cycle`] if `new_parent` is `child` or one of its
    /// descendants.
    pub fn reparent(&mut self, child: NodeIndex, new_parent: NodeIndex) -> Result<(), TreeError> {
        let old_parent = self.slots.slot(child)?.parent;
        self.slots.slot(new_parent)?;

        if old_parent == Some(new_parent) {
            return Ok(());
        }
        if self.iter_ancestors(new_parent).any(|a| a == child) {
            return Err(TreeError::Cycle(child));
        }

        if let Some(p) = old_parent.filter(|p| self.slots.is_live(*p)) {
            if let Ok(pos) = self.position_in_parent(p, child) {
                self.slots.nodes[p.0].children.remove(pos);
            }
        }
        self.slots.nodes[child.0].parent = Some(new_parent);
        self.slots.nodes[new_parent.0].children.push(child);

        debug!(%child, %new_parent, "reparented node");
        Ok(())
    }

    /// Checks the structural invariants and reports the first violation.
    pub fn validate(&self) -> Result<(), TreeError> {
        let broken = |msg: String| Err(TreeError::BrokenInvariant(msg));
        let n = self.slots.slot_count();

        let mut seen_free: BitVec = BitVec::repeat(false, n);
        for &i in &self.slots.free_list {
            if i.0 >= n || seen_free[i.0] {
                return broken(format!("free-list entry {i} is out of range or repeated"));
            }
            seen_free.set(i.0, true);
        }
        if seen_free != !self.slots.live.clone() {
            return broken("free list and liveness disagree".into());
        }

        let mut roots = 0;
        for i in self.slots.live.iter_ones() {
            let (index, slot) = (NodeIndex(i), &self.slots.nodes[i]);
            match slot.parent {
                None => roots += 1,
                Some(p) => {
                    if !self.slots.is_live(p) {
                        return broken(format!("node {index} has freed parent {p}"));
                    }
                    let listed = self.slots.nodes[p.0]
                        .children
                        .iter()
                        .filter(|c| **c == index)
                        .count();
                    if listed != 1 {
                        return broken(format!(
                            "node {index} is listed {listed} times by its parent {p}"
                        ));
                    }
                }
            }
            for &c in &slot.children {
                if !self.slots.is_live(c) || self.slots.nodes[c.0].parent != Some(index) {
                    return broken(format!("child {c} of {index} does not point back"));
                }
            }
        }

        match (self.is_empty(), roots) {
            (true, 0) | (false, 1) => {}
            (_, roots) => return broken(format!("{roots} live nodes without a parent")),
        }

        // with the links above consistent, only a parent cycle can hide nodes
        let reached = self.iter_preorder().count();
        if reached != self.len() {
            return broken(format!(
                "{reached} of {} live nodes are reachable from the root",
                self.len()
            ));
        }
        Ok(())
    }

    fn position_in_parent(&self, parent: NodeIndex, child: NodeIndex) -> Result<usize, TreeError> {
        self.slots.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(TreeError::StructuralInconsistency { parent, child })
    }

    /// Frees every descendant of the already-freed `index`, post-order.
    fn free_descendants(&mut self, index: NodeIndex) -> Result<(), TreeError> {
        let mut stack = vec![(index, 0)];
        while let Some((node, next)) = stack.pop() {
            match self.slots.nodes[node.0].children.get(next).copied() {
                Some(child) => {
                    stack.push((node, next + 1));
                    stack.push((child, 0));
                }
                None if node != index => self.slots.free(node)?,
                None => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::tree::{NodeIndex, Removal, SlotTree, TreeError};

    #[test]
    fn reparent_resolves_detached_children() {
        let mut tree = SlotTree::new();
        let a = tree.add_node('a', None).unwrap();
        let b = tree.add_node('b', Some(a)).unwrap();
        let c = tree.add_node('c', Some(b)).unwrap();
        let d = tree.add_node('d', Some(b)).unwrap();

        tree.remove_node(b, Removal::Detach).unwrap();
        assert_eq!(tree.parent_of(c), Ok(Some(b)));
        assert!(tree.validate().is_err());

        tree.reparent(c, a).unwrap();
        tree.reparent(d, a).unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.children(a).unwrap(), &[c, d]);
        assert_eq!(tree.top_node(), Some(a));
    }

    #[test]
    fn recycled_parent_slot_releases_its_orphans() {
        let mut tree = SlotTree::new();
        let a = tree.add_node(0, None).unwrap();
        let b = tree.add_node(1, Some(a)).unwrap();
        let c = tree.add_node(2, Some(b)).unwrap();

        tree.remove_node(b, Removal::Detach).unwrap();
        assert_eq!(tree.parent_of(c), Ok(Some(b)));
        // the freed parent slot goes to an unrelated node
        assert_eq!(tree.add_node(3, Some(a)), Ok(b));
        assert_eq!(tree.parent_of(c), Ok(None));
        assert_eq!(tree.children(b).unwrap(), &[] as &[NodeIndex]);
        assert!(matches!(tree.validate(), Err(TreeError::BrokenInvariant(_))));

        tree.reparent(c, a).unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.children(a).unwrap(), &[b, c]);
        tree.remove_node(c, Removal::Recursive).unwrap();
        tree.validate().unwrap();
    }

    #[test]
    fn inserting_under_an_orphan_does_not_close_a_loop() {
        let mut tree = SlotTree::new();
        let a = tree.add_node(0, None).unwrap();
        let b = tree.add_node(1, Some(a)).unwrap();
        let c = tree.add_node(2, Some(b)).unwrap();
        tree.remove_node(b, Removal::Detach).unwrap();

        // the new child of c recycles the slot c still names as parent
        let d = tree.add_node(3, Some(c)).unwrap();
        assert_eq!(d, b);
        assert_eq!(tree.parent_of(c), Ok(None));
        assert_eq!(tree.iter_ancestors(d).collect::<Vec<_>>(), [d, c]);

        tree.reparent(c, a).unwrap();
        tree.validate().unwrap();
    }

    #[test]
    fn reparent_skips_a_live_parent_that_does_not_list_the_child() {
        let mut tree = SlotTree::new();
        let r = tree.add_node(0, None).unwrap();
        let a = tree.add_node(1, Some(r)).unwrap();
        let b = tree.add_node(2, Some(r)).unwrap();
        tree.slots.nodes[r.0].children.retain(|&x| x != b);
        tree.slots.nodes[b.0].parent = Some(a);

        assert_eq!(
            tree.remove_node(b, Removal::Recursive),
            Err(TreeError::StructuralInconsistency { parent: a, child: b })
        );
        tree.reparent(b, r).unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.children(r).unwrap(), &[a, b]);
    }

    #[test]
    fn validate_finds_nodes_cut_off_by_a_parent_cycle() {
        let mut tree = SlotTree::new();
        let r = tree.add_node(0, None).unwrap();
        let a = tree.add_node(1, Some(r)).unwrap();
        let b = tree.add_node(2, Some(a)).unwrap();

        // a and b become each other's parent, leaving r alone
        tree.slots.nodes[r.0].children.clear();
        tree.slots.nodes[a.0].parent = Some(b);
        tree.slots.nodes[b.0].children.push(a);
        assert_eq!(
            tree.validate(),
            Err(TreeError::BrokenInvariant(
                "1 of 3 live nodes are reachable from the root".into()
            ))
        );

        // once the root is gone the climb still terminates
        tree.slots.free(r).unwrap();
        assert!(tree.top_node().is_some());
        assert!(tree.validate().is_err());
        assert!(tree.iter_ancestors(a).count() <= tree.slot_count());
    }

    #[test]
    fn reparent_rejects_cycles() {
        let mut tree = SlotTree::new();
        let a = tree.add_node(0, None).unwrap();
        let b = tree.add_node(1, Some(a)).unwrap();
        let c = tree.add_node(2, Some(b)).unwrap();

        assert_eq!(tree.reparent(a, c), Err(TreeError::Cycle(a)));
        assert_eq!(tree.reparent(b, b), Err(TreeError::Cycle(b)));
        tree.validate().unwrap();
    }

    #[test]
    fn reparent_moves_to_end_of_children() {
        let mut tree = SlotTree::new();
        let r = tree.add_node(0, None).unwrap();
        let a = tree.add_node(1, Some(r)).unwrap();
        let b = tree.add_node(2, Some(r)).unwrap();
        let c = tree.add_node(3, Some(a)).unwrap();

        tree.reparent(c, b).unwrap();
        assert_eq!(tree.children(a).unwrap(), &[] as &[NodeIndex]);
        assert_eq!(tree.children(b).unwrap(), &[c]);

        tree.reparent(a, b).unwrap();
        assert_eq!(tree.children(r).unwrap(), &[b]);
        assert_eq!(tree.children(b).unwrap(), &[c, a]);
        tree.validate().unwrap();
    }

    #[test]
    fn unlink_detects_missing_back_reference() {
        let mut tree = SlotTree::new();
        let r = tree.add_node(0, None).unwrap();
        let a = tree.add_node(1, Some(r)).unwrap();
        tree.slots.nodes[r.0].children.clear();

        assert_eq!(
            tree.remove_node(a, Removal::Recursive),
            Err(TreeError::StructuralInconsistency { parent: r, child: a })
        );
        assert!(tree.is_live(a));
    }

    #[test]
    fn remove_rejects_freed_and_unknown_indices() {
        let mut tree = SlotTree::new();
        let r = tree.add_node(0, None).unwrap();
        let a = tree.add_node(1, Some(r)).unwrap();
        tree.remove_node(a, Removal::Recursive).unwrap();

        assert_eq!(
            tree.remove_node(a, Removal::Recursive),
            Err(TreeError::InvalidIndex(a))
        );
        assert_eq!(
            tree.remove_node(NodeIndex(9), Removal::Detach),
            Err(TreeError::InvalidIndex(NodeIndex(9)))
        );
        assert_eq!(tree.free_list(), &[a]);
    }

    #[test]
    fn add_under_freed_parent_fails_without_allocating() {
        let mut tree = SlotTree::new();
        let r = tree.add_node(0, None).unwrap();
        let a = tree.add_node(1, Some(r)).unwrap();
        tree.remove_node(a, Removal::Recursive).unwrap();

        assert_eq!(tree.add_node(2, Some(a)), Err(TreeError::InvalidIndex(a)));
        assert_eq!(tree.free_list(), &[a]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn rebase_onto_recycled_low_slot() {
        let mut tree = SlotTree::new();
        let a = tree.add_node('a', None).unwrap();
        let b = tree.add_node('b', Some(a)).unwrap();
        // drop the root but keep its child around, then make the child the root
        tree.remove_node(a, Removal::Detach).unwrap();
        tree.slots.nodes[b.0].parent = None;
        tree.validate().unwrap();

        // slot 0 is recycled for the new root; the old root must still be found
        let c = tree.add_node('c', None).unwrap();
        assert_eq!(c, a);
        assert_eq!(tree.top_node(), Some(c));
        assert_eq!(tree.children(c).unwrap(), &[b]);
        assert_eq!(tree.parent_of(b), Ok(Some(c)));
        tree.validate().unwrap();
    }
}
