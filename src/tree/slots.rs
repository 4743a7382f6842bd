//! Slot storage with LIFO free-list recycling.
//!
//! Slots are never physically removed. Freeing a slot pushes its index on the
//! free list and clears its liveness bit; the stale payload and links stay in
//! place until an allocation recycles the slot.

use bitvec::vec::BitVec;
use tracing::{debug, trace};

use super::{NodeIndex, TreeError};

/// One position of the backing array: payload, parent link and ordered children.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot<T> {
    pub(crate) payload: T,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) children: Vec<NodeIndex>,
}

impl<T> Slot<T> {
    pub fn new(payload: T, parent: Option<NodeIndex>) -> Self {
        Slot {
            payload,
            parent,
            children: Vec::new(),
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn map<F, U>(self, mut transform: F) -> Slot<U>
    where
        F: FnMut(T) -> U,
    {
        Slot {
            payload: transform(self.payload),
            parent: self.parent,
            children: self.children,
        }
    }
}

/// Growable slot array plus the free list of recyclable indices.
///
/// `live` mirrors the free list: bit `i` is set iff `i` is not on the free list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotAllocator<T> {
    pub(crate) nodes: Vec<Slot<T>>,
    pub(crate) free_list: Vec<NodeIndex>,
    pub(crate) live: BitVec,
}

impl<T> Default for SlotAllocator<T> {
    fn default() -> Self {
        SlotAllocator {
            nodes: Vec::new(),
            free_list: Vec::new(),
            live: BitVec::new(),
        }
    }
}

impl<T> SlotAllocator<T> {
    /// Rebuilds an allocator from raw parts.
    ///
    /// Checks that every link and free-list entry stays inside the slot
    /// array and that no index is freed twice. Among live slots, every listed
    /// child must be live, point back at the slot listing it and be listed
    /// only once, and parent links must not form a cycle. Freed slots keep
    /// whatever stale links they had.
    pub fn from_parts(
        nodes: Vec<Slot<T>>,
        free_list: Vec<NodeIndex>,
    ) -> Result<Self, TreeError> {
        let len = nodes.len();
        let out_of_range = |what: String| {
            TreeError::MalformedDocument(format!("{what} is outside the {len} stored slots"))
        };

        for (position, slot) in nodes.iter().enumerate() {
            if let Some(parent) = slot.parent {
                if parent.0 >= len {
                    return Err(out_of_range(format!("parent {parent} of slot {position}")));
                }
            }
            if let Some(child) = slot.children.iter().find(|c| c.0 >= len) {
                return Err(out_of_range(format!("child {child} of slot {position}")));
            }
        }

        let mut live: BitVec = BitVec::repeat(true, len);
        for &index in &free_list {
            if index.0 >= len {
                return Err(out_of_range(format!("free-list entry {index}")));
            }
            if !live[index.0] {
                return Err(TreeError::MalformedDocument(format!(
                    "free-list entry {index} appears more than once"
                )));
            }
            live.set(index.0, false);
        }

        let allocator = SlotAllocator {
            nodes,
            free_list,
            live,
        };
        allocator.check_live_links()?;
        Ok(allocator)
    }

    fn check_live_links(&self) -> Result<(), TreeError> {
        let len = self.nodes.len();
        let mut claimed: BitVec = BitVec::repeat(false, len);
        for position in self.live.iter_ones() {
            for &child in &self.nodes[position].children {
                let points_back = self.nodes[child.0].parent == Some(NodeIndex(position));
                if !self.is_live(child) || !points_back {
                    return Err(TreeError::MalformedDocument(format!(
                        "child {child} of slot {position} is freed or does not point back"
                    )));
                }
                if claimed.replace(child.0, true) {
                    return Err(TreeError::MalformedDocument(format!(
                        "child {child} is listed more than once"
                    )));
                }
            }
        }

        // follow parent links from every live slot, remembering finished chains
        let mut done: BitVec = BitVec::repeat(false, len);
        let mut on_path: BitVec = BitVec::repeat(false, len);
        let mut path = Vec::new();
        for start in self.live.iter_ones() {
            let mut current = Some(NodeIndex(start));
            while let Some(node) = current.filter(|n| self.is_live(*n) && !done[n.0]) {
                if on_path.replace(node.0, true) {
                    return Err(TreeError::MalformedDocument(format!(
                        "parent links through slot {node} form a cycle"
                    )));
                }
                path.push(node);
                current = self.nodes[node.0].parent;
            }
            for node in path.drain(..) {
                on_path.set(node.0, false);
                done.set(node.0, true);
            }
        }
        Ok(())
    }

    /// Places `payload` in the most recently freed slot, or appends a new one.
    ///
    /// Live nodes still naming a recycled slot as their parent (orphans of a
    /// detach) lose that link and become parentless.
    pub fn allocate(&mut self, payload: T, parent: Option<NodeIndex>) -> NodeIndex {
        let slot = Slot::new(payload, parent);
        match self.free_list.pop() {
            Some(index) => {
                trace!(%index, "recycling slot");
                let stale_children = std::mem::take(&mut self.nodes[index.0].children);
                for orphan in stale_children {
                    if self.is_live(orphan) && self.nodes[orphan.0].parent == Some(index) {
                        debug!(%orphan, parent = %index, "dropping link to recycled parent");
                        self.nodes[orphan.0].parent = None;
                    }
                }
                self.nodes[index.0] = slot;
                self.live.set(index.0, true);
                index
            }
            None => {
                let index = NodeIndex(self.nodes.len());
                self.nodes.push(slot);
                self.live.push(true);
                index
            }
        }
    }

    /// Pushes a live `index` onto the free list. The slot content is left stale.
    pub fn free(&mut self, index: NodeIndex) -> Result<(), TreeError> {
        if !self.is_live(index) {
            return Err(TreeError::InvalidIndex(index));
        }
        self.live.set(index.0, false);
        self.free_list.push(index);
        Ok(())
    }

    pub fn is_live(&self, index: NodeIndex) -> bool {
        self.live.get(index.0).is_some_and(|bit| *bit)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == self.free_list.len()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Number of slots ever allocated, live or free.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Lowest live position.
    pub fn first_live(&self) -> Option<NodeIndex> {
        self.live.first_one().map(NodeIndex)
    }

    pub fn slot(&self, index: NodeIndex) -> Result<&Slot<T>, TreeError> {
        if self.is_live(index) {
            Ok(&self.nodes[index.0])
        } else {
            Err(TreeError::InvalidIndex(index))
        }
    }

    pub fn slot_mut(&mut self, index: NodeIndex) -> Result<&mut Slot<T>, TreeError> {
        if self.is_live(index) {
            Ok(&mut self.nodes[index.0])
        } else {
            Err(TreeError::InvalidIndex(index))
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.live.clear();
    }

    pub fn map<F, U>(self, mut transform: F) -> SlotAllocator<U>
    where
        F: FnMut(T) -> U,
    {
        SlotAllocator {
            nodes: self
                .nodes
                .into_iter()
                .map(|slot| slot.map(&mut transform))
                .collect(),
            free_list: self.free_list,
            live: self.live,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lifo_reuse() {
        let mut slots = SlotAllocator::default();
        let a = slots.allocate('a', None);
        let b = slots.allocate('b', None);
        let _c = slots.allocate('c', None);

        slots.free(a).unwrap();
        slots.free(b).unwrap();
        assert_eq!(slots.len(), 1);

        assert_eq!(slots.allocate('d', None), b);
        assert_eq!(slots.allocate('e', None), a);
        assert_eq!(slots.allocate('f', None), NodeIndex(3));
        assert_eq!(slots.slot_count(), 4);
    }

    #[test]
    fn recycling_clears_links_of_remaining_children() {
        let mut slots = SlotAllocator::default();
        let parent = slots.allocate('p', None);
        let kept = slots.allocate('k', Some(parent));
        let gone = slots.allocate('g', Some(parent));
        slots.nodes[parent.0].children = vec![kept, gone];

        slots.free(gone).unwrap();
        slots.free(parent).unwrap();
        assert_eq!(slots.allocate('n', None), parent);
        assert_eq!(slots.slot(kept).unwrap().parent(), None);
        assert!(slots.slot(parent).unwrap().children().is_empty());
        // a freed child keeps its stale link
        assert_eq!(slots.nodes[gone.0].parent, Some(parent));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut slots = SlotAllocator::default();
        let a = slots.allocate((), None);
        slots.free(a).unwrap();
        assert_eq!(slots.free(a), Err(TreeError::InvalidIndex(a)));
        assert_eq!(
            slots.free(NodeIndex(7)),
            Err(TreeError::InvalidIndex(NodeIndex(7)))
        );
        assert_eq!(slots.free_list, vec![a]);
        assert!(slots.is_empty());
    }

    #[test]
    fn first_live_skips_freed_prefix() {
        let mut slots = SlotAllocator::default();
        let a = slots.allocate(0, None);
        let b = slots.allocate(1, None);
        let c = slots.allocate(2, None);
        slots.free(a).unwrap();
        slots.free(b).unwrap();
        assert_eq!(slots.first_live(), Some(c));
        slots.free(c).unwrap();
        assert_eq!(slots.first_live(), None);
    }

    #[test]
    fn from_parts_rejects_out_of_range_free_entry() {
        let nodes = vec![Slot::new(0, None)];
        assert!(matches!(
            SlotAllocator::from_parts(nodes, vec![NodeIndex(3)]),
            Err(TreeError::MalformedDocument(_))
        ));
    }

    #[test]
    fn from_parts_rejects_live_parent_cycle() {
        let mut nodes = vec![
            Slot::new(0, None),
            Slot::new(1, Some(NodeIndex(2))),
            Slot::new(2, Some(NodeIndex(1))),
        ];
        nodes[1].children.push(NodeIndex(2));
        nodes[2].children.push(NodeIndex(1));
        assert!(matches!(
            SlotAllocator::from_parts(nodes.clone(), vec![]),
            Err(TreeError::MalformedDocument(_))
        ));

        // freeing one end of the loop breaks it
        nodes[1].children.clear();
        nodes[2].children.clear();
        nodes[2].parent = Some(NodeIndex(0));
        nodes[0].children.push(NodeIndex(2));
        assert!(SlotAllocator::from_parts(nodes, vec![NodeIndex(1)]).is_ok());
    }

    #[test]
    fn from_parts_rejects_repeated_free_entry() {
        let nodes = vec![Slot::new(0, None), Slot::new(1, None)];
        assert!(matches!(
            SlotAllocator::from_parts(nodes, vec![NodeIndex(1), NodeIndex(1)]),
            Err(TreeError::MalformedDocument(_))
        ));
    }
}
