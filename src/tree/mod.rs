//! An index-addressed tree whose slots are recycled through a free list.
//!
//! Every node lives in a slot of a flat array and is identified by the
//! [`NodeIndex`] returned when it was inserted. Parent and child links are
//! stored as indices, so removing and re-inserting nodes never invalidates the
//! indices of the nodes that stay, and the whole slot array (including freed
//! slots) can be written to a [`Document`](crate::document::Document) and read
//! back without any remapping.
//!
//! The pieces are:
//! *   [`slots::SlotAllocator`]: the slot array and its LIFO free list.
//! *   [`topology`]: insertion (including rebasing onto a new root), removal and
//!     root lookup, keeping a single root.
//! *   [`iterato`]: pre-order and ancestor iterators, plus `walk` style visitors.
//! *   [`draw`]: a box-drawing dump used for debugging.
//!
//! ```
//! use slot_tree::tree::{Removal, SlotTree};
//!
//! let mut tree = SlotTree::new();
//! let root = tree.add_node("root", None).unwrap();
//! let a = tree.add_node("a", Some(root)).unwrap();
//! tree.add_node("b", Some(root)).unwrap();
//!
//! tree.remove_node(a, Removal::Recursive).unwrap();
//! // the freed slot is handed out again
//! assert_eq!(tree.add_node("c", Some(root)).unwrap(), a);
//! ```

use std::fmt::{self, Display};
use std::ops::{Index, IndexMut};

use thiserror::Error;

use slots::SlotAllocator;

pub mod draw;
pub mod iterato;
pub mod slots;
pub mod topology;


/// A type-safe identifier for a slot within a [`SlotTree`].
/// Wraps a `usize` position in the underlying slot array.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeIndex(pub usize);

impl From<usize> for NodeIndex {
    fn from(i: usize) -> Self {
        NodeIndex(i)
    }
}

impl From<NodeIndex> for usize {
    fn from(n: NodeIndex) -> Self {
        n.0
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How [`SlotTree::remove_node`] treats the descendants of the removed node.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash)]
pub enum Removal {
    /// Free the whole subtree.
    Recursive,
    /// Free only the node. Its children stay live and keep pointing at the
    /// freed slot as their parent until the caller reparents or removes them.
    Detach,
}

/// Errors that can occur during tree operations and document decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Invalid NodeIndex: {0} is out of range or not live")]
    InvalidIndex(NodeIndex),
    #[error("Node {node} has no child at position {position}")]
    InvalidChild { node: NodeIndex, position: usize },
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Unresolved reference: position {0} does not exist in the owner collection")]
    UnresolvedReference(usize),
    #[error("Payload of node {0} is not held by the owner collection")]
    UnresolvedPayload(NodeIndex),
    #[error("Node {child} is not among the children of its parent {parent}")]
    StructuralInconsistency { parent: NodeIndex, child: NodeIndex },
    #[error("Moving {0} under one of its descendants would create a cycle")]
    Cycle(NodeIndex),
    #[error("Broken invariant: {0}")]
    BrokenInvariant(String),
}

/// A single-rooted tree stored in recyclable slots.
///
/// `T` is the payload type. For payloads owned elsewhere, store a handle such
/// as a [`by_address::ByAddress`] pointer and encode it with
/// [`External`](crate::codec::payload::External).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotTree<T> {
    pub(crate) slots: SlotAllocator<T>,
}

impl<T> Default for SlotTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotTree<T> {
    pub fn new() -> Self {
        SlotTree {
            slots: SlotAllocator::default(),
        }
    }

    /// Drops every slot, live or free. Indices handed out before are no longer valid.
    pub fn reset(&mut self) {
        tracing::debug!(slots = self.slots.slot_count(), "resetting tree");
        self.slots.reset();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots ever allocated since the last reset.
    pub fn slot_count(&self) -> usize {
        self.slots.slot_count()
    }

    /// Freed slots, in the order they were freed. The last entry is reused first.
    pub fn free_list(&self) -> &[NodeIndex] {
        &self.slots.free_list
    }

    pub fn is_live(&self, index: NodeIndex) -> bool {
        self.slots.is_live(index)
    }

    pub fn get(&self, index: NodeIndex) -> Result<&T, TreeError> {
        Ok(&self.slots.slot(index)?.payload)
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Result<&mut T, TreeError> {
        Ok(&mut self.slots.slot_mut(index)?.payload)
    }

    /// Parent of a live node. `None` for the root.
    ///
    /// After a [`Removal::Detach`] this may name a freed slot.
    pub fn parent_of(&self, index: NodeIndex) -> Result<Option<NodeIndex>, TreeError> {
        Ok(self.slots.slot(index)?.parent)
    }

    /// Children of a live node, in insertion order.
    pub fn children(&self, index: NodeIndex) -> Result<&[NodeIndex], TreeError> {
        Ok(&self.slots.slot(index)?.children)
    }

    pub fn n_children(&self, index: NodeIndex) -> Result<usize, TreeError> {
        Ok(self.slots.slot(index)?.children.len())
    }

    /// The `position`-th child of `index`.
    pub fn child_of(&self, index: NodeIndex, position: usize) -> Result<NodeIndex, TreeError> {
        self.slots
            .slot(index)?
            .children
            .get(position)
            .copied()
            .ok_or(TreeError::InvalidChild {
                node: index,
                position,
            })
    }

    /// Live nodes in slot order.
    pub fn iter_live(&self) -> impl Iterator<Item = (NodeIndex, &T)> {
        self.slots.live.iter_ones().map(|i| (NodeIndex(i), &self.slots.nodes[i].payload))
    }

    /// Converts every payload, freed slots included, keeping slot numbering.
    pub fn map<F, U>(self, transform: F) -> SlotTree<U>
    where
        F: FnMut(T) -> U,
    {
        SlotTree {
            slots: self.slots.map(transform),
        }
    }
}

/// Unchecked payload access. Panics when `index` is out of range; a freed
/// slot yields its stale payload.
impl<T> Index<NodeIndex> for SlotTree<T> {
    type Output = T;
    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.slots.nodes[index.0].payload
    }
}

impl<T> IndexMut<NodeIndex> for SlotTree<T> {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Self::Output {
        &mut self.slots.nodes[index.0].payload
    }
}
