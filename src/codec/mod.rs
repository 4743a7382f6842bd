//! Lossless conversion between a [`SlotTree`] and a [`Document`].
//!
//! The document has two top-level tables:
//!
//! ```text
//! {
//!   tree: {
//!     "n0": { node: <payload>, parent_ind: -1, child_inds: { "n0": 1, "n1": 2 } },
//!     "n1": { node: <payload>, parent_ind: 0,  child_inds: {} },
//!     ...
//!   },
//!   free_list: { "n0": 3, "n1": 4 },
//! }
//! ```
//!
//! The record keys depend on the payload codec (see [`payload::RecordFields`]).
//! Every slot is written at its storage position, freed slots included, and
//! the free list keeps its reuse order. Decoding rebuilds the slots in
//! document order, so indices inside the document stay valid as they are.

use std::convert::Infallible;

use tracing::debug;

use crate::document::Document;
use crate::tree::slots::{Slot, SlotAllocator};
use crate::tree::{NodeIndex, SlotTree, TreeError};

use payload::{DocumentValue, Inline, PayloadCodec, RecordFields, INLINE_FIELDS};

pub mod payload;

pub const TREE: &str = "tree";
pub const FREE_LIST: &str = "free_list";

/// Parent value of the root.
pub const NO_PARENT: f64 = -1.0;

/// Key of the `position`-th entry of a table: `n0`, `n1`, ...
pub fn slot_label(position: usize) -> String {
    format!("n{position}")
}

fn index_table(indices: &[NodeIndex]) -> Document {
    indices
        .iter()
        .enumerate()
        .map(|(j, i)| (slot_label(j), i.0 as f64))
        .collect()
}

fn malformed(what: impl Into<String>) -> TreeError {
    TreeError::MalformedDocument(what.into())
}

fn table_field<'a>(
    document: &'a Document,
    key: &str,
    path: &str,
) -> Result<&'a Document, TreeError> {
    document
        .get(key)
        .filter(|d| d.is_table())
        .ok_or_else(|| malformed(format!("{path}{key} is missing or not a table")))
}

fn index_field(document: &Document, path: &str) -> Result<NodeIndex, TreeError> {
    document
        .as_index()
        .map(NodeIndex)
        .ok_or_else(|| malformed(format!("{path} is not a slot index")))
}

impl<T> SlotTree<T> {
    /// Writes every slot and the free list, using `codec` for payloads.
    pub fn encode<C: PayloadCodec<T>>(&self, codec: &C) -> Result<Document, TreeError> {
        self.encode_with(codec.fields(), |index, payload| codec.encode(index, payload))
    }

    fn encode_with<E, F>(&self, fields: RecordFields, mut payload: F) -> Result<Document, E>
    where
        F: FnMut(NodeIndex, &T) -> Result<Document, E>,
    {
        let mut tree = Document::table();
        for (position, slot) in self.slots.nodes.iter().enumerate() {
            let mut record = Document::table();
            record
                .set(fields.payload, payload(NodeIndex(position), &slot.payload)?)
                .set(fields.parent, slot.parent.map_or(NO_PARENT, |p| p.0 as f64))
                .set(fields.children, index_table(&slot.children));
            tree.set(slot_label(position), record);
        }

        let mut document = Document::table();
        document
            .set(TREE, tree)
            .set(FREE_LIST, index_table(&self.slots.free_list));
        Ok(document)
    }

    /// Rebuilds a tree from `document`.
    ///
    /// Fails with [`TreeError::MalformedDocument`] on a missing table or
    /// field, a field of the wrong kind, or an index outside the stored slots
    /// (free-list entries included), on live children that do not point back
    /// at their parent, on parent links of live nodes that form a cycle, and
    /// with
    /// [`TreeError::UnresolvedReference`] when an external payload position is
    /// not in the owner collection.
    pub fn decode<C>(document: &Document, codec: &C) -> Result<Self, TreeError>
    where
        C: PayloadCodec<T>,
    {
        if !document.is_table() {
            return Err(malformed("document is not a table"));
        }
        let fields = codec.fields();
        let tree = table_field(document, TREE, "")?;
        let free_list = table_field(document, FREE_LIST, "")?;

        let mut nodes = Vec::with_capacity(tree.len());
        for (position, (label, record)) in tree.entries().enumerate() {
            let path = format!("{TREE}.{label}.");
            let index = NodeIndex(position);

            let parent = record
                .get(fields.parent)
                .filter(|d| d.is_number())
                .ok_or_else(|| {
                    malformed(format!("{path}{} is missing or not a number", fields.parent))
                })?;
            let parent = if parent.as_number() == Some(NO_PARENT) {
                None
            } else {
                Some(index_field(parent, &format!("{path}{}", fields.parent))?)
            };

            let children = table_field(record, fields.children, &path)?
                .entries()
                .map(|(k, c)| index_field(c, &format!("{path}{}.{k}", fields.children)))
                .collect::<Result<Vec<_>, _>>()?;

            let payload = record
                .get(fields.payload)
                .ok_or_else(|| malformed(format!("{path}{} is missing", fields.payload)))?;
            let payload = codec.decode(index, payload)?;

            nodes.push(Slot {
                payload,
                parent,
                children,
            });
        }

        let free_list = free_list
            .entries()
            .map(|(k, i)| index_field(i, &format!("{FREE_LIST}.{k}")))
            .collect::<Result<Vec<_>, _>>()?;

        let slots = SlotAllocator::from_parts(nodes, free_list)?;
        debug!(
            slots = slots.slot_count(),
            free = slots.free_list.len(),
            "decoded tree"
        );
        Ok(SlotTree { slots })
    }

    /// Replaces `self` with the tree decoded from `document`.
    ///
    /// On failure `self` is left untouched.
    pub fn decode_into<C: PayloadCodec<T>>(
        &mut self,
        document: &Document,
        codec: &C,
    ) -> Result<(), TreeError> {
        *self = Self::decode(document, codec)?;
        Ok(())
    }
}

impl<T: DocumentValue> SlotTree<T> {
    /// [`SlotTree::encode`] with payloads written inline.
    pub fn to_document(&self) -> Document {
        let encoded = self.encode_with(INLINE_FIELDS, |_, payload| {
            Ok::<_, Infallible>(payload.to_document())
        });
        match encoded {
            Ok(document) => document,
            Err(never) => match never {},
        }
    }

    /// [`SlotTree::decode`] with payloads read inline.
    pub fn from_document(document: &Document) -> Result<Self, TreeError> {
        Self::decode(document, &Inline)
    }
}
