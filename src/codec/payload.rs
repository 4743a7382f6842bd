//! Payload storage policies for the codec.
//!
//! A [`SlotTree`](crate::tree::SlotTree) stores its payload by value. Whether
//! that value is the data itself or a handle into a collection owned by the
//! caller only matters when encoding, and is decided by the [`PayloadCodec`]:
//!
//! *   [`Inline`]: the payload is written into the document through
//!     [`DocumentValue`].
//! *   [`External`]: the payload is an item of an [`OwnerCollection`] and is
//!     written as its position in that collection, found by identity.

use std::ops::Deref;

use by_address::ByAddress;
use duplicate::duplicate;

use super::slot_label;
use crate::document::Document;
use crate::tree::{NodeIndex, TreeError};

/// Keys of the entries of a node record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordFields {
    pub payload: &'static str,
    pub parent: &'static str,
    pub children: &'static str,
}

/// Record keys used for inline payloads.
pub const INLINE_FIELDS: RecordFields = RecordFields {
    payload: "node",
    parent: "parent_ind",
    children: "child_inds",
};

/// Record keys used for payloads held by an [`OwnerCollection`].
pub const EXTERNAL_FIELDS: RecordFields = RecordFields {
    payload: "node_orig_ind",
    parent: "parent_gt_ind",
    children: "child_gt_inds",
};

/// Converts a payload to and from the document field that holds it.
pub trait PayloadCodec<T> {
    /// Keys of each node record; the payload goes under `payload`.
    fn fields(&self) -> RecordFields;

    fn encode(&self, index: NodeIndex, payload: &T) -> Result<Document, TreeError>;

    fn decode(&self, index: NodeIndex, document: &Document) -> Result<T, TreeError>;
}

/// Values that can be written into a [`Document`] directly.
pub trait DocumentValue: Sized {
    fn to_document(&self) -> Document;

    /// `None` when the document holds a value of the wrong kind or range.
    fn from_document(document: &Document) -> Option<Self>;
}

/// Largest magnitude below which every integer is exact as an `f64`.
const MAX_EXACT_INTEGER: i128 = 1 << 53;

// Integers too wide for an f64 are written as decimal strings.
duplicate! {
    [int_types; [i8]; [i16]; [i32]; [i64]; [isize]; [u8]; [u16]; [u32]; [u64]; [usize];]

    impl DocumentValue for int_types {
        fn to_document(&self) -> Document {
            let wide = *self as i128;
            if wide.abs() <= MAX_EXACT_INTEGER {
                Document::Number(wide as f64)
            } else {
                Document::String(self.to_string())
            }
        }

        fn from_document(document: &Document) -> Option<Self> {
            match document {
                Document::Number(n) if n.fract() == 0.0 => int_types::try_from(*n as i128).ok(),
                Document::String(s) => s.parse().ok(),
                _ => None,
            }
        }
    }
}

duplicate! {
    [float_types; [f32]; [f64];]

    impl DocumentValue for float_types {
        fn to_document(&self) -> Document {
            Document::Number(*self as f64)
        }

        fn from_document(document: &Document) -> Option<Self> {
            document.as_number().map(|n| n as float_types)
        }
    }
}

impl DocumentValue for bool {
    fn to_document(&self) -> Document {
        Document::Bool(*self)
    }

    fn from_document(document: &Document) -> Option<Self> {
        document.as_bool()
    }
}

impl DocumentValue for String {
    fn to_document(&self) -> Document {
        Document::String(self.clone())
    }

    fn from_document(document: &Document) -> Option<Self> {
        document.as_str().map(str::to_owned)
    }
}

impl DocumentValue for Document {
    fn to_document(&self) -> Document {
        self.clone()
    }

    fn from_document(document: &Document) -> Option<Self> {
        Some(document.clone())
    }
}

/// Sequences are stored as `{"n0": .., "n1": .., ...}` tables.
impl<V: DocumentValue> DocumentValue for Vec<V> {
    fn to_document(&self) -> Document {
        self.iter()
            .enumerate()
            .map(|(i, v)| (slot_label(i), v.to_document()))
            .collect()
    }

    fn from_document(document: &Document) -> Option<Self> {
        document
            .as_table()?
            .values()
            .map(V::from_document)
            .collect()
    }
}

/// Writes payloads into the node record under `node`, with links under
/// `parent_ind` and `child_inds`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl<T: DocumentValue> PayloadCodec<T> for Inline {
    fn fields(&self) -> RecordFields {
        INLINE_FIELDS
    }

    fn encode(&self, _index: NodeIndex, payload: &T) -> Result<Document, TreeError> {
        Ok(payload.to_document())
    }

    fn decode(&self, index: NodeIndex, document: &Document) -> Result<T, TreeError> {
        T::from_document(document).ok_or_else(|| {
            TreeError::MalformedDocument(format!(
                "payload of {} has the wrong kind",
                slot_label(index.0)
            ))
        })
    }
}

/// A caller-owned store of payload objects, addressed by position.
pub trait OwnerCollection {
    type Item;

    fn size(&self) -> usize;

    fn get(&self, position: usize) -> Option<&Self::Item>;

    fn append(&mut self, item: Self::Item) -> usize;

    /// Position of the very object `item`, compared by identity.
    fn position_of(&self, item: &Self::Item) -> Option<usize>;
}

/// Pointers wrapped in [`ByAddress`] compare by the address they point to, so
/// two equal-looking objects stay distinct.
impl<P: Deref> OwnerCollection for Vec<ByAddress<P>> {
    type Item = ByAddress<P>;

    fn size(&self) -> usize {
        self.len()
    }

    fn get(&self, position: usize) -> Option<&Self::Item> {
        self.as_slice().get(position)
    }

    fn append(&mut self, item: Self::Item) -> usize {
        self.push(item);
        self.len() - 1
    }

    fn position_of(&self, item: &Self::Item) -> Option<usize> {
        self.iter().position(|candidate| candidate == item)
    }
}

/// Writes payloads as their position in an [`OwnerCollection`], under
/// `node_orig_ind`, with links under `parent_gt_ind` and `child_gt_inds`.
/// Decoding clones the item found at that position.
#[derive(Debug, Clone, Copy)]
pub struct External<'a, C>(pub &'a C);

impl<C> PayloadCodec<C::Item> for External<'_, C>
where
    C: OwnerCollection,
    C::Item: Clone,
{
    fn fields(&self) -> RecordFields {
        EXTERNAL_FIELDS
    }

    fn encode(&self, index: NodeIndex, payload: &C::Item) -> Result<Document, TreeError> {
        let position = self
            .0
            .position_of(payload)
            .ok_or(TreeError::UnresolvedPayload(index))?;
        Ok(Document::Number(position as f64))
    }

    fn decode(&self, index: NodeIndex, document: &Document) -> Result<C::Item, TreeError> {
        let position = document.as_index().ok_or_else(|| {
            TreeError::MalformedDocument(format!(
                "external reference of {} is not a position",
                slot_label(index.0)
            ))
        })?;
        self.0
            .get(position)
            .cloned()
            .ok_or(TreeError::UnresolvedReference(position))
    }
}
