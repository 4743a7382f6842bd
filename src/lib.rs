//! # slot-tree
//!
//! A single-rooted tree whose nodes live in a flat slot array. Node indices
//! stay stable across removals because freed slots go on a LIFO free list and
//! are only handed out again by later insertions.
//!
//! The whole structure, free list included, converts losslessly to a nested
//! key/value [`document::Document`] and back, so a saved tree keeps the exact
//! same indices when it is loaded again.
//!
//! *   [`tree`]: the [`tree::SlotTree`] container, traversal and debug drawing.
//! *   [`document`]: the ordered key/value exchange format.
//! *   [`codec`]: tree to document conversion, with payloads stored inline or
//!     as positions in a caller-owned collection.

pub mod codec;
pub mod document;
pub mod tree;

pub use tree::{NodeIndex, Removal, SlotTree, TreeError};
