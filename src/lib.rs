//! AVL search trees over a common, storage-independent core.
//!
//! - [`AvlSet`] owns its nodes in a growable arena.
//! - [`AVLTree`] / [`AVLTreeMut`] lay the same tree over a caller-provided
//!   byte buffer (zero-copy), with a fixed capacity.

pub mod collections;
pub mod error;

pub use collections::{AVLTree, AVLTreeMut, AvlSet};
pub use error::CollectionError;
