use bytemuck::{Pod, Zeroable};
use solana_program::msg;
use std::mem::{align_of, size_of};

use super::node::{self, InOrder, NodeArena, NodeView, Placement, SENTINEL};
use crate::error::CollectionError;

// Enum representing the fields of a node.
#[derive(Copy, Clone)]
enum Register {
    Left,
    Right,
    Height,
}

// Enum representing the fields of the allocator.
enum Field {
    Root,
    Size,
    Capacity,
    FreeListHead,
    Sequence,
}

/// Checks that the node array can hold the capacity recorded in the header.
fn check_layout<K: Ord + Pod>(
    allocator: &Allocator,
    nodes: &[Node<K>],
    available: usize,
) -> Result<(), CollectionError> {
    let capacity = allocator.get_field(Field::Capacity) as usize;

    if capacity > nodes.len() {
        return Err(CollectionError::BufferTooSmall {
            required: AVLTree::<K>::data_len(capacity),
            available,
        });
    }

    Ok(())
}

/// Rejects key types that would leave padding bytes in a [`Node`].
fn check_key<K: Ord + Pod>() -> Result<(), CollectionError> {
    if !Node::<K>::PACKED {
        return Err(CollectionError::UnsupportedKey {
            size: size_of::<K>(),
            align: align_of::<K>(),
        });
    }

    Ok(())
}

fn header_len(available: usize) -> Result<usize, CollectionError> {
    let required = size_of::<Allocator>();

    if available < required {
        return Err(CollectionError::BufferTooSmall {
            required,
            available,
        });
    }

    Ok(required)
}

/// AVL tree set laid over a byte buffer. Keys are stored as such the height
/// of two sibling subtrees differ by one at most.
///
/// This type can be used to reference a read-only tree.
#[derive(Clone, Copy)]
pub struct AVLTree<'a, K: Ord + Pod> {
    /// Node allocator.
    allocator: &'a Allocator,

    /// Array of nodes to store the tree.
    nodes: &'a [Node<K>],
}

impl<'a, K: Ord + Pod> AVLTree<'a, K> {
    /// Returns the required data length (in bytes) to store a tree with the specified capacity.
    pub const fn data_len(capacity: usize) -> usize {
        size_of::<Allocator>() + (capacity * size_of::<Node<K>>())
    }

    /// Loads a tree from a byte array.
    ///
    /// The buffer must be aligned for `K` and sized as returned by
    /// [`AVLTree::data_len`]. The key size must be a multiple of 4 bytes and
    /// its alignment at most 16. The structure itself is not checked; use
    /// [`AVLTree::validate`] on buffers of unknown origin.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, CollectionError> {
        check_key::<K>()?;

        let available = bytes.len();
        let (allocator, nodes) = bytes.split_at(header_len(available)?);

        let allocator =
            bytemuck::try_from_bytes::<Allocator>(allocator).map_err(CollectionError::Layout)?;
        let nodes: &[Node<K>] =
            bytemuck::try_cast_slice(nodes).map_err(CollectionError::Layout)?;

        check_layout(allocator, nodes, available)?;

        Ok(Self { allocator, nodes })
    }

    /// Returns the capacity of the tree.
    pub fn capacity(&self) -> usize {
        self.allocator.get_field(Field::Capacity) as usize
    }

    /// Returns the number of keys in the tree.
    pub fn len(&self) -> usize {
        self.allocator.get_field(Field::Size) as usize
    }

    /// Indicates whether the tree is full or not.
    pub fn is_full(&self) -> bool {
        self.allocator.get_field(Field::Size) >= self.allocator.get_field(Field::Capacity)
    }

    /// Indicates whether the tree is empty or not.
    pub fn is_empty(&self) -> bool {
        self.allocator.get_field(Field::Size) == 0
    }

    /// Height of the tree: `0` when empty, `1` for a single key.
    pub fn height(&self) -> u32 {
        node::height(self, self.root())
    }

    /// Checks whether a key is present in the tree or not.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to look up.
    pub fn contains(&self, key: &K) -> bool {
        node::find(self, self.root(), key).is_some()
    }

    /// Find the lowest key.
    pub fn lowest(&self) -> Option<K> {
        node::lowest(self, self.root()).map(|index| node!(self.nodes, index).key)
    }

    /// Find the highest key.
    pub fn highest(&self) -> Option<K> {
        node::highest(self, self.root()).map(|index| node!(self.nodes, index).key)
    }

    /// An iterator visiting all keys in ascending order.
    pub fn iter(&self) -> Iter<'a, K> {
        Iter {
            tree: *self,
            inner: InOrder::new(*self, self.root()),
        }
    }

    /// Keys in ascending (in-order) order.
    pub fn in_order(&self) -> Vec<K> {
        self.iter().collect()
    }

    /// Keys in breadth-first (level) order.
    pub fn level_order(&self) -> Vec<K> {
        node::level_order(self, self.root())
            .into_iter()
            .map(|index| node!(self.nodes, index).key)
            .collect()
    }

    /// Verifies links, ordering, balance, cached heights and the key count.
    pub fn validate(&self) -> Result<(), CollectionError> {
        node::validate(self, self.root(), self.len())
    }

    #[inline]
    fn root(&self) -> u32 {
        self.allocator.get_field(Field::Root)
    }
}

impl<K: Ord + Pod> NodeView<K> for AVLTree<'_, K> {
    #[inline]
    fn slots(&self) -> u32 {
        self.allocator.get_field(Field::Capacity)
    }

    #[inline]
    fn key(&self, index: u32) -> &K {
        &node!(self.nodes, index).key
    }

    #[inline]
    fn left(&self, index: u32) -> u32 {
        node!(self.nodes, index).get_register(Register::Left)
    }

    #[inline]
    fn right(&self, index: u32) -> u32 {
        node!(self.nodes, index).get_register(Register::Right)
    }

    #[inline]
    fn height(&self, index: u32) -> u32 {
        node!(self.nodes, index).get_register(Register::Height)
    }
}

/// Ascending iterator over the keys of an [`AVLTree`].
pub struct Iter<'a, K: Ord + Pod> {
    tree: AVLTree<'a, K>,
    inner: InOrder<K, AVLTree<'a, K>>,
}

impl<K: Ord + Pod> Iterator for Iter<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|index| node!(self.tree.nodes, index).key)
    }
}

/// AVL tree set laid over a byte buffer. Keys are stored as such the height
/// of two sibling subtrees differ by one at most.
///
/// This type can be used to reference a writable tree.
pub struct AVLTreeMut<'a, K: Ord + Pod> {
    /// Node allocator.
    allocator: &'a mut Allocator,

    /// Array of nodes to store the tree.
    nodes: &'a mut [Node<K>],
}

impl<'a, K: Ord + Pod> AVLTreeMut<'a, K> {
    /// Returns the required data length (in bytes) to store a tree with the specified capacity.
    pub const fn data_len(capacity: usize) -> usize {
        AVLTree::<K>::data_len(capacity)
    }

    /// Loads a tree from a byte array.
    ///
    /// A zeroed buffer loads as a tree of capacity `0`; call
    /// [`AVLTreeMut::initialize`] once to set its capacity.
    pub fn from_bytes_mut(bytes: &'a mut [u8]) -> Result<Self, CollectionError> {
        check_key::<K>()?;

        let available = bytes.len();
        let (allocator, nodes) = bytes.split_at_mut(header_len(available)?);

        let allocator = bytemuck::try_from_bytes_mut::<Allocator>(allocator)
            .map_err(CollectionError::Layout)?;
        let nodes: &mut [Node<K>] =
            bytemuck::try_cast_slice_mut(nodes).map_err(CollectionError::Layout)?;

        check_layout(allocator, nodes, available)?;

        Ok(Self { allocator, nodes })
    }

    /// Initializes the tree with the specified capacity.
    ///
    /// This function should be called once when the tree is created. It
    /// fails if the buffer cannot hold `capacity` nodes.
    ///
    /// The header can only be written through this method:
    ///
    /// ```compile_fail
    /// use avl_pod::collections::avl_tree::Allocator;
    /// ```
    pub fn initialize(&mut self, capacity: u32) -> Result<(), CollectionError> {
        if capacity as usize > self.nodes.len() {
            msg!(
                "buffer holds {} nodes, cannot initialize capacity {}",
                self.nodes.len(),
                capacity
            );

            return Err(CollectionError::BufferTooSmall {
                required: Self::data_len(capacity as usize),
                available: Self::data_len(self.nodes.len()),
            });
        }

        self.allocator.initialize(capacity);

        Ok(())
    }

    /// Read-only view of the tree.
    pub fn as_tree(&self) -> AVLTree<'_, K> {
        AVLTree {
            allocator: &*self.allocator,
            nodes: &*self.nodes,
        }
    }

    /// Returns the capacity of the tree.
    pub fn capacity(&self) -> usize {
        self.as_tree().capacity()
    }

    /// Returns the number of keys in the tree.
    pub fn len(&self) -> usize {
        self.as_tree().len()
    }

    /// Indicates whether the tree is full or not.
    pub fn is_full(&self) -> bool {
        self.as_tree().is_full()
    }

    /// Indicates whether the tree is empty or not.
    pub fn is_empty(&self) -> bool {
        self.as_tree().is_empty()
    }

    /// Height of the tree: `0` when empty, `1` for a single key.
    pub fn height(&self) -> u32 {
        self.as_tree().height()
    }

    /// Checks whether a key is present in the tree or not.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to look up.
    pub fn contains(&self, key: &K) -> bool {
        self.as_tree().contains(key)
    }

    /// Find the lowest key.
    pub fn lowest(&self) -> Option<K> {
        self.as_tree().lowest()
    }

    /// Find the highest key.
    pub fn highest(&self) -> Option<K> {
        self.as_tree().highest()
    }

    /// An iterator visiting all keys in ascending order.
    pub fn iter(&self) -> Iter<'_, K> {
        self.as_tree().iter()
    }

    /// Keys in ascending (in-order) order.
    pub fn in_order(&self) -> Vec<K> {
        self.as_tree().in_order()
    }

    /// Keys in breadth-first (level) order.
    pub fn level_order(&self) -> Vec<K> {
        self.as_tree().level_order()
    }

    /// Verifies links, ordering, balance, cached heights and the key count.
    pub fn validate(&self) -> Result<(), CollectionError> {
        self.as_tree().validate()
    }

    /// Insert a key on the tree.
    ///
    /// The key is inserted in the tree maintaining the natural order and the
    /// tree is rebalanced on the way back to the root. Returns `Ok(false)` if
    /// the key was already present; a key that is absent can only be added
    /// while the tree is not full.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to insert.
    pub fn insert(&mut self, key: K) -> Result<bool, CollectionError> {
        let root = self.allocator.get_field(Field::Root);
        let (root, placement) = node::insert(self, root, key);

        match placement {
            Placement::Added => {
                self.allocator.set_field(Field::Root, root);
                Ok(true)
            }
            Placement::Present => Ok(false),
            Placement::Rejected => {
                msg!("tree is full ({} nodes)", self.len());

                Err(CollectionError::Full {
                    capacity: self.capacity(),
                })
            }
        }
    }

    /// Removes a key from the tree, returning whether it was present.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to remove.
    pub fn remove(&mut self, key: &K) -> bool {
        let root = self.allocator.get_field(Field::Root);
        let (root, removed) = node::remove(self, root, key);

        match removed {
            Some(index) => {
                self.allocator.set_field(Field::Root, root);
                self.remove_node(index);
                true
            }
            None => false,
        }
    }

    /// Returns a detached node to the free list.
    fn remove_node(&mut self, index: u32) {
        let free_list_head = self.allocator.get_field(Field::FreeListHead);
        let node = &mut node!(self.nodes, index);

        // clears the node values
        *node = Node::zeroed();
        // we use the height field to create a linked list
        // of free nodes
        node.set_register(Register::Height, free_list_head);

        self.allocator.set_field(Field::FreeListHead, index);
        self.allocator
            .set_field(Field::Size, self.allocator.get_field(Field::Size) - 1);
    }
}

impl<K: Ord + Pod> NodeView<K> for AVLTreeMut<'_, K> {
    #[inline]
    fn slots(&self) -> u32 {
        self.allocator.get_field(Field::Capacity)
    }

    #[inline]
    fn key(&self, index: u32) -> &K {
        &node!(self.nodes, index).key
    }

    #[inline]
    fn left(&self, index: u32) -> u32 {
        node!(self.nodes, index).get_register(Register::Left)
    }

    #[inline]
    fn right(&self, index: u32) -> u32 {
        node!(self.nodes, index).get_register(Register::Right)
    }

    #[inline]
    fn height(&self, index: u32) -> u32 {
        node!(self.nodes, index).get_register(Register::Height)
    }
}

impl<K: Ord + Pod> NodeArena<K> for AVLTreeMut<'_, K> {
    #[inline]
    fn set_left(&mut self, index: u32, child: u32) {
        node!(self.nodes, index).set_register(Register::Left, child);
    }

    #[inline]
    fn set_right(&mut self, index: u32, child: u32) {
        node!(self.nodes, index).set_register(Register::Right, child);
    }

    #[inline]
    fn set_height(&mut self, index: u32, height: u32) {
        node!(self.nodes, index).set_register(Register::Height, height);
    }

    fn swap_keys(&mut self, a: u32, b: u32) {
        let key = node!(self.nodes, a).key;
        node!(self.nodes, a).key = node!(self.nodes, b).key;
        node!(self.nodes, b).key = key;
    }

    /// Takes a node from the free list, or the next never-used slot.
    fn allocate(&mut self, key: K) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let free_node = self.allocator.get_field(Field::FreeListHead);
        let sequence = self.allocator.get_field(Field::Sequence);

        if free_node == sequence {
            self.allocator.set_field(Field::Sequence, sequence + 1);
            self.allocator.set_field(Field::FreeListHead, sequence + 1);
        } else {
            self.allocator.set_field(
                Field::FreeListHead,
                node!(self.nodes, free_node).get_register(Register::Height),
            );
        }

        node!(self.nodes, free_node).initialize(key);

        self.allocator
            .set_field(Field::Size, self.allocator.get_field(Field::Size) + 1);

        Some(free_node)
    }
}

/// The allocator is responsible to keep track of the status of the tree.
///
/// It uses two special fields to determine if the tree is full and to reuse
/// deleted nodes. Until a node is removed, the `sequence` has the same value
/// as the `free_list_head` field and marks the next never-used slot. Once
/// nodes are removed, `free_list_head` points to the most recently released
/// node, whose height register links to the next free one.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct Allocator {
    /// Allocator fields:
    ///   [0] - root
    ///   [1] - size
    ///   [2] - capacity
    ///   [3] - free_list_head
    ///   [4] - sequence
    ///   [5] - not in use (padding)
    fields: [u32; 6],
}

impl Allocator {
    fn initialize(&mut self, capacity: u32) {
        self.fields = [SENTINEL, 0, capacity, 1, 1, 0];
    }

    #[inline(always)]
    fn get_field(&self, field: Field) -> u32 {
        self.fields[field as usize]
    }

    #[inline(always)]
    fn set_field(&mut self, field: Field, value: u32) {
        self.fields[field as usize] = value;
    }
}

/// Node of a zero-copy tree.
///
/// Keys are stored right after the registers. Only key types that leave no
/// padding on either side are accepted (see [`Node::PACKED`]), since the
/// nodes are written straight into the caller's bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct Node<K: Ord + Pod> {
    /// Registers for a node. This is fixed to include:
    ///   [0] - left child
    ///   [1] - right child
    ///   [2] - height
    ///   [3] - not in use (padding)
    registers: [u32; 4],
    /// Key stored in the node.
    key: K,
}

impl<K: Ord + Pod> Node<K> {
    /// Whether the key packs against the registers with no padding bytes.
    const PACKED: bool = size_of::<Node<K>>() == size_of::<[u32; 4]>() + size_of::<K>();

    fn initialize(&mut self, key: K) {
        self.registers = [SENTINEL, SENTINEL, 1, 0];
        self.key = key;
    }

    #[inline(always)]
    fn get_register(&self, register: Register) -> u32 {
        self.registers[register as usize]
    }

    #[inline(always)]
    fn set_register(&mut self, register: Register, value: u32) {
        self.registers[register as usize] = value;
    }
}

unsafe impl<K: Ord + Pod> Zeroable for Node<K> {}

unsafe impl<K: Ord + Pod> Pod for Node<K> {}
