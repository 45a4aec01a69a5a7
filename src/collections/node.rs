//! Storage-independent AVL algorithm.
//!
//! Both the owned [`AvlSet`](super::AvlSet) and the zero-copy
//! [`AVLTreeMut`](super::AVLTreeMut) keep their nodes in an array addressed by
//! `u32` indices, where [`SENTINEL`] is the null link. The functions here only
//! see that array through [`NodeView`] / [`NodeArena`], so insertion, deletion,
//! rebalancing and traversal are written once.
//!
//! Heights follow the usual convention: an absent subtree has height 0 and a
//! leaf has height 1.

use std::cmp::{max, Ordering};
use std::collections::VecDeque;
use std::marker::PhantomData;

use crate::error::CollectionError;

/// Constant to represent an empty link.
pub(crate) const SENTINEL: u32 = 0;

/// Read access to the nodes of a tree.
pub(crate) trait NodeView<K: Ord> {
    /// Number of addressable slots; valid indices are `1..=slots()`.
    fn slots(&self) -> u32;

    fn key(&self, index: u32) -> &K;

    fn left(&self, index: u32) -> u32;

    fn right(&self, index: u32) -> u32;

    /// Cached height of the subtree rooted at `index`.
    fn height(&self, index: u32) -> u32;
}

impl<K: Ord, T: NodeView<K> + ?Sized> NodeView<K> for &T {
    #[inline]
    fn slots(&self) -> u32 {
        (**self).slots()
    }

    #[inline]
    fn key(&self, index: u32) -> &K {
        (**self).key(index)
    }

    #[inline]
    fn left(&self, index: u32) -> u32 {
        (**self).left(index)
    }

    #[inline]
    fn right(&self, index: u32) -> u32 {
        (**self).right(index)
    }

    #[inline]
    fn height(&self, index: u32) -> u32 {
        (**self).height(index)
    }
}

/// Write access to the nodes of a tree, plus slot allocation.
pub(crate) trait NodeArena<K: Ord>: NodeView<K> {
    fn set_left(&mut self, index: u32, child: u32);

    fn set_right(&mut self, index: u32, child: u32);

    fn set_height(&mut self, index: u32, height: u32);

    /// Exchanges the keys stored in two nodes, leaving their links untouched.
    fn swap_keys(&mut self, a: u32, b: u32);

    /// Stores `key` in a fresh leaf and returns its index, or `None` when the
    /// arena cannot hold another node.
    fn allocate(&mut self, key: K) -> Option<u32>;
}

/// Result of placing a key in a subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Placement {
    /// A new leaf was linked into the tree.
    Added,
    /// The key was already stored; nothing changed.
    Present,
    /// The arena had no free slot; nothing changed.
    Rejected,
}

/// Height of the subtree at `index`, `0` for the null link.
#[inline]
pub(crate) fn height<K: Ord, A: NodeView<K>>(arena: &A, index: u32) -> u32 {
    if index == SENTINEL {
        0
    } else {
        arena.height(index)
    }
}

/// Left height minus right height.
#[inline]
fn balance_factor<K: Ord, A: NodeView<K>>(arena: &A, index: u32) -> i64 {
    if index == SENTINEL {
        return 0;
    }

    i64::from(height(arena, arena.left(index))) - i64::from(height(arena, arena.right(index)))
}

#[inline]
fn update_height<K: Ord, A: NodeArena<K>>(arena: &mut A, index: u32) {
    let left = height(arena, arena.left(index));
    let right = height(arena, arena.right(index));
    arena.set_height(index, max(left, right) + 1);
}

/// Returns the index holding `key`, if any.
pub(crate) fn find<K: Ord, A: NodeView<K>>(arena: &A, root: u32, key: &K) -> Option<u32> {
    let mut reference_node = root;

    while reference_node != SENTINEL {
        reference_node = match key.cmp(arena.key(reference_node)) {
            Ordering::Less => arena.left(reference_node),
            Ordering::Greater => arena.right(reference_node),
            Ordering::Equal => return Some(reference_node),
        };
    }

    None
}

/// Leftmost node of the subtree at `root`.
pub(crate) fn lowest<K: Ord, A: NodeView<K>>(arena: &A, root: u32) -> Option<u32> {
    if root == SENTINEL {
        return None;
    }

    let mut node = root;
    while arena.left(node) != SENTINEL {
        node = arena.left(node);
    }

    Some(node)
}

/// Rightmost node of the subtree at `root`.
pub(crate) fn highest<K: Ord, A: NodeView<K>>(arena: &A, root: u32) -> Option<u32> {
    if root == SENTINEL {
        return None;
    }

    let mut node = root;
    while arena.right(node) != SENTINEL {
        node = arena.right(node);
    }

    Some(node)
}

/// Perform a right AVL rotation around the left-heavy node `y`.
///
/// The left child `x` becomes the subtree root, `x`'s right subtree moves under
/// `y` and `y` becomes `x`'s right child. Returns `x`.
fn right_rotate<K: Ord, A: NodeArena<K>>(arena: &mut A, y: u32) -> u32 {
    let x = arena.left(y);
    let x_right = arena.right(x);

    arena.set_left(y, x_right);
    arena.set_right(x, y);

    // y first: x's height now depends on it
    update_height(arena, y);
    update_height(arena, x);

    x
}

/// Perform a left AVL rotation around the right-heavy node `x`. Mirror of
/// [`right_rotate`].
fn left_rotate<K: Ord, A: NodeArena<K>>(arena: &mut A, x: u32) -> u32 {
    let y = arena.right(x);
    let y_left = arena.left(y);

    arena.set_right(x, y_left);
    arena.set_left(y, x);

    update_height(arena, x);
    update_height(arena, y);

    y
}

/// Restores the AVL rule at `index` after one of its subtrees changed height
/// by at most one, returning the (possibly new) root of the subtree.
///
/// A child with a zero balance factor takes the single rotation. This case
/// only arises after deletions, and a double rotation there would leave the
/// subtree unbalanced.
pub(crate) fn rebalance<K: Ord, A: NodeArena<K>>(arena: &mut A, index: u32) -> u32 {
    update_height(arena, index);
    let balance = balance_factor(arena, index);

    if balance > 1 {
        let left = arena.left(index);

        if balance_factor(arena, left) < 0 {
            let child = left_rotate(arena, left);
            arena.set_left(index, child);
        }

        right_rotate(arena, index)
    } else if balance < -1 {
        let right = arena.right(index);

        if balance_factor(arena, right) > 0 {
            let child = right_rotate(arena, right);
            arena.set_right(index, child);
        }

        left_rotate(arena, index)
    } else {
        index
    }
}

/// Inserts `key` into the subtree at `node`, returning the new subtree root.
///
/// Every node on the way back up is rebalanced once a leaf has been added.
pub(crate) fn insert<K: Ord, A: NodeArena<K>>(
    arena: &mut A,
    node: u32,
    key: K,
) -> (u32, Placement) {
    if node == SENTINEL {
        return match arena.allocate(key) {
            Some(leaf) => (leaf, Placement::Added),
            None => (SENTINEL, Placement::Rejected),
        };
    }

    match key.cmp(arena.key(node)) {
        Ordering::Less => {
            let left = arena.left(node);
            let (child, placement) = insert(arena, left, key);

            if placement != Placement::Added {
                return (node, placement);
            }
            arena.set_left(node, child);
        }
        Ordering::Greater => {
            let right = arena.right(node);
            let (child, placement) = insert(arena, right, key);

            if placement != Placement::Added {
                return (node, placement);
            }
            arena.set_right(node, child);
        }
        Ordering::Equal => return (node, Placement::Present),
    }

    (rebalance(arena, node), Placement::Added)
}

/// Removes `key` from the subtree at `node`.
///
/// Returns the new subtree root and the index of the node that was unlinked,
/// which now holds `key`. The caller owns releasing that slot. When the key's
/// node has two children, its in-order successor is unlinked instead and the
/// two nodes swap keys, so the unlinked node always had at most one child.
pub(crate) fn remove<K: Ord, A: NodeArena<K>>(
    arena: &mut A,
    node: u32,
    key: &K,
) -> (u32, Option<u32>) {
    if node == SENTINEL {
        return (SENTINEL, None);
    }

    let removed = match key.cmp(arena.key(node)) {
        Ordering::Less => {
            let left = arena.left(node);
            let (child, removed) = remove(arena, left, key);

            if removed.is_none() {
                return (node, None);
            }
            arena.set_left(node, child);

            removed
        }
        Ordering::Greater => {
            let right = arena.right(node);
            let (child, removed) = remove(arena, right, key);

            if removed.is_none() {
                return (node, None);
            }
            arena.set_right(node, child);

            removed
        }
        Ordering::Equal => {
            let left = arena.left(node);
            let right = arena.right(node);

            if left == SENTINEL {
                return (right, Some(node));
            }
            if right == SENTINEL {
                return (left, Some(node));
            }

            let (right, successor) = detach_lowest(arena, right);
            arena.swap_keys(node, successor);
            arena.set_right(node, right);

            Some(successor)
        }
    };

    (rebalance(arena, node), removed)
}

/// Unlinks the leftmost node of the subtree at `node` (which must not be
/// empty), returning the new subtree root and the unlinked index.
fn detach_lowest<K: Ord, A: NodeArena<K>>(arena: &mut A, node: u32) -> (u32, u32) {
    let left = arena.left(node);

    if left == SENTINEL {
        return (arena.right(node), node);
    }

    let (child, lowest) = detach_lowest(arena, left);
    arena.set_left(node, child);

    (rebalance(arena, node), lowest)
}

/// Ascending iterator over node indices.
pub(crate) struct InOrder<K: Ord, A: NodeView<K>> {
    arena: A,
    /// Nodes whose left subtree is being visited.
    stack: Vec<u32>,
    _key: PhantomData<K>,
}

impl<K: Ord, A: NodeView<K>> InOrder<K, A> {
    pub(crate) fn new(arena: A, root: u32) -> Self {
        let mut iter = Self {
            arena,
            // enough for any balanced tree addressable with u32 indices
            stack: Vec::with_capacity(48),
            _key: PhantomData,
        };
        iter.push_left_spine(root);
        iter
    }

    fn push_left_spine(&mut self, mut node: u32) {
        while node != SENTINEL {
            self.stack.push(node);
            node = self.arena.left(node);
        }
    }
}

impl<K: Ord, A: NodeView<K>> Iterator for InOrder<K, A> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left_spine(self.arena.right(node));
        Some(node)
    }
}

/// Node indices in breadth-first order.
pub(crate) fn level_order<K: Ord, A: NodeView<K>>(arena: &A, root: u32) -> Vec<u32> {
    let mut result = Vec::new();

    if root == SENTINEL {
        return result;
    }

    let mut queue = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        result.push(node);

        let left = arena.left(node);
        if left != SENTINEL {
            queue.push_back(left);
        }

        let right = arena.right(node);
        if right != SENTINEL {
            queue.push_back(right);
        }
    }

    result
}

/// Checks every structural invariant of the tree at `root`: links stay inside
/// the arena, keys are strictly ordered, cached heights are exact, sibling
/// heights differ by one at most and `len` nodes are reachable.
///
/// Descent stops at the tallest height an AVL tree of `slots()` nodes can
/// have, so a degenerate chain fails with [`CollectionError::TooDeep`].
///
/// Strict ordering also rules out cycles, since a node reached twice would
/// have to lie strictly between bounds that include itself.
pub(crate) fn validate<K: Ord, A: NodeView<K>>(
    arena: &A,
    root: u32,
    len: usize,
) -> Result<(), CollectionError> {
    let limit = max_height(arena.slots());
    let mut reachable = 0;
    validate_subtree(arena, root, 1, limit, None, None, &mut reachable)?;

    if reachable != len {
        return Err(CollectionError::SizeMismatch {
            recorded: len,
            reachable,
        });
    }

    Ok(())
}

/// Height of the tallest AVL tree that fits in `slots` nodes.
///
/// The sparsest AVL tree of height `h` has `N(h) = N(h - 1) + N(h - 2) + 1`
/// nodes, with `N(0) = 0` and `N(1) = 1`.
fn max_height(slots: u32) -> u32 {
    if slots == 0 {
        return 0;
    }

    let (mut shorter, mut taller, mut height) = (0u64, 1u64, 1);

    while shorter + taller + 1 <= u64::from(slots) {
        (shorter, taller) = (taller, shorter + taller + 1);
        height += 1;
    }

    height
}

fn validate_subtree<K: Ord, A: NodeView<K>>(
    arena: &A,
    index: u32,
    depth: u32,
    limit: u32,
    lower: Option<&K>,
    upper: Option<&K>,
    reachable: &mut usize,
) -> Result<u32, CollectionError> {
    if index == SENTINEL {
        return Ok(0);
    }

    if index > arena.slots() {
        return Err(CollectionError::DanglingLink { index });
    }

    // bounds the recursion on degenerate trees read from foreign bytes
    if depth > limit {
        return Err(CollectionError::TooDeep { index, limit });
    }

    let key = arena.key(index);

    if lower.is_some_and(|lower| key <= lower) || upper.is_some_and(|upper| key >= upper) {
        return Err(CollectionError::OutOfOrder { index });
    }

    *reachable += 1;

    let left = validate_subtree(
        arena,
        arena.left(index),
        depth + 1,
        limit,
        lower,
        Some(key),
        reachable,
    )?;
    let right = validate_subtree(
        arena,
        arena.right(index),
        depth + 1,
        limit,
        Some(key),
        upper,
        reachable,
    )?;

    let balance = i64::from(left) - i64::from(right);
    if balance.abs() > 1 {
        return Err(CollectionError::Unbalanced { index, balance });
    }

    let actual = max(left, right) + 1;
    let cached = arena.height(index);
    if cached != actual {
        return Err(CollectionError::StaleHeight {
            index,
            cached,
            actual,
        });
    }

    Ok(actual)
}
