use std::fmt;
use std::mem;

use super::node::{self, InOrder, NodeArena, NodeView, Placement, SENTINEL};
use crate::error::CollectionError;

#[derive(Clone)]
struct Node<K> {
    /// `None` while the slot sits on the free list.
    key: Option<K>,
    left: u32,
    right: u32,
    /// Height of the subtree. Vacant slots use it to link the free list.
    height: u32,
}

impl<K> Node<K> {
    fn leaf(key: K) -> Self {
        Self {
            key: Some(key),
            left: SENTINEL,
            right: SENTINEL,
            height: 1,
        }
    }
}

/// AVL tree set, which is a self-balancing binary search tree. Keys in the
/// tree are stored as such the height of two sibling subtrees differ by one at
/// most, so lookups, insertions and removals take `O(log n)`.
///
/// Nodes live in a growable arena and reference each other by index. Slots
/// released by removals are reused by later insertions.
#[derive(Clone)]
pub struct AvlSet<K: Ord> {
    /// Arena of nodes; index `i` lives at position `i - 1`.
    nodes: Vec<Node<K>>,

    root: u32,

    len: usize,

    /// First vacant slot, or [`SENTINEL`] when every slot is in use.
    free_list_head: u32,
}

impl<K: Ord> AvlSet<K> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty set with room for `capacity` keys before the arena
    /// needs to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root: SENTINEL,
            len: 0,
            free_list_head: SENTINEL,
        }
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Indicates whether the set is empty or not.
    pub fn is_empty(&self) -> bool {
        self.root == SENTINEL
    }

    /// Height of the tree: `0` when empty, `1` for a single key.
    pub fn height(&self) -> u32 {
        node::height(self, self.root)
    }

    /// Checks whether a key is present in the set or not.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to look up.
    pub fn contains(&self, key: &K) -> bool {
        node::find(self, self.root, key).is_some()
    }

    /// Inserts a key, rebalancing the tree on the way back to the root.
    ///
    /// Returns `false` and leaves the set untouched if the key is already
    /// present.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to insert.
    pub fn insert(&mut self, key: K) -> bool {
        let root = self.root;
        let (root, placement) = node::insert(self, root, key);

        match placement {
            Placement::Added => {
                self.root = root;
                true
            }
            Placement::Present => false,
            Placement::Rejected => panic!("tree is full ({} nodes)", self.len),
        }
    }

    /// Removes a key from the set, returning whether it was present.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to remove.
    pub fn remove(&mut self, key: &K) -> bool {
        self.take(key).is_some()
    }

    /// Removes a key from the set and returns the stored key, if one is found.
    ///
    /// # Arguments
    ///
    /// * `key` - the key to remove.
    pub fn take(&mut self, key: &K) -> Option<K> {
        let root = self.root;
        let (root, removed) = node::remove(self, root, key);
        let removed = removed?;

        self.root = root;
        Some(self.release(removed))
    }

    /// Returns the lowest key, if any.
    pub fn first(&self) -> Option<&K> {
        node::lowest(self, self.root).map(|index| self.key(index))
    }

    /// Returns the highest key, if any.
    pub fn last(&self) -> Option<&K> {
        node::highest(self, self.root).map(|index| self.key(index))
    }

    /// Removes every key, keeping the arena's allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = SENTINEL;
        self.len = 0;
        self.free_list_head = SENTINEL;
    }

    /// An iterator visiting all keys in ascending order.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            set: self,
            inner: InOrder::new(self, self.root),
        }
    }

    /// Keys in ascending (in-order) order.
    pub fn in_order(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.iter().cloned().collect()
    }

    /// Keys in breadth-first (level) order, which exposes the shape of the tree.
    pub fn level_order(&self) -> Vec<K>
    where
        K: Clone,
    {
        node::level_order(self, self.root)
            .into_iter()
            .map(|index| self.key(index).clone())
            .collect()
    }

    /// Verifies ordering, balance, cached heights and the key count.
    pub fn validate(&self) -> Result<(), CollectionError> {
        node::validate(self, self.root, self.len)
    }

    /// Returns a detached slot to the free list, handing back its key.
    fn release(&mut self, index: u32) -> K {
        let free_list_head = self.free_list_head;
        let entry = &mut node!(self.nodes, index);

        let key = entry.key.take().expect("invalid tree structure");
        entry.left = SENTINEL;
        entry.right = SENTINEL;
        entry.height = free_list_head;

        self.free_list_head = index;
        self.len -= 1;

        key
    }
}

impl<K: Ord> NodeView<K> for AvlSet<K> {
    #[inline]
    fn slots(&self) -> u32 {
        self.nodes.len() as u32
    }

    #[inline]
    fn key(&self, index: u32) -> &K {
        node!(self.nodes, index)
            .key
            .as_ref()
            .expect("invalid tree structure")
    }

    #[inline]
    fn left(&self, index: u32) -> u32 {
        node!(self.nodes, index).left
    }

    #[inline]
    fn right(&self, index: u32) -> u32 {
        node!(self.nodes, index).right
    }

    #[inline]
    fn height(&self, index: u32) -> u32 {
        node!(self.nodes, index).height
    }
}

impl<K: Ord> NodeArena<K> for AvlSet<K> {
    #[inline]
    fn set_left(&mut self, index: u32, child: u32) {
        node!(self.nodes, index).left = child;
    }

    #[inline]
    fn set_right(&mut self, index: u32, child: u32) {
        node!(self.nodes, index).right = child;
    }

    #[inline]
    fn set_height(&mut self, index: u32, height: u32) {
        node!(self.nodes, index).height = height;
    }

    fn swap_keys(&mut self, a: u32, b: u32) {
        let key = node!(self.nodes, a).key.take();
        let key = mem::replace(&mut node!(self.nodes, b).key, key);
        node!(self.nodes, a).key = key;
    }

    fn allocate(&mut self, key: K) -> Option<u32> {
        let index = if self.free_list_head != SENTINEL {
            let index = self.free_list_head;
            let entry = &mut node!(self.nodes, index);

            self.free_list_head = entry.height;
            *entry = Node::leaf(key);

            index
        } else {
            let index = u32::try_from(self.nodes.len() + 1).ok()?;
            self.nodes.push(Node::leaf(key));

            index
        };

        self.len += 1;

        Some(index)
    }
}

impl<K: Ord> Default for AvlSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug> fmt::Debug for AvlSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: Ord> PartialEq for AvlSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<K: Ord> Eq for AvlSet<K> {}

impl<K: Ord> FromIterator<K> for AvlSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<K: Ord> Extend<K> for AvlSet<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}

impl<'a, K: Ord> IntoIterator for &'a AvlSet<K> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the keys of an [`AvlSet`].
pub struct Iter<'a, K: Ord> {
    set: &'a AvlSet<K>,
    inner: InOrder<K, &'a AvlSet<K>>,
}

impl<'a, K: Ord> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let set = self.set;
        self.inner.next().map(|index| set.key(index))
    }
}

#[cfg(test)]
mod tests {
    use super::AvlSet;

    fn set_of(keys: &[i32]) -> AvlSet<i32> {
        let mut set = AvlSet::new();
        for key in keys {
            set.insert(*key);
        }
        set.validate().unwrap();
        set
    }

    #[test]
    fn test_empty() {
        let set = AvlSet::<i32>::new();

        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
        assert_eq!(set.height(), 0);
        assert!(!set.contains(&5));
        assert!(set.in_order().is_empty());
        assert!(set.level_order().is_empty());
        assert_eq!(set.first(), None);
    }

    #[test]
    fn test_single_rotations() {
        // left-left
        let set = set_of(&[30, 20, 10]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.in_order(), vec![10, 20, 30]);
        assert_eq!(set.level_order(), vec![20, 10, 30]);

        // right-right
        let set = set_of(&[10, 20, 30]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.level_order(), vec![20, 10, 30]);
    }

    #[test]
    fn test_double_rotations() {
        // left-right
        let set = set_of(&[30, 10, 20]);
        assert_eq!(set.in_order(), vec![10, 20, 30]);
        assert_eq!(set.level_order(), vec![20, 10, 30]);

        // right-left
        let set = set_of(&[10, 30, 20]);
        assert_eq!(set.in_order(), vec![10, 20, 30]);
        assert_eq!(set.level_order(), vec![20, 10, 30]);
    }

    #[test]
    fn test_insert_many() {
        let mut elements = vec![50, 25, 75, 10, 35, 60, 80, 5, 15, 30, 40, 55, 65, 78, 85];
        let set = set_of(&elements);

        assert_eq!(set.len(), elements.len());
        for element in &elements {
            assert!(set.contains(element));
        }
        assert!(!set.contains(&99));

        elements.sort();
        assert_eq!(set.in_order(), elements);
    }

    #[test]
    fn test_insert_duplicate() {
        let mut set = set_of(&[10, 20]);

        assert!(!set.insert(10));
        assert_eq!(set.len(), 2);
        assert_eq!(set.in_order(), vec![10, 20]);
        assert_eq!(set, set_of(&[10, 20]));
    }

    #[test]
    fn test_search() {
        let set = set_of(&[10, 5, 15, 2, 7]);

        for key in [10, 5, 15, 2, 7] {
            assert!(set.contains(&key));
        }
        assert!(!set.contains(&1));
        assert!(!set.contains(&6));
        assert_eq!(set.level_order(), vec![10, 5, 15, 2, 7]);
    }

    #[test]
    fn test_remove_leaf() {
        let mut set = set_of(&[20, 10, 30, 5, 15]);

        assert!(set.remove(&5));
        assert_eq!(set.len(), 4);
        assert_eq!(set.in_order(), vec![10, 15, 20, 30]);
        assert!(!set.contains(&5));

        assert!(set.remove(&15));
        assert_eq!(set.len(), 3);
        assert_eq!(set.in_order(), vec![10, 20, 30]);
        set.validate().unwrap();
    }

    #[test]
    fn test_remove_with_one_child() {
        let mut set = set_of(&[20, 10, 30, 5]);

        assert!(set.remove(&10));
        assert_eq!(set.len(), 3);
        assert_eq!(set.in_order(), vec![5, 20, 30]);
        assert_eq!(set.level_order(), vec![20, 5, 30]);
        set.validate().unwrap();
    }

    #[test]
    fn test_remove_with_two_children() {
        let mut set = set_of(&[50, 30, 70, 20, 40, 60, 80]);
        assert_eq!(set.level_order(), vec![50, 30, 70, 20, 40, 60, 80]);

        // the in-order successor (60) takes the root's place
        assert_eq!(set.take(&50), Some(50));
        assert_eq!(set.len(), 6);
        assert!(!set.contains(&50));
        assert_eq!(set.in_order(), vec![20, 30, 40, 60, 70, 80]);
        assert_eq!(set.level_order(), vec![60, 30, 70, 20, 40, 80]);
        set.validate().unwrap();
    }

    #[test]
    fn test_remove_rotates_on_balanced_child() {
        let mut set = set_of(&[20, 10, 30, 5, 15]);

        // 20 becomes left-heavy while 10 is balanced: single right rotation
        assert!(set.remove(&30));
        assert_eq!(set.level_order(), vec![10, 5, 20, 15]);
        set.validate().unwrap();
    }

    #[test]
    fn test_remove_mixed() {
        let mut set = set_of(&[30, 10, 50, 5, 20, 40, 60, 25]);
        assert_eq!(set.len(), 8);

        assert!(set.remove(&60));
        assert_eq!(set.len(), 7);
        assert_eq!(set.in_order(), vec![5, 10, 20, 25, 30, 40, 50]);
        set.validate().unwrap();
    }

    #[test]
    fn test_remove_missing() {
        let mut set = set_of(&[10, 5]);

        assert!(!set.remove(&99));
        assert_eq!(set.len(), 2);
        assert_eq!(set.in_order(), vec![5, 10]);

        let mut empty = AvlSet::<i32>::new();
        assert!(!empty.remove(&10));
        assert_eq!(empty.len(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_reuses_released_slots() {
        let mut set = set_of(&[1, 2, 3, 4]);
        let slots = set.nodes.len();

        assert!(set.remove(&2));
        assert!(set.remove(&3));
        assert!(set.insert(7));
        assert!(set.insert(8));

        assert_eq!(set.nodes.len(), slots);
        assert_eq!(set.in_order(), vec![1, 4, 7, 8]);
        set.validate().unwrap();
    }

    #[test]
    fn test_large_insert_remove() {
        const COUNT: u32 = 10_000;

        let mut set: AvlSet<u32> = (1..=COUNT).collect();
        assert_eq!(set.len(), COUNT as usize);
        // 1.44 * log2(n) bounds any AVL tree
        assert!(set.height() <= 20);
        set.validate().unwrap();

        for key in (1..=COUNT).step_by(2) {
            assert!(set.remove(&key));
        }
        assert_eq!(set.len(), (COUNT / 2) as usize);
        set.validate().unwrap();

        for key in 1..=COUNT {
            assert_eq!(set.remove(&key), key % 2 == 0);
        }
        assert!(set.is_empty());
        assert_eq!(set.height(), 0);
    }

    #[test]
    fn test_first_last_and_clear() {
        let mut set = set_of(&[8, 3, 12, 1]);

        assert_eq!(set.first(), Some(&1));
        assert_eq!(set.last(), Some(&12));

        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.first(), None);
        assert!(set.insert(4));
        assert_eq!(set.in_order(), vec![4]);
    }

    #[test]
    fn test_debug_and_iter() {
        let set = set_of(&[3, 1, 2]);

        assert_eq!(format!("{set:?}"), "{1, 2, 3}");
        assert_eq!((&set).into_iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_string_keys() {
        let mut set: AvlSet<String> = ["pear", "apple", "fig"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert!(set.contains(&"fig".to_string()));
        assert_eq!(set.take(&"apple".to_string()), Some("apple".to_string()));
        assert_eq!(set.in_order(), vec!["fig".to_string(), "pear".to_string()]);
    }
}
