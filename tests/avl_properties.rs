use std::collections::BTreeSet;

use avl_pod::{AVLTreeMut, AvlSet};
use proptest::collection::vec;
use proptest::prelude::*;

const KEY_SPACE: u16 = 64;

#[derive(Debug, Clone)]
enum Op {
    Insert(u16),
    Remove(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KEY_SPACE).prop_map(Op::Insert),
        (0..KEY_SPACE).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn avl_set_matches_btree_set(ops in vec(op(), 0..300)) {
        let mut set = AvlSet::new();
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(key) => {
                    prop_assert_eq!(set.insert(key), model.insert(key));
                }
                Op::Remove(key) => {
                    prop_assert_eq!(set.remove(&key), model.remove(&key));
                    prop_assert!(!set.contains(&key));
                }
            }

            prop_assert_eq!(set.validate(), Ok(()));
            prop_assert_eq!(set.len(), model.len());
            prop_assert_eq!(set.is_empty(), model.is_empty());
        }

        prop_assert_eq!(set.in_order(), model.iter().copied().collect::<Vec<_>>());
        prop_assert_eq!(set.first(), model.first());
        prop_assert_eq!(set.last(), model.last());

        for key in 0..KEY_SPACE {
            prop_assert_eq!(set.contains(&key), model.contains(&key));
        }
    }

    #[test]
    fn duplicate_inserts_leave_the_tree_unchanged(keys in vec(any::<i32>(), 0..100)) {
        let once: AvlSet<i32> = keys.iter().copied().collect();

        let mut twice = AvlSet::new();
        for key in &keys {
            twice.insert(*key);
            prop_assert!(!twice.insert(*key));
        }

        prop_assert_eq!(once.len(), twice.len());
        prop_assert_eq!(once.in_order(), twice.in_order());
        prop_assert_eq!(once.level_order(), twice.level_order());
    }

    #[test]
    fn removed_keys_are_no_longer_found(keys in vec(any::<u32>(), 1..100)) {
        let mut set: AvlSet<u32> = keys.iter().copied().collect();

        for key in &keys {
            prop_assert!(set.contains(key));
        }

        for key in &keys {
            set.remove(key);
            prop_assert!(!set.contains(key));
            prop_assert_eq!(set.validate(), Ok(()));
        }

        prop_assert!(set.is_empty());
        prop_assert_eq!(set.height(), 0);
    }

    #[test]
    fn zero_copy_tree_matches_btree_set(ops in vec(op(), 0..300)) {
        let capacity = KEY_SPACE as usize;
        let len = AVLTreeMut::<u64>::data_len(capacity);
        let mut data = vec![0u64; len.div_ceil(8)];
        let bytes = &mut bytemuck::cast_slice_mut::<u64, u8>(&mut data)[..len];

        let mut tree = AVLTreeMut::<u64>::from_bytes_mut(bytes).unwrap();
        tree.initialize(KEY_SPACE as u32).unwrap();
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(key) => {
                    let key = u64::from(key);
                    prop_assert_eq!(tree.insert(key), Ok(model.insert(key)));
                }
                Op::Remove(key) => {
                    let key = u64::from(key);
                    prop_assert_eq!(tree.remove(&key), model.remove(&key));
                }
            }

            prop_assert_eq!(tree.validate(), Ok(()));
            prop_assert_eq!(tree.len(), model.len());
        }

        prop_assert_eq!(tree.in_order(), model.iter().copied().collect::<Vec<_>>());
        prop_assert_eq!(tree.lowest(), model.first().copied());
        prop_assert_eq!(tree.highest(), model.last().copied());
    }
}
