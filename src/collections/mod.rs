/// Macro to access a node by its 1-based index.
macro_rules! node {
    ( $array:expr, $index:expr ) => {
        $array[($index - 1) as usize]
    };
}

pub mod avl_set;
pub mod avl_tree;
mod node;

pub use avl_set::AvlSet;
pub use avl_tree::AVLTree;
pub use avl_tree::AVLTreeMut;
