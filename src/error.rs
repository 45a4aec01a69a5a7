use bytemuck::PodCastError;

/// Errors reported by the tree collections.
///
/// Looking up or removing a missing key and inserting a duplicate are not
/// errors; those operations report their outcome as a `bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    #[error("tree is full ({capacity} nodes)")]
    Full { capacity: usize },

    #[error("buffer too small: {required} bytes required, {available} available")]
    BufferTooSmall { required: usize, available: usize },

    #[error("invalid buffer layout: {0:?}")]
    Layout(PodCastError),

    #[error("key of {size} bytes (alignment {align}) leaves padding in tree nodes")]
    UnsupportedKey { size: usize, align: usize },

    #[error("node {index} is unbalanced (balance factor {balance})")]
    Unbalanced { index: u32, balance: i64 },

    #[error("node {index} breaks the search order")]
    OutOfOrder { index: u32 },

    #[error("node {index} caches height {cached}, actual height is {actual}")]
    StaleHeight { index: u32, cached: u32, actual: u32 },

    #[error("node {index} lies deeper than any AVL tree of this size ({limit} levels)")]
    TooDeep { index: u32, limit: u32 },

    #[error("link to node {index} is outside the arena")]
    DanglingLink { index: u32 },

    #[error("size mismatch: {recorded} recorded, {reachable} reachable from the root")]
    SizeMismatch { recorded: usize, reachable: usize },
}
