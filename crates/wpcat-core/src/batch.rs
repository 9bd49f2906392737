//! Fixed-size batching of work items.

/// Default number of titles sent to the classifier per call.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Split `items` into contiguous groups of at most `size` elements.
///
/// Order is preserved and only the last group may be shorter.
///
/// # Panics
/// Panics if `size` is zero.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    assert!(size > 0, "chunk size must be positive");
    items.chunks(size).map(|c| c.to_vec()).collect()
}
