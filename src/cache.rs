//! Bounded FIFO replay cache.
//!
//! The cache is owned by the router's actor thread and is never shared, so it
//! carries no synchronization of its own.

use std::collections::VecDeque;

/// Most recent items sent through a router, oldest first.
#[derive(Clone, Debug)]
pub struct ReplayCache<T> {
    items: VecDeque<T>,
    /// Maximum retained items; `None` means unbounded.
    depth: Option<usize>,
}

impl<T: Clone> ReplayCache<T> {
    /// Create a cache holding at most `max_depth` items. Zero means unbounded.
    pub fn new(max_depth: usize) -> Self {
        Self {
            items: VecDeque::new(),
            depth: (max_depth >= 1).then_some(max_depth),
        }
    }

    /// Maximum retained items, or `None` if unbounded.
    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    /// Append an item, evicting the oldest entries past the depth bound.
    ///
    /// Returns how many items were evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);

        let mut evicted = 0;
        if let Some(depth) = self.depth {
            while self.items.len() > depth {
                self.items.pop_front();
                evicted += 1;
            }
        }
        evicted
    }

    /// Copy of the cached items in send order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut cache = ReplayCache::new(0);
        assert_eq!(cache.depth(), None);

        for i in 0..100 {
            assert_eq!(cache.push(i), 0);
        }

        assert_eq!(cache.len(), 100);
        assert_eq!(cache.snapshot(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_bounded_evicts_oldest() {
        let mut cache = ReplayCache::new(2);

        cache.push("a");
        cache.push("b");
        assert_eq!(cache.push("c"), 1);

        assert_eq!(cache.snapshot(), vec!["b", "c"]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_depth_one() {
        let mut cache = ReplayCache::new(1);
        cache.push(1);
        cache.push(2);
        cache.push(3);
        assert_eq!(cache.snapshot(), vec![3]);
    }

    #[test]
    fn test_clear_then_reuse() {
        let mut cache = ReplayCache::new(3);
        cache.push(1);
        cache.push(2);
        cache.clear();
        assert!(cache.is_empty());

        cache.push(3);
        assert_eq!(cache.snapshot(), vec![3]);
        assert_eq!(cache.depth(), Some(3));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut cache = ReplayCache::new(0);
        cache.push(String::from("x"));

        let snapshot = cache.snapshot();
        cache.clear();

        assert_eq!(snapshot, vec!["x".to_string()]);
    }
}
