//! Lock-free queue handing host groups or partitions to parallel workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed list of work units claimed by workers one at a time.
///
/// Each unit is handed out exactly once. Workers loop on
/// [`next()`](WorkQueue::next) until it returns `None`.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Create queue, keeping only units that pass `keep` (e.g. non-empty groups)
    pub fn filtered(items: Vec<S>, keep: impl Fn(&S) -> bool) -> Self {
        let items: Vec<S> = items.into_iter().filter(|s| keep(s)).collect();
        log::debug!("{} units in work queue", items.len());
        Self::new(items)
    }

    /// Claim the next unit along with its position in the queue
    pub fn next(&self) -> Option<(usize, &S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|s| (i, s))
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Units not yet claimed
    pub fn remaining(&self) -> usize {
        self.total()
            .saturating_sub(self.cursor.load(Ordering::Relaxed))
    }

    /// One worker per unit, at least one.
    pub fn worker_count(&self) -> usize {
        self.total().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hands_out_each_unit_once() {
        let q = WorkQueue::new(vec!["a", "b", "c"]);
        assert_eq!(q.total(), 3);
        assert_eq!(q.next(), Some((0, &"a")));
        assert_eq!(q.next(), Some((1, &"b")));
        assert_eq!(q.remaining(), 1);
        assert_eq!(q.next(), Some((2, &"c")));
        assert_eq!(q.next(), None);
        assert_eq!(q.remaining(), 0);
    }

    #[test]
    fn filtered_drops_units() {
        let q = WorkQueue::filtered(vec![vec![1], vec![], vec![2, 3]], |g| !g.is_empty());
        assert_eq!(q.total(), 2);
        assert_eq!(q.next().map(|(_, g)| g.len()), Some(1));
        assert_eq!(q.next().map(|(_, g)| g.len()), Some(2));
        assert!(q.next().is_none());
    }

    #[test]
    fn one_worker_per_unit() {
        let empty: WorkQueue<u8> = WorkQueue::new(vec![]);
        assert_eq!(empty.worker_count(), 1);
        let q = WorkQueue::new(vec![0u8; 300]);
        assert_eq!(q.worker_count(), 300);
    }
}
