//! Reusable integer id allocation
//!
//! Ids are small and dense: released ids go back on a free list and are
//! handed out again before fresh ones. Unlike [`crate::SlotKey`], an id
//! carries no generation, so it identifies a live object only while that
//! object exists.

use alloc::collections::BTreeSet;

/// Allocates unique `u32` ids, reusing released ones (lowest first)
#[derive(Debug, Default, Clone)]
pub struct IdPool {
    next_fresh: u32,
    free: BTreeSet<u32>,
}

impl IdPool {
    /// First id handed out by a fresh pool
    pub const FIRST: u32 = 1;

    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an id that is not currently in use
    pub fn allocate(&mut self) -> u32 {
        if let Some(id) = self.free.pop_first() {
            return id;
        }
        let id = self.next_fresh + Self::FIRST;
        self.next_fresh += 1;
        id
    }

    /// Return an id to the pool. Returns `false` if it was not in use.
    pub fn release(&mut self, id: u32) -> bool {
        if !self.is_used(id) {
            return false;
        }
        self.free.insert(id)
    }

    /// Check whether an id is currently handed out
    pub fn is_used(&self, id: u32) -> bool {
        id >= Self::FIRST && id < self.next_fresh + Self::FIRST && !self.free.contains(&id)
    }

    /// Number of ids currently in use
    pub fn len(&self) -> usize {
        self.next_fresh as usize - self.free.len()
    }

    /// Check if no ids are in use
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every allocation
    pub fn reset(&mut self) {
        self.next_fresh = 0;
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_reuse() {
        let mut pool = IdPool::new();
        let a = pool.allocate();
        let b = pool.allocate();
        let c = pool.allocate();
        assert_eq!((a, b, c), (1, 2, 3));

        assert!(pool.release(b));
        assert!(!pool.release(b));
        assert!(!pool.is_used(b));
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.allocate(), b);
        assert_eq!(pool.allocate(), 4);
    }

    #[test]
    fn test_release_unknown() {
        let mut pool = IdPool::new();
        assert!(!pool.release(0));
        assert!(!pool.release(7));
        assert!(pool.is_empty());
    }
}
