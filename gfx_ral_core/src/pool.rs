//! Generic fixed-capacity slot allocator (§4.1).
//!
//! A [`HandlePool`] is a fixed-size array of payload slots threaded together
//! by a free list. `acquire`/`release` are `O(1)` and require external mutual
//! exclusion (the pools that embed a `HandlePool` hold a
//! [`parking_lot::Mutex`] around those two calls); `get` is lock-free and may
//! run concurrently with acquires/releases of *other* slots, since slot
//! storage is stable and a payload is only ever mutated by its current
//! owner.

use crate::handle::{Generation, Index, NULL_INDEX};

enum Slot<T> {
    Free { next_free: Index, generation: Generation },
    Occupied { value: T, generation: Generation },
}

/// Fixed-capacity slot table. `T` is the payload stored per slot.
///
/// Exhausting the pool is treated as fatal: capacity is a promise made at
/// configuration time (see `Config::max_num_*` in the backend crate), not a
/// condition callers are expected to recover from.
pub struct HandlePool<T> {
    slots: Vec<Slot<T>>,
    free_head: Index,
    live_count: usize,
    capacity: usize,
}

impl<T> HandlePool<T> {
    /// Create a pool with the given fixed capacity. No slots are allocated
    /// up front beyond the backing `Vec`'s storage.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && (capacity as u64) < NULL_INDEX as u64, "pool capacity out of range");
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next_free = if i + 1 == capacity { NULL_INDEX } else { (i + 1) as Index };
            slots.push(Slot::Free { next_free, generation: 0 });
        }
        Self { slots, free_head: if capacity == 0 { NULL_INDEX } else { 0 }, live_count: 0, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Acquire a free slot, stamp `value` into it, and return its index.
    ///
    /// Fatal (panics with diagnostic context) if the pool is exhausted.
    pub fn acquire(&mut self, value: T) -> Index {
        self.acquire_generational(value).0
    }

    /// Like [`Self::acquire`] but also returns the generation stamped into
    /// the slot, for callers building a [`crate::handle::GenerationalHandle`].
    pub fn acquire_generational(&mut self, value: T) -> (Index, Generation) {
        let index = self.free_head;
        assert!(
            index != NULL_INDEX,
            "handle pool exhausted (capacity {}); capacity is a configured promise, not a recoverable condition",
            self.capacity
        );
        let slot = &mut self.slots[index as usize];
        let (next_free, generation) = match *slot {
            Slot::Free { next_free, generation } => (next_free, generation),
            Slot::Occupied { .. } => unreachable!("free list pointed at an occupied slot"),
        };
        *slot = Slot::Occupied { value, generation };
        self.free_head = next_free;
        self.live_count += 1;
        (index, generation)
    }

    /// Release a previously acquired slot back onto the free list, bumping
    /// its generation so that stale [`crate::handle::GenerationalHandle`]
    /// values are detected by [`Self::get_generational`].
    ///
    /// Double-release is a programmer error and panics.
    pub fn release(&mut self, index: Index) -> T {
        let slot = &mut self.slots[index as usize];
        let (value, generation) = match core::mem::replace(slot, Slot::Free { next_free: NULL_INDEX, generation: 0 }) {
            Slot::Occupied { value, generation } => (value, generation),
            Slot::Free { .. } => panic!("double release of handle pool slot {index}"),
        };
        *slot = Slot::Free { next_free: self.free_head, generation: generation.wrapping_add(1) };
        self.free_head = index;
        self.live_count -= 1;
        value
    }

    #[inline]
    pub fn get(&self, index: Index) -> &T {
        match &self.slots[index as usize] {
            Slot::Occupied { value, .. } => value,
            Slot::Free { .. } => panic!("stale handle: slot {index} is not allocated"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, index: Index) -> &mut T {
        match &mut self.slots[index as usize] {
            Slot::Occupied { value, .. } => value,
            Slot::Free { .. } => panic!("stale handle: slot {index} is not allocated"),
        }
    }

    /// Generation-checked lookup; returns `None` on a dangling handle rather
    /// than panicking, so callers can surface `Error::ExpiredHandle`.
    pub fn get_generational(&self, index: Index, generation: Generation) -> Option<&T> {
        match self.slots.get(index as usize)? {
            Slot::Occupied { value, generation: g } if *g == generation => Some(value),
            _ => None,
        }
    }

    /// Walk the live set. Used for leak reporting at pool teardown.
    pub fn iterate_allocated(&self, mut f: impl FnMut(Index, &T)) {
        for (i, slot) in self.slots.iter().enumerate() {
            if let Slot::Occupied { value, .. } = slot {
                f(i as Index, value);
            }
        }
    }

    /// Number of live entries; used for the leak-count-at-shutdown report.
    pub fn count_leaked(&self) -> usize {
        self.live_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_roundtrip() {
        let mut pool: HandlePool<u32> = HandlePool::new(4);
        let a = pool.acquire(10);
        let b = pool.acquire(20);
        assert_eq!(*pool.get(a), 10);
        assert_eq!(*pool.get(b), 20);
        assert_eq!(pool.live_count(), 2);
        pool.release(a);
        assert_eq!(pool.live_count(), 1);
        let c = pool.acquire(30);
        assert_eq!(c, a, "freed slot is recycled");
        assert_eq!(*pool.get(c), 30);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhaustion_is_fatal() {
        let mut pool: HandlePool<u32> = HandlePool::new(1);
        pool.acquire(1);
        pool.acquire(2);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn double_release_panics() {
        let mut pool: HandlePool<u32> = HandlePool::new(1);
        let a = pool.acquire(1);
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn generation_check_catches_dangling_handle() {
        let mut pool: HandlePool<u32> = HandlePool::new(1);
        let (idx, gen0) = pool.acquire_generational(1);
        pool.release(idx);
        let (idx2, gen1) = pool.acquire_generational(2);
        assert_eq!(idx, idx2);
        assert_ne!(gen0, gen1);
        assert!(pool.get_generational(idx2, gen0).is_none());
        assert!(pool.get_generational(idx2, gen1).is_some());
    }

    #[test]
    fn iterate_allocated_sees_only_live_slots() {
        let mut pool: HandlePool<u32> = HandlePool::new(3);
        let a = pool.acquire(1);
        let _b = pool.acquire(2);
        pool.release(a);
        let mut seen = Vec::new();
        pool.iterate_allocated(|idx, v| seen.push((idx, *v)));
        assert_eq!(seen.len(), 1);
        assert_eq!(pool.count_leaked(), 1);
    }
}
