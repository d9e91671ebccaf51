//! Lazy OS-thread-to-dense-index mapping (§5), grounded in the native
//! `ThreadAssociation`'s single-global-instance design but re-architected
//! per §9 as a value owned by the backend rather than a process-wide
//! singleton: every surface that needs a thread index is handed one
//! explicitly instead of reaching into global state.
//!
//! The native design enforced "one `ThreadAssociation` alive per process"
//! with a global flag; here that invariant is simply structural — there is
//! one [`ThreadAssociation`] per [`Backend`](crate) instance and it is not
//! `Clone`, so at most one can be alive wherever it's held.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};

/// First call from a new OS thread atomically claims the next index;
/// subsequent calls from that thread return the cached value. Indices are
/// dense in `[0, num_associations)`.
pub struct ThreadAssociation {
    id: u32,
    num_associations: AtomicU32,
}

thread_local! {
    static TLS_INDEX: Cell<Option<(u32, u32)>> = const { Cell::new(None) }; // (association id, index)
}

static NEXT_ASSOCIATION_ID: AtomicU32 = AtomicU32::new(0);

impl ThreadAssociation {
    pub fn new() -> Self {
        Self { id: NEXT_ASSOCIATION_ID.fetch_add(1, Ordering::Relaxed), num_associations: AtomicU32::new(0) }
    }

    /// The dense index for the calling thread, assigning one if this is
    /// the thread's first call against *this* association instance.
    pub fn current_index(&self) -> u32 {
        TLS_INDEX.with(|cell| {
            if let Some((id, index)) = cell.get() {
                if id == self.id {
                    return index;
                }
            }
            let index = self.num_associations.fetch_add(1, Ordering::Relaxed);
            cell.set(Some((self.id, index)));
            index
        })
    }

    /// Number of distinct threads that have called [`Self::current_index`]
    /// so far.
    pub fn num_associations(&self) -> u32 {
        self.num_associations.load(Ordering::Relaxed)
    }
}

impl Default for ThreadAssociation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn same_thread_gets_same_index_repeatedly() {
        let assoc = ThreadAssociation::new();
        let a = assoc.current_index();
        let b = assoc.current_index();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_threads_get_distinct_dense_indices() {
        let assoc = ThreadAssociation::new();
        let main_index = assoc.current_index();
        let spawned_index = thread::scope(|s| s.spawn(|| assoc.current_index()).join().unwrap());
        assert_ne!(main_index, spawned_index);
        assert_eq!(assoc.num_associations(), 2);
    }

    #[test]
    fn two_independent_associations_do_not_interfere() {
        let a = ThreadAssociation::new();
        let b = ThreadAssociation::new();
        assert_eq!(a.current_index(), 0);
        assert_eq!(b.current_index(), 0, "each association has its own dense index space");
    }
}
