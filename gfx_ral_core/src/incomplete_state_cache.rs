//! Per-command-list resource state tracking (§4.5).
//!
//! A command list, recorded on some application thread, has no visibility
//! into the GPU-timeline state of the resources it touches — that state
//! depends on whatever other command lists the submitter batches alongside
//! it. So each list only ever records, per touched resource, the state it
//! *assumes* on entry (`required_initial`) and the state it *leaves the
//! resource in* (`current`). The gap between "global truth" and
//! "what this list assumes" is reconciled once, at submit time, by the
//! state-stitching protocol in the backend's `submit` (grounded in
//! `resource_pool.rs`'s master state cache).
//!
//! Capped at a small inline count: in practice a single command list rarely
//! touches more than a handful of distinct resources, and linear scan over
//! a dozen entries beats a hash map's overhead.

use smallvec::SmallVec;

use crate::handle::ResourceHandle;

/// Default inline capacity for [`IncompleteStateCache`]; spec'd at ~32
/// entries before it would spill (the `SmallVec` grows past that only in
/// pathological recordings, never in `assert`-enforced normal use).
pub const INLINE_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug)]
pub struct CacheEntry<S> {
    pub resource: ResourceHandle,
    /// The state this list assumes `resource` is in on entry; the *after*
    /// of the (possibly absent) initial transition.
    pub required_initial: S,
    /// The state this list leaves `resource` in.
    pub current: S,
    /// Pipeline stage mask active at the first touch of `resource`.
    pub first_stage: u32,
    /// Pipeline stage mask active at the most recent touch of `resource`.
    pub latest_stage: u32,
}

/// Generic over the state enum so both backends (whole-resource D3D12
/// states, and Vulkan-style states-plus-stage-masks) can share the same
/// bookkeeping shape.
pub struct IncompleteStateCache<S> {
    entries: SmallVec<[CacheEntry<S>; INLINE_CAPACITY]>,
}

impl<S: Copy + PartialEq> IncompleteStateCache<S> {
    pub fn new() -> Self {
        Self { entries: SmallVec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[CacheEntry<S>] {
        &self.entries
    }

    /// Record a transition of `resource` to `after`, at the given pipeline
    /// stage mask. Returns the known `before` state if `resource` was
    /// already present in this list's cache, or `None` if this is the
    /// first touch (in which case the caller must *not* emit a barrier —
    /// the stitching pass will supply the missing `before`).
    pub fn transition(&mut self, resource: ResourceHandle, after: S, stage_mask: u32) -> Option<S> {
        for entry in &mut self.entries {
            if entry.resource == resource {
                let before = entry.current;
                entry.current = after;
                entry.latest_stage = stage_mask;
                return Some(before);
            }
        }
        self.entries.push(CacheEntry {
            resource,
            required_initial: after,
            current: after,
            first_stage: stage_mask,
            latest_stage: stage_mask,
        });
        None
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

impl<S: Copy + PartialEq> Default for IncompleteStateCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure decision logic for the state-stitching submit pass (§4.2): given
/// one command list's recorded entries and read/write access to the live
/// per-resource master state, returns the `(resource, before, after)`
/// transitions that must be turned into a barrier ahead of this list, and
/// advances the master state to what the list leaves each resource in.
///
/// Generic over the master-state accessors rather than over a concrete
/// resource pool so a backend's submit loop and this crate's tests can
/// drive the exact same logic — the tests against a fake map, the backend
/// against its real resource pool.
pub fn stitch<S: Copy + PartialEq>(
    entries: &[CacheEntry<S>],
    mut read_master: impl FnMut(ResourceHandle) -> S,
    mut write_master: impl FnMut(ResourceHandle, S),
) -> SmallVec<[(ResourceHandle, S, S); 8]> {
    let mut transitions = SmallVec::new();
    for entry in entries {
        let master = read_master(entry.resource);
        if master != entry.required_initial {
            transitions.push((entry.resource, master, entry.required_initial));
        }
        write_master(entry.resource, entry.current);
    }
    transitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Debug)]
    enum S {
        CopyDest,
        ShaderResource,
        RenderTarget,
    }

    fn h(i: u32) -> ResourceHandle {
        ResourceHandle::from_index(i)
    }

    #[test]
    fn first_touch_has_no_known_before() {
        let mut cache: IncompleteStateCache<S> = IncompleteStateCache::new();
        assert_eq!(cache.transition(h(0), S::ShaderResource, 0), None);
        let e = &cache.entries()[0];
        assert_eq!(e.required_initial, S::ShaderResource);
        assert_eq!(e.current, S::ShaderResource);
    }

    #[test]
    fn repeated_touch_returns_before_and_updates_current() {
        let mut cache: IncompleteStateCache<S> = IncompleteStateCache::new();
        cache.transition(h(0), S::ShaderResource, 0);
        let before = cache.transition(h(0), S::RenderTarget, 0);
        assert_eq!(before, Some(S::ShaderResource));
        assert_eq!(cache.entries().len(), 1, "same resource collapses to one entry");
        let e = &cache.entries()[0];
        assert_eq!(e.required_initial, S::ShaderResource, "first-set state is preserved");
        assert_eq!(e.current, S::RenderTarget, "last-set state wins");
    }

    #[test]
    fn reset_clears_all_entries() {
        let mut cache: IncompleteStateCache<S> = IncompleteStateCache::new();
        cache.transition(h(0), S::CopyDest, 0);
        cache.reset();
        assert!(cache.is_empty());
    }

    /// Fake "native queue" seam for [`stitch`]: a plain map standing in for
    /// a resource pool's master-state cache, so the stitching decision can
    /// be exercised without any native object.
    struct FakeMasterState(std::collections::HashMap<ResourceHandle, S>);

    impl FakeMasterState {
        fn new(initial: &[(ResourceHandle, S)]) -> Self {
            Self(initial.iter().copied().collect())
        }

        fn read(&mut self, resource: ResourceHandle) -> S {
            self.0[&resource]
        }

        fn write(&mut self, resource: ResourceHandle, state: S) {
            self.0.insert(resource, state);
        }

        fn get(&self, resource: ResourceHandle) -> S {
            self.0[&resource]
        }
    }

    #[test]
    fn scenario_1_stitch_single_resource() {
        let mut master = FakeMasterState::new(&[(h(0), S::CopyDest)]);
        let mut cache: IncompleteStateCache<S> = IncompleteStateCache::new();
        cache.transition(h(0), S::ShaderResource, 0);

        let transitions = stitch(cache.entries(), |r| master.read(r), |r, s| master.write(r, s));

        assert_eq!(transitions.as_slice(), &[(h(0), S::CopyDest, S::ShaderResource)]);
        assert_eq!(master.get(h(0)), S::ShaderResource);
    }

    #[test]
    fn scenario_2_stitch_redundant_emits_no_transition() {
        let mut master = FakeMasterState::new(&[(h(0), S::ShaderResource)]);
        let mut cache: IncompleteStateCache<S> = IncompleteStateCache::new();
        cache.transition(h(0), S::ShaderResource, 0);

        let transitions = stitch(cache.entries(), |r| master.read(r), |r, s| master.write(r, s));

        assert!(transitions.is_empty(), "no transition needed when master already matches required_initial");
        assert_eq!(master.get(h(0)), S::ShaderResource);
    }

    #[test]
    fn scenario_3_two_lists_one_resource_stitch_between_lists() {
        let mut master = FakeMasterState::new(&[(h(0), S::CopyDest)]);

        let mut l1: IncompleteStateCache<S> = IncompleteStateCache::new();
        l1.transition(h(0), S::ShaderResource, 0);
        l1.transition(h(0), S::RenderTarget, 0);
        assert_eq!(l1.entries()[0].required_initial, S::ShaderResource);
        assert_eq!(l1.entries()[0].current, S::RenderTarget);

        let mut l2: IncompleteStateCache<S> = IncompleteStateCache::new();
        l2.transition(h(0), S::ShaderResource, 0);
        assert_eq!(l2.entries()[0].required_initial, S::ShaderResource);
        assert_eq!(l2.entries()[0].current, S::ShaderResource);

        let l1_transitions = stitch(l1.entries(), |r| master.read(r), |r, s| master.write(r, s));
        assert_eq!(l1_transitions.as_slice(), &[(h(0), S::CopyDest, S::ShaderResource)], "prelude for L1 only");
        assert_eq!(master.get(h(0)), S::RenderTarget, "master now reflects what L1 leaves it in");

        let l2_transitions = stitch(l2.entries(), |r| master.read(r), |r, s| master.write(r, s));
        assert_eq!(l2_transitions.as_slice(), &[(h(0), S::RenderTarget, S::ShaderResource)], "a second prelude is needed between L1 and L2");
        assert_eq!(master.get(h(0)), S::ShaderResource);
    }
}
