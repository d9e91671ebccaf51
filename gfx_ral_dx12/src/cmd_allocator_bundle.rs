//! Per-thread, per-queue command-allocator rotation (§4.3).
//!
//! Grounded in `original_source/d3d12/pools/cmd_list_pool.hh/.cc`:
//! `cmd_allocator_node` tracks how many command lists are outstanding
//! against its native `ID3D12CommandAllocator` and whether the allocator can
//! safely be reset yet; `CommandAllocatorBundle` rotates through a small set
//! of nodes, trying a non-blocking reset pass first and only falling back to
//! a blocking wait if every node in the bundle is still full.
//!
//! A node's `num_in_flight`/`full_and_waiting` bookkeeping is touched only
//! by the thread that owns the bundle (`acquire_memory`), while
//! `submit_counter`/`num_discarded` are touched by whichever thread submits
//! or discards a list drawn from this node — potentially a different
//! thread. All five fields are therefore atomics rather than behind a lock:
//! cheaper than a per-node mutex, and it keeps the ownership split explicit.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use windows::Win32::Graphics::Direct3D12::*;

use crate::utils::ToRalError;

/// Pure form of the invariant in §8: `can_reset ⟺ full-and-waiting ∧
/// (submit_counter − submit_counter_at_last_reset) == (in_flight −
/// discarded)`. Free of any native type so it can be driven by a fake
/// fence/counters in tests instead of a real `ID3D12Fence`.
fn counters_up_to_date(submit_counter: u64, submit_counter_at_last_reset: u64, num_in_flight: u32, num_discarded: u32) -> bool {
    let submits_since_reset = submit_counter - submit_counter_at_last_reset;
    let accounted_for = num_in_flight as u64 - num_discarded as u64;
    submits_since_reset == accounted_for
}

fn fence_has_caught_up(fence_completed: u64, target: u64) -> bool {
    fence_completed >= target
}

/// A fence private to one allocator node, distinct from the pool-level
/// `FencePool` a user creates through the `Backend` trait — this one exists
/// purely to let the node know when the GPU has finished with the command
/// lists drawn from its allocator.
struct NodeFence {
    fence: ID3D12Fence,
}

impl NodeFence {
    fn new(device: &ID3D12Device10) -> gfx_ral_core::Result<Self> {
        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }.map_err(|e| e.to_ral_error("CreateFence (cmd allocator)"))?;
        Ok(Self { fence })
    }

    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn signal_gpu(&self, queue: &ID3D12CommandQueue, value: u64) {
        unsafe { queue.Signal(&self.fence, value) }.expect("ID3D12CommandQueue::Signal failed");
    }
}

pub struct CmdAllocatorNode {
    allocator: ID3D12CommandAllocator,
    fence: NodeFence,
    submit_counter: AtomicU64,
    submit_counter_at_last_reset: AtomicU64,
    num_in_flight: AtomicU32,
    num_discarded: AtomicU32,
    max_in_flight: u32,
    full_and_waiting: AtomicBool,
}

impl CmdAllocatorNode {
    fn new(device: &ID3D12Device10, list_type: D3D12_COMMAND_LIST_TYPE, max_in_flight: u32) -> gfx_ral_core::Result<Self> {
        let allocator: ID3D12CommandAllocator = unsafe { device.CreateCommandAllocator(list_type) }.map_err(|e| e.to_ral_error("CreateCommandAllocator"))?;
        Ok(Self {
            allocator,
            fence: NodeFence::new(device)?,
            submit_counter: AtomicU64::new(0),
            submit_counter_at_last_reset: AtomicU64::new(0),
            num_in_flight: AtomicU32::new(0),
            num_discarded: AtomicU32::new(0),
            max_in_flight,
            full_and_waiting: AtomicBool::new(false),
        })
    }

    fn is_full(&self) -> bool {
        self.num_in_flight.load(Ordering::Relaxed) >= self.max_in_flight
    }

    /// Whether every command list this node handed out has either been
    /// submitted (and its submit accounted for) or discarded — i.e. there is
    /// nothing left for the GPU to still be working through when the fence
    /// catches up to `submit_counter`.
    fn is_submit_counter_up_to_date(&self) -> bool {
        counters_up_to_date(
            self.submit_counter.load(Ordering::Acquire),
            self.submit_counter_at_last_reset.load(Ordering::Relaxed),
            self.num_in_flight.load(Ordering::Relaxed),
            self.num_discarded.load(Ordering::Acquire),
        )
    }

    fn can_reset(&self) -> bool {
        self.full_and_waiting.load(Ordering::Relaxed) && self.is_submit_counter_up_to_date()
    }

    fn do_reset(&self) {
        unsafe { self.allocator.Reset() }.expect("ID3D12CommandAllocator::Reset failed");
        self.full_and_waiting.store(false, Ordering::Relaxed);
        self.num_in_flight.store(0, Ordering::Relaxed);
        self.num_discarded.store(0, Ordering::Relaxed);
        self.submit_counter_at_last_reset.store(self.submit_counter.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Non-blocking: resets and returns `true` if the fence has already
    /// caught up; returns `false` (without resetting) if the node isn't
    /// full yet, or is full but the GPU isn't done with it.
    fn try_reset(&self) -> bool {
        if !self.full_and_waiting.load(Ordering::Relaxed) {
            return true;
        }
        if !self.is_submit_counter_up_to_date() {
            return false;
        }
        if !fence_has_caught_up(self.fence.completed_value(), self.submit_counter.load(Ordering::Relaxed)) {
            return false;
        }
        self.do_reset();
        true
    }

    /// Blocks on the node's fence until it can be reset. Only called once
    /// every other node in the bundle has failed a non-blocking pass.
    fn try_reset_blocking(&self, event: windows::Win32::Foundation::HANDLE) -> bool {
        if !self.can_reset() {
            return false;
        }
        let target = self.submit_counter.load(Ordering::Relaxed);
        if !fence_has_caught_up(self.fence.completed_value(), target) {
            unsafe { self.fence.fence.SetEventOnCompletion(target, event) }.expect("ID3D12Fence::SetEventOnCompletion failed");
            unsafe { windows::Win32::System::Threading::WaitForSingleObject(event, windows::Win32::System::Threading::INFINITE) };
        }
        self.do_reset();
        true
    }

    /// Resets `list` against this node's allocator, assumes ownership of one
    /// more outstanding command list.
    fn acquire(&self, list: &ID3D12GraphicsCommandList7) {
        unsafe { list.Reset(&self.allocator, None) }.expect("ID3D12GraphicsCommandList::Reset failed");
        let in_flight = self.num_in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        if in_flight >= self.max_in_flight {
            self.full_and_waiting.store(true, Ordering::Relaxed);
        }
    }

    /// Called by whichever thread submits a command list drawn from this
    /// node; bumps the fence value the node waits for before it can reset.
    pub fn on_submit(&self, queue: &ID3D12CommandQueue) {
        let value = self.submit_counter.fetch_add(1, Ordering::AcqRel) + 1;
        self.fence.signal_gpu(queue, value);
    }

    /// Called when a recorded-but-never-submitted list is discarded; counts
    /// against the submit budget the same way a submit would, without ever
    /// touching the GPU fence.
    pub fn on_discard(&self) {
        self.num_discarded.fetch_add(1, Ordering::AcqRel);
    }
}

/// A small ring of [`CmdAllocatorNode`]s for one thread, one queue kind.
/// Unsynchronized by design: exactly one thread (the one that calls
/// `ThreadAssociation::current_index()` to find this bundle) ever calls
/// `acquire_memory`.
pub struct CommandAllocatorBundle {
    nodes: Box<[CmdAllocatorNode]>,
    active_index: std::cell::Cell<usize>,
    wait_event: windows::Win32::Foundation::HANDLE,
}

// Safety: every mutating method requires the owning-thread contract
// documented on the type; the wait event is a plain kernel handle.
unsafe impl Send for CommandAllocatorBundle {}
unsafe impl Sync for CommandAllocatorBundle {}

impl CommandAllocatorBundle {
    pub fn new(device: &ID3D12Device10, list_type: D3D12_COMMAND_LIST_TYPE, num_allocators: u32, max_cmdlists_per_allocator: u32) -> gfx_ral_core::Result<Self> {
        let mut nodes = Vec::with_capacity(num_allocators.max(1) as usize);
        for _ in 0..num_allocators.max(1) {
            nodes.push(CmdAllocatorNode::new(device, list_type, max_cmdlists_per_allocator.max(1))?);
        }
        let wait_event = unsafe { windows::Win32::System::Threading::CreateEventA(None, false, false, None) }.map_err(|e| e.to_ral_error("CreateEventA"))?;
        Ok(Self { nodes: nodes.into_boxed_slice(), active_index: std::cell::Cell::new(0), wait_event })
    }

    /// Resets `list` against whichever node in this bundle has room. Stays
    /// on the currently active node as long as it isn't full (or a
    /// non-blocking reset frees it back up); only rotates to the next node
    /// once the active one is full and its non-blocking reset fails. Falls
    /// back to a blocking reset, starting from the same active node, if the
    /// whole ring is still busy. Returns the node `list` is now bound to,
    /// so the caller can stash it for later `on_submit`/`on_discard`.
    pub fn acquire_memory(&self, list: &ID3D12GraphicsCommandList7) -> *const CmdAllocatorNode {
        let start = self.active_index.get();
        let n = self.nodes.len();

        for i in 0..n {
            let idx = (start + i) % n;
            if !self.nodes[idx].is_full() || self.nodes[idx].try_reset() {
                self.active_index.set(idx);
                self.nodes[idx].acquire(list);
                return &self.nodes[idx];
            }
        }

        for i in 0..n {
            let idx = (start + i) % n;
            if self.nodes[idx].try_reset_blocking(self.wait_event) {
                self.active_index.set(idx);
                self.nodes[idx].acquire(list);
                return &self.nodes[idx];
            }
        }

        panic!("CommandAllocatorBundle exhausted: every allocator node is full and its fence never caught up; increase num_cmdlists_per_allocator or num_allocators_per_thread");
    }
}

impl Drop for CommandAllocatorBundle {
    fn drop(&mut self) {
        unsafe {
            let _ = windows::Win32::Foundation::CloseHandle(self.wait_event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain-data mirror of [`CmdAllocatorNode`]'s bookkeeping, with a fake
    /// fence (just the last value it was signaled to) standing in for
    /// `ID3D12Fence` — exercises the exact reset-decision logic from
    /// [`counters_up_to_date`]/[`fence_has_caught_up`] without any native
    /// allocator or command list.
    struct NodeState {
        submit_counter: u64,
        submit_counter_at_last_reset: u64,
        num_in_flight: u32,
        num_discarded: u32,
        max_in_flight: u32,
        full_and_waiting: bool,
        fake_fence_completed: u64,
    }

    impl NodeState {
        fn new(max_in_flight: u32) -> Self {
            Self { submit_counter: 0, submit_counter_at_last_reset: 0, num_in_flight: 0, num_discarded: 0, max_in_flight, full_and_waiting: false, fake_fence_completed: 0 }
        }

        fn is_submit_counter_up_to_date(&self) -> bool {
            counters_up_to_date(self.submit_counter, self.submit_counter_at_last_reset, self.num_in_flight, self.num_discarded)
        }

        fn is_full(&self) -> bool {
            self.num_in_flight >= self.max_in_flight
        }

        fn acquire(&mut self) {
            self.num_in_flight += 1;
            if self.num_in_flight >= self.max_in_flight {
                self.full_and_waiting = true;
            }
        }

        fn on_submit(&mut self) {
            self.submit_counter += 1;
        }

        /// Simulates the GPU finishing work signaled up to `value`.
        fn fake_gpu_advances_to(&mut self, value: u64) {
            self.fake_fence_completed = value;
        }

        fn try_reset(&mut self) -> bool {
            if !self.full_and_waiting {
                return true;
            }
            if !self.is_submit_counter_up_to_date() {
                return false;
            }
            if !fence_has_caught_up(self.fake_fence_completed, self.submit_counter) {
                return false;
            }
            self.full_and_waiting = false;
            self.num_in_flight = 0;
            self.num_discarded = 0;
            self.submit_counter_at_last_reset = self.submit_counter;
            true
        }
    }

    /// §8 invariant: `can_reset ⟺ full-and-waiting ∧ (submit_counter −
    /// submit_counter_at_last_reset) == (in_flight − discarded)`.
    #[test]
    fn counters_up_to_date_matches_the_invariant() {
        assert!(counters_up_to_date(3, 0, 3, 0), "3 submits accounted for by 3 in-flight, 0 discarded");
        assert!(!counters_up_to_date(2, 0, 3, 0), "one of the 3 in-flight lists hasn't been submitted yet");
        assert!(counters_up_to_date(2, 0, 3, 1), "1 discarded brings the accounted-for count back to 2");
    }

    #[test]
    fn try_reset_is_noop_when_not_full() {
        let mut node = NodeState::new(3);
        node.acquire();
        assert!(node.try_reset(), "a node that never filled up is trivially resettable");
        assert_eq!(node.num_in_flight, 1, "try_reset on a non-full node does not touch its counters");
    }

    #[test]
    fn try_reset_fails_until_fence_catches_up() {
        let mut node = NodeState::new(2);
        node.acquire();
        node.acquire();
        node.on_submit();
        node.on_submit();
        assert!(node.full_and_waiting);

        assert!(!node.try_reset(), "fence hasn't signaled either submit yet");
        node.fake_gpu_advances_to(1);
        assert!(!node.try_reset(), "fence caught up to the first submit only");
        node.fake_gpu_advances_to(2);
        assert!(node.try_reset(), "fence now covers both submits");
        assert!(!node.full_and_waiting);
        assert_eq!(node.num_in_flight, 0);
    }

    /// §8 scenario 4: bundle has 2 allocator nodes × 3 lists each. Acquire 3
    /// lists from node 0, submit all 3. Acquire 3 lists from node 1, submit
    /// all 3. Acquiring the 7th list: node 0 is resettable (its fence
    /// reached), so it comes from node 0.
    #[test]
    fn scenario_4_allocator_recycle() {
        let mut nodes = [NodeState::new(3), NodeState::new(3)];
        let mut active = 0usize;

        let mut acquire = |nodes: &mut [NodeState; 2], active: &mut usize| -> usize {
            let start = *active;
            for i in 0..nodes.len() {
                let idx = (start + i) % nodes.len();
                if !nodes[idx].is_full() || nodes[idx].try_reset() {
                    *active = idx;
                    nodes[idx].acquire();
                    return idx;
                }
            }
            panic!("bundle exhausted");
        };

        for _ in 0..3 {
            let idx = acquire(&mut nodes, &mut active);
            assert_eq!(idx, 0, "first 3 acquires land on node 0");
        }
        nodes[0].on_submit();
        nodes[0].on_submit();
        nodes[0].on_submit();
        assert!(nodes[0].full_and_waiting);

        for _ in 0..3 {
            let idx = acquire(&mut nodes, &mut active);
            assert_eq!(idx, 1, "node 0 is full, so the next 3 acquires rotate to node 1");
        }
        nodes[1].on_submit();
        nodes[1].on_submit();
        nodes[1].on_submit();
        assert!(nodes[1].full_and_waiting);

        // Node 0's fence catches up while node 1 is still outstanding.
        nodes[0].fake_gpu_advances_to(3);

        let seventh = acquire(&mut nodes, &mut active);
        assert_eq!(seventh, 0, "node 0 is resettable once its fence reaches its submit count, so the 7th list comes from node 0");
    }
}
