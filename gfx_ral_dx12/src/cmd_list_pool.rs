//! Command-list pool (§4.4), one per queue kind, each backed by one
//! [`CommandAllocatorBundle`] per thread.
//!
//! Grounded in `original_source/d3d12/pools/cmd_list_pool.hh/.cc`'s
//! `CommandListPool`: handle indices are partitioned by queue kind using
//! `mcIndexOffsetStep` (here [`QUEUE_INDEX_STEP`], the same constant
//! `crate::query_pool` partitions by query kind with), and the real list
//! object is opened against whichever allocator node the owning thread's
//! bundle currently has room for. Unlike the original's pre-created raw
//! list array, each `create` here makes a fresh `ID3D12GraphicsCommandList7`
//! — this backend's `HandlePool` already expects a value moved in at
//! `acquire` and out at `release`, same as every other pool in this crate,
//! so a list follows that shape too rather than living in a second,
//! index-aligned array.

use gfx_ral_core::handle::{CommandListHandle, Index, QUEUE_INDEX_STEP};
use gfx_ral_core::incomplete_state_cache::IncompleteStateCache;
use gfx_ral_core::pool::HandlePool;
use gfx_ral_core::state::{QueueKind, ResourceState};
use gfx_ral_core::{Error, Result};
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;

use crate::cmd_allocator_bundle::{CmdAllocatorNode, CommandAllocatorBundle};
use crate::utils::{queue_kind_to_dx12, ToRalError};

pub struct CmdListSlot {
    pub native: ID3D12GraphicsCommandList7,
    responsible_allocator: *const CmdAllocatorNode,
    pub state_cache: IncompleteStateCache<ResourceState>,
}

// Safety: `responsible_allocator` points into a `Box<[CmdAllocatorNode]>`
// owned by a `CommandAllocatorBundle` that outlives every list drawn from
// it (both live inside `CommandListPool`, dropped together); dereferencing
// it only ever calls `on_submit`/`on_discard`, which are safe to call from
// any thread by construction (see `cmd_allocator_bundle`).
unsafe impl Send for CmdListSlot {}

struct QueueListPool {
    list_type: D3D12_COMMAND_LIST_TYPE,
    bundles: Vec<CommandAllocatorBundle>,
    slots: Mutex<HandlePool<CmdListSlot>>,
}

pub struct CommandListPool {
    device: ID3D12Device10,
    queues: [QueueListPool; 3],
}

impl CommandListPool {
    pub fn new(device: ID3D12Device10, config: &gfx_ral_core::config::Config) -> Result<Self> {
        let make = |kind: QueueKind| -> Result<QueueListPool> {
            let cfg = config.cmdlists_for(kind);
            let list_type = queue_kind_to_dx12(kind);
            let mut bundles = Vec::with_capacity(config.num_threads.max(1) as usize);
            for _ in 0..config.num_threads.max(1) {
                bundles.push(CommandAllocatorBundle::new(&device, list_type, cfg.num_allocators_per_thread, cfg.num_cmdlists_per_allocator)?);
            }
            let capacity = (config.num_threads.max(1) * cfg.num_allocators_per_thread.max(1) * cfg.num_cmdlists_per_allocator.max(1)) as usize;
            Ok(QueueListPool { list_type, bundles, slots: Mutex::new(HandlePool::new(capacity)) })
        };
        Ok(Self { device: device.clone(), queues: [make(QueueKind::Direct)?, make(QueueKind::Compute)?, make(QueueKind::Copy)?] })
    }

    pub fn create(&self, kind: QueueKind, thread_index: u32) -> Result<CommandListHandle> {
        let queue = &self.queues[kind as u32 as usize];
        let bundle = queue.bundles.get(thread_index as usize).ok_or(Error::InvalidParameter(format!("thread index {thread_index} exceeds configured num_threads")))?;

        let mut native: Option<ID3D12GraphicsCommandList7> = None;
        unsafe {
            self.device
                .CreateCommandList1(0, queue.list_type, D3D12_COMMAND_LIST_FLAG_NONE, &mut native)
                .map_err(|e| e.to_ral_error("CreateCommandList1"))?;
        }
        let native = native.ok_or_else(|| Error::Api { what: "CreateCommandList1", detail: "no list returned".into() })?;

        let responsible_allocator = bundle.acquire_memory(&native);
        let slot = CmdListSlot { native, responsible_allocator, state_cache: IncompleteStateCache::new() };
        let index = queue.slots.lock().acquire(slot);
        Ok(CommandListHandle::from_index(index + QUEUE_INDEX_STEP * kind as u32))
    }

    pub fn with_slot_mut<R>(&self, handle: CommandListHandle, f: impl FnOnce(&mut CmdListSlot) -> R) -> R {
        let (kind, idx) = decode(handle);
        f(self.queues[kind as u32 as usize].slots.lock().get_mut(idx))
    }

    pub fn native_list(&self, handle: CommandListHandle) -> ID3D12GraphicsCommandList7 {
        let (kind, idx) = decode(handle);
        self.queues[kind as u32 as usize].slots.lock().get(idx).native.clone()
    }

    /// Releases the list's slot and notifies its allocator node that one
    /// more command list has been submitted on `queue`.
    pub fn free_on_submit(&self, handle: CommandListHandle, queue: &ID3D12CommandQueue) {
        let (kind, idx) = decode(handle);
        let slot = self.queues[kind as u32 as usize].slots.lock().release(idx);
        // Safety: see the `unsafe impl Send for CmdListSlot` note above.
        unsafe { (*slot.responsible_allocator).on_submit(queue) };
    }

    /// Releases the list's slot without ever having submitted it.
    pub fn free_on_discard(&self, handle: CommandListHandle) {
        let (kind, idx) = decode(handle);
        let slot = self.queues[kind as u32 as usize].slots.lock().release(idx);
        unsafe { (*slot.responsible_allocator).on_discard() };
    }

    pub fn leak_count(&self) -> usize {
        self.queues.iter().map(|q| q.slots.lock().count_leaked()).sum()
    }
}

fn decode(handle: CommandListHandle) -> (QueueKind, Index) {
    let idx = handle.index();
    let kind_ord = idx / QUEUE_INDEX_STEP;
    let local = idx % QUEUE_INDEX_STEP;
    let kind = match kind_ord {
        0 => QueueKind::Direct,
        1 => QueueKind::Compute,
        2 => QueueKind::Copy,
        other => panic!("corrupt command-list handle: unknown queue ordinal {other}"),
    };
    (kind, local)
}
