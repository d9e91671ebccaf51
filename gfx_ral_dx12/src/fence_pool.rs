//! CPU/GPU-signalable fence pool (§3, §4 "Fence").
//!
//! Grounded in `onca_ral_dx12::fence::Fence`: one `ID3D12Fence` plus one
//! Win32 event handle per fence, `SetEventOnCompletion` + `WaitForSingleObject`
//! for the blocking CPU wait.

use gfx_ral_core::handle::FenceHandle;
use gfx_ral_core::pool::HandlePool;
use gfx_ral_core::Result;
use parking_lot::Mutex;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D12::{ID3D12Device10, ID3D12Fence, D3D12_FENCE_FLAG_NONE};
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::utils::ToRalError;

struct FenceNode {
    fence: ID3D12Fence,
    event: HANDLE,
}

impl Drop for FenceNode {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.event);
        }
    }
}

// Safety: HANDLE is a plain Win32 handle; FenceNode's contract (§5) is that
// callers externally synchronize access to a given fence, same as every
// other pool here.
unsafe impl Send for FenceNode {}

pub struct FencePool {
    fences: Mutex<HandlePool<FenceNode>>,
}

impl FencePool {
    pub fn new(max_num_fences: u32) -> Self {
        Self { fences: Mutex::new(HandlePool::new(max_num_fences.max(1) as usize)) }
    }

    pub fn create(&self, device: &ID3D12Device10) -> Result<FenceHandle> {
        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }.map_err(|e| e.to_ral_error("CreateFence"))?;
        let event = unsafe { CreateEventA(None, false, false, None) }.map_err(|e| e.to_ral_error("CreateEventA"))?;
        let index = self.fences.lock().acquire(FenceNode { fence, event });
        Ok(FenceHandle::from_index(index))
    }

    pub fn free(&self, handle: FenceHandle) {
        self.fences.lock().release(handle.index());
    }

    pub fn get_value(&self, handle: FenceHandle) -> u64 {
        with_fence(&self.fences, handle, |n| unsafe { n.fence.GetCompletedValue() })
    }

    pub fn signal_cpu(&self, handle: FenceHandle, value: u64) {
        with_fence(&self.fences, handle, |n| {
            unsafe { n.fence.Signal(value) }.expect("ID3D12Fence::Signal failed");
        });
    }

    /// Blocking CPU wait until the fence reaches `value`.
    pub fn wait_cpu(&self, handle: FenceHandle, value: u64) {
        with_fence(&self.fences, handle, |n| {
            if unsafe { n.fence.GetCompletedValue() } >= value {
                return;
            }
            unsafe { n.fence.SetEventOnCompletion(value, n.event) }.expect("ID3D12Fence::SetEventOnCompletion failed");
            let result = unsafe { WaitForSingleObject(n.event, INFINITE) };
            assert!(result != WAIT_FAILED && result != WAIT_TIMEOUT, "fence wait failed or timed out unexpectedly");
        });
    }

    /// GPU-side signal, used by the allocator bundle to mark submission
    /// (`cmd_allocator_node::on_submit`).
    pub fn signal_gpu(&self, handle: FenceHandle, queue: &windows::Win32::Graphics::Direct3D12::ID3D12CommandQueue, value: u64) {
        with_fence(&self.fences, handle, |n| {
            unsafe { queue.Signal(&n.fence, value) }.expect("ID3D12CommandQueue::Signal failed");
        });
    }

    pub fn native(&self, handle: FenceHandle) -> ID3D12Fence {
        with_fence(&self.fences, handle, |n| n.fence.clone())
    }

    pub fn leak_count(&self) -> usize {
        self.fences.lock().count_leaked()
    }
}

fn with_fence<R>(fences: &Mutex<HandlePool<FenceNode>>, handle: FenceHandle, f: impl FnOnce(&FenceNode) -> R) -> R {
    f(fences.lock().get(handle.index()))
}
