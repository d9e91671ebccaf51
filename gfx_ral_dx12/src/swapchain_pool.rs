//! Swapchain pool (§3 "Swapchain", §7 "Presentation failure").
//!
//! Grounded in `original_source/d3d12/pools/swapchain_pool.hh/.cc`: one
//! `IDXGISwapChain3` per swapchain, a fixed backbuffer ring (capped at 6,
//! same as the original's `capped_array<backbuffer, 6>`), one present fence
//! per backbuffer, and backbuffer resources injected into
//! [`crate::resource_pool::ResourcePool`]'s reserved prefix rather than
//! tracked here directly, per spec.md §3's "Cyclic references" design note.
//!
//! The backbuffer format is fixed at `DXGI_FORMAT_B8G8R8A8_UNORM`: the
//! original's comment notes the `_SRGB` variant crashes at
//! `CreateSwapChainForHwnd`, and this backend keeps that constraint.

use gfx_ral_core::format::Format;
use gfx_ral_core::handle::{ResourceHandle, SwapchainHandle};
use gfx_ral_core::pool::HandlePool;
use gfx_ral_core::state::{PresentMode, ResourceState};
use gfx_ral_core::Result;
use parking_lot::Mutex;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::descriptor_heap::RtvDsvHeap;
use crate::resource_pool::ResourcePool;
use crate::utils::ToRalError;

/// The only backbuffer format this backend hands out; matches the original's
/// `gc_pool_backbuffer_format`.
const BACKBUFFER_FORMAT: DXGI_FORMAT = DXGI_FORMAT_B8G8R8A8_UNORM;

const MAX_BACKBUFFERS: usize = 6;

struct PresentFence {
    fence: ID3D12Fence,
    event: HANDLE,
    value: u64,
}

impl PresentFence {
    fn new(device: &ID3D12Device10) -> Result<Self> {
        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }.map_err(|e| e.to_ral_error("CreateFence (present)"))?;
        let event = unsafe { CreateEventA(None, false, false, None) }.map_err(|e| e.to_ral_error("CreateEventA"))?;
        Ok(Self { fence, event, value: 0 })
    }

    fn signal(&mut self, queue: &ID3D12CommandQueue) {
        self.value += 1;
        unsafe { queue.Signal(&self.fence, self.value) }.expect("ID3D12CommandQueue::Signal failed");
    }

    /// Blocks until the GPU has finished presenting from this backbuffer.
    fn wait_cpu(&self) {
        if unsafe { self.fence.GetCompletedValue() } >= self.value {
            return;
        }
        unsafe { self.fence.SetEventOnCompletion(self.value, self.event) }.expect("ID3D12Fence::SetEventOnCompletion failed");
        unsafe { WaitForSingleObject(self.event, INFINITE) };
    }
}

impl Drop for PresentFence {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.event);
        }
    }
}

// Safety: HANDLE is a plain Win32 handle; the HAL's contract (§5) is
// single-writer, externally synchronized by the application.
unsafe impl Send for PresentFence {}

struct BackbufferSlot {
    resource: ResourceHandle,
    rtv: D3D12_CPU_DESCRIPTOR_HANDLE,
    fence: PresentFence,
}

struct SwapchainNode {
    swapchain: IDXGISwapChain3,
    width: u32,
    height: u32,
    mode: PresentMode,
    has_resized: bool,
    backbuffers: Vec<BackbufferSlot>,
}

pub struct SwapchainPool<'a> {
    device: ID3D12Device10,
    factory: IDXGIFactory6,
    present_queue: ID3D12CommandQueue,
    resources: &'a ResourcePool,
    rtv_heap: RtvDsvHeap,
    num_backbuffers: u32,
    swapchains: Mutex<HandlePool<SwapchainNode>>,
}

impl<'a> SwapchainPool<'a> {
    pub fn new(
        device: ID3D12Device10,
        factory: IDXGIFactory6,
        present_queue: ID3D12CommandQueue,
        resources: &'a ResourcePool,
        num_backbuffers: u32,
        max_num_swapchains: u32,
    ) -> Result<Self> {
        assert!((1..=MAX_BACKBUFFERS as u32).contains(&num_backbuffers), "num_backbuffers must be in 1..=6");
        let rtv_heap = RtvDsvHeap::new(&device, false, max_num_swapchains.max(1) * num_backbuffers)?;
        Ok(Self {
            device,
            factory,
            present_queue,
            resources,
            rtv_heap,
            num_backbuffers,
            swapchains: Mutex::new(HandlePool::new(max_num_swapchains.max(1) as usize)),
        })
    }

    pub fn backbuffer_format(&self) -> Format {
        Format::Bgra8Unorm
    }

    pub fn create(&self, window: gfx_ral_core::WindowHandle, width: u32, height: u32, mode: PresentMode) -> Result<SwapchainHandle> {
        let hwnd = HWND(window.0 as *mut _);

        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: BACKBUFFER_FORMAT,
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: self.num_backbuffers,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Flags: swapchain_flags(mode).0 as u32,
            ..Default::default()
        };

        let swapchain1 = unsafe { self.factory.CreateSwapChainForHwnd(&self.present_queue, hwnd, &desc, None, None) }.map_err(|e| e.to_ral_error("CreateSwapChainForHwnd"))?;
        let swapchain: IDXGISwapChain3 = swapchain1.cast().map_err(|e| e.to_ral_error("IDXGISwapChain1::cast to IDXGISwapChain3"))?;

        unsafe { self.factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_WINDOW_CHANGES) }.map_err(|e| e.to_ral_error("IDXGIFactory::MakeWindowAssociation"))?;

        let mut node = SwapchainNode { swapchain, width, height, mode, has_resized: false, backbuffers: Vec::new() };
        self.populate_backbuffers(&mut node)?;

        let index = self.swapchains.lock().acquire(node);
        Ok(SwapchainHandle::from_index(index))
    }

    pub fn free(&self, handle: SwapchainHandle) {
        let node = self.swapchains.lock().release(handle.index());
        self.release_backbuffers(&node);
    }

    pub fn resize(&self, handle: SwapchainHandle, width: u32, height: u32) -> Result<()> {
        let mut pool = self.swapchains.lock();
        let node = pool.get_mut(handle.index());
        node.width = width;
        node.height = height;
        node.has_resized = true;

        // The backbuffers must be released before `ResizeBuffers`; a known
        // D3D12 validation-layer deadlock occurs if they are still
        // referenced (same workaround the original applies).
        self.release_backbuffer_resources(node);
        unsafe { node.swapchain.ResizeBuffers(self.num_backbuffers, width, height, BACKBUFFER_FORMAT, swapchain_flags(node.mode)) }
            .map_err(|e| e.to_ral_error("IDXGISwapChain3::ResizeBuffers"))?;
        self.populate_backbuffers(node)
    }

    /// `true` exactly once after a presentation failure signaled the need to
    /// resize; clears the flag on read (§7).
    pub fn clear_resize_flag(&self, handle: SwapchainHandle) -> bool {
        let mut pool = self.swapchains.lock();
        let node = pool.get_mut(handle.index());
        if !node.has_resized {
            return false;
        }
        node.has_resized = false;
        true
    }

    /// Waits for the GPU to be done with the backbuffer about to be reused,
    /// then returns its injected resource handle.
    pub fn acquire_backbuffer(&self, handle: SwapchainHandle) -> Result<ResourceHandle> {
        let pool = self.swapchains.lock();
        let node = pool.get(handle.index());
        let index = unsafe { node.swapchain.GetCurrentBackBufferIndex() } as usize;
        node.backbuffers[index].fence.wait_cpu();
        Ok(node.backbuffers[index].resource)
    }

    pub fn present(&self, handle: SwapchainHandle) -> Result<()> {
        let mut pool = self.swapchains.lock();
        let node = pool.get_mut(handle.index());
        let flags = if node.mode.requires_tearing_flag() { DXGI_PRESENT_ALLOW_TEARING } else { 0 };
        unsafe { node.swapchain.Present(0, flags) }.ok().map_err(|e| e.to_ral_error("IDXGISwapChain3::Present"))?;

        let index = unsafe { node.swapchain.GetCurrentBackBufferIndex() } as usize;
        node.backbuffers[index].fence.signal(&self.present_queue);
        Ok(())
    }

    pub fn leak_count(&self) -> usize {
        self.swapchains.lock().count_leaked()
    }

    /// Fetches the native resources for the ring and creates RTVs + injects
    /// each into the resource pool, replacing `node.backbuffers`.
    fn populate_backbuffers(&self, node: &mut SwapchainNode) -> Result<()> {
        let mut backbuffers = Vec::with_capacity(self.num_backbuffers as usize);
        for i in 0..self.num_backbuffers {
            let resource: ID3D12Resource = unsafe { node.swapchain.GetBuffer(i) }.map_err(|e| e.to_ral_error("IDXGISwapChain3::GetBuffer"))?;
            let rtv = self.rtv_heap.allocate()?;
            unsafe { self.device.CreateRenderTargetView(&resource, None, rtv) };
            let resource_handle = self.resources.inject_backbuffer(resource, Format::Bgra8Unorm, ResourceState::Present);
            backbuffers.push(BackbufferSlot { resource: resource_handle, rtv, fence: PresentFence::new(&self.device)? });
        }
        node.backbuffers = backbuffers;
        Ok(())
    }

    fn release_backbuffer_resources(&self, node: &mut SwapchainNode) {
        for bb in node.backbuffers.drain(..) {
            self.resources.release_injected_backbuffer(bb.resource);
            self.rtv_heap.free(bb.rtv);
        }
    }

    fn release_backbuffers(&self, node: &SwapchainNode) {
        for bb in &node.backbuffers {
            self.resources.release_injected_backbuffer(bb.resource);
            self.rtv_heap.free(bb.rtv);
        }
    }
}

fn swapchain_flags(mode: PresentMode) -> DXGI_SWAP_CHAIN_FLAG {
    if mode.requires_tearing_flag() {
        DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING
    } else {
        DXGI_SWAP_CHAIN_FLAG(0)
    }
}
