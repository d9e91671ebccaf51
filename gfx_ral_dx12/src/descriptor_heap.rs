//! Descriptor heap wrappers: a lock-free free-list heap for transient
//! RTV/DSV views created by the translator (§4.7 step 4), and a page-based
//! shader-visible heap for the persistent SRV+UAV/sampler ranges a shader
//! view owns (§4.9).
//!
//! Grounded in `onca_ral_dx12::descriptors::RTVAndDSVDescriptorHeap` (the
//! atomic free-list heap) and `onca_ral_dx12::descriptors::DescriptorHeap`
//! (the shader-visible heap, here driving allocation through
//! [`gfx_ral_core::page_allocator::PageAllocator`] instead of a bump
//! pointer, per spec.md §4.9's page-based shader-view pool).

use std::sync::atomic::{AtomicU32, Ordering};

use gfx_ral_core::page_allocator::PageAllocator;
use gfx_ral_core::{Error, Result};
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;

/// Single-descriptor free-list heap, not shader visible. Transient RTVs
/// and DSVs are allocated and freed every frame by the translator, so this
/// avoids taking a lock on the hot path the way the shader-visible heap's
/// page allocator would.
pub struct RtvDsvHeap {
    _heap: ID3D12DescriptorHeap,
    heap_start: D3D12_CPU_DESCRIPTOR_HANDLE,
    next_free: Vec<AtomicU32>,
    head: AtomicU32,
    handle_size: u32,
    max_count: u32,
}

impl RtvDsvHeap {
    pub fn new(device: &ID3D12Device10, is_dsv: bool, max_count: u32) -> Result<Self> {
        use crate::utils::ToRalError;
        let heap_type = if is_dsv { D3D12_DESCRIPTOR_HEAP_TYPE_DSV } else { D3D12_DESCRIPTOR_HEAP_TYPE_RTV };
        let desc = D3D12_DESCRIPTOR_HEAP_DESC { Type: heap_type, NumDescriptors: max_count, Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE, NodeMask: 0 };
        let heap: ID3D12DescriptorHeap = unsafe { device.CreateDescriptorHeap(&desc) }.map_err(|e| e.to_ral_error("CreateDescriptorHeap (RTV/DSV)"))?;

        let next_free: Vec<AtomicU32> = (1..=max_count).map(AtomicU32::new).collect();
        let handle_size = unsafe { device.GetDescriptorHandleIncrementSize(heap_type) };
        let heap_start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };

        Ok(Self { _heap: heap, heap_start, next_free, head: AtomicU32::new(0), handle_size, max_count })
    }

    pub fn allocate(&self) -> Result<D3D12_CPU_DESCRIPTOR_HANDLE> {
        let mut idx = self.head.load(Ordering::Relaxed);
        loop {
            if idx == self.max_count {
                return Err(Error::PoolExhausted("RtvDsvHeap"));
            }
            let next = self.next_free[idx as usize].load(Ordering::Relaxed);
            match self.head.compare_exchange_weak(idx, next, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => break,
                Err(seen) => idx = seen,
            }
        }
        // Marks the slot occupied so `free` can assert against double-free.
        self.next_free[idx as usize].store(self.max_count, Ordering::Relaxed);
        Ok(D3D12_CPU_DESCRIPTOR_HANDLE { ptr: self.heap_start.ptr + idx as usize * self.handle_size as usize })
    }

    pub fn free(&self, handle: D3D12_CPU_DESCRIPTOR_HANDLE) {
        let offset = handle.ptr - self.heap_start.ptr;
        let index = (offset / self.handle_size as usize) as u32;
        assert!(index < self.max_count, "RtvDsvHeap::free: handle past end of heap");
        assert_eq!(self.next_free[index as usize].load(Ordering::Relaxed), self.max_count, "RtvDsvHeap::free: double free");

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            self.next_free[index as usize].store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(head, index, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => break,
                Err(seen) => head = seen,
            }
        }
    }
}

/// Shader-visible descriptor heap (CBV/SRV/UAV, or sampler), partitioned
/// into fixed-size pages by [`PageAllocator`]. A shader view claims one
/// page-run and writes its descriptors into it; freeing the view returns
/// the run to the allocator.
pub struct ShaderVisibleHeap {
    heap: ID3D12DescriptorHeap,
    cpu_start: D3D12_CPU_DESCRIPTOR_HANDLE,
    gpu_start: D3D12_GPU_DESCRIPTOR_HANDLE,
    handle_size: u32,
    pages: Mutex<PageAllocator>,
}

impl ShaderVisibleHeap {
    pub fn new(device: &ID3D12Device10, heap_type: D3D12_DESCRIPTOR_HEAP_TYPE, capacity: u32, page_size: u32) -> Result<Self> {
        use crate::utils::ToRalError;
        let desc = D3D12_DESCRIPTOR_HEAP_DESC { Type: heap_type, NumDescriptors: capacity, Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE, NodeMask: 0 };
        let heap: ID3D12DescriptorHeap = unsafe { device.CreateDescriptorHeap(&desc) }.map_err(|e| e.to_ral_error("CreateDescriptorHeap (shader-visible)"))?;
        let handle_size = unsafe { device.GetDescriptorHandleIncrementSize(heap_type) };
        let cpu_start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };
        let gpu_start = unsafe { heap.GetGPUDescriptorHandleForHeapStart() };
        Ok(Self { heap, cpu_start, gpu_start, handle_size, pages: Mutex::new(PageAllocator::new(capacity, page_size)) })
    }

    pub fn native_heap(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }

    /// Claim a run of `count` descriptors; returns the starting descriptor
    /// index (the allocator hands out page numbers, so this scales by
    /// `page_size` — `free` below does the matching inverse).
    pub fn allocate(&self, count: u32) -> Result<u32> {
        let page = self.pages.lock().allocate(count.max(1)).ok_or(Error::PoolExhausted("ShaderVisibleHeap"))?;
        Ok(page * self.page_size())
    }

    pub fn free(&self, start_index: u32) {
        let page = start_index / self.page_size();
        self.pages.lock().free(page);
    }

    pub fn page_size(&self) -> u32 {
        // PageAllocator reports this directly; kept as a thin forward so
        // callers doing index<->page math don't reach into `pages` twice.
        self.pages.lock().page_size()
    }

    pub fn cpu_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE { ptr: self.cpu_start.ptr + index as usize * self.handle_size as usize }
    }

    pub fn gpu_handle(&self, index: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        D3D12_GPU_DESCRIPTOR_HANDLE { ptr: self.gpu_start.ptr + index as u64 * self.handle_size as u64 }
    }

    pub fn handle_size(&self) -> u32 {
        self.handle_size
    }
}
