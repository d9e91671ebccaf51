//! Owns every buffer/texture allocation plus the master resource state
//! (§4.2), and injects swapchain backbuffers as pseudo-resources into a
//! reserved prefix of the handle space.
//!
//! Grounded in `original_source/d3d12/pools/resource_pool.cc/.hh`: one
//! native allocator (here, per-resource `CreateCommittedResource`, the
//! simplest of the several allocation strategies the original supports),
//! one pool of resource nodes, and `inject_backbuffer`/`free` semantics for
//! the backbuffer prefix matching spec.md §3's "Cyclic references" design
//! note.

use gfx_ral_core::format::Format;
use gfx_ral_core::handle::{Index, ResourceHandle};
use gfx_ral_core::pool::HandlePool;
use gfx_ral_core::resource_desc::{BufferDesc, RenderTargetDesc, TextureDesc};
use gfx_ral_core::state::{HeapKind, ResourceState, TextureDimension};
use gfx_ral_core::{Error, Result};
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::utils::{format_to_dxgi, heap_kind_to_dx12, state_to_dx12, ToRalError};

/// Indices below this are reserved for injected swapchain backbuffers
/// (spec.md §3's "reserved prefix"); real resource-pool allocations start
/// here. Sized generously, like [`gfx_ral_core::handle::QUEUE_INDEX_STEP`].
pub const BACKBUFFER_PREFIX_SIZE: Index = 64;

/// Raw pointer to a persistently-mapped upload/readback buffer. Valid to
/// share across threads: the HAL's contract (§5, "shared-resource policy")
/// is single-writer, externally synchronized by the application, not by
/// this wrapper.
#[derive(Clone, Copy)]
pub struct MappedPtr(pub *mut u8);
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

#[derive(Clone, Copy, Debug)]
pub struct BufferMeta {
    pub size_bytes: u64,
    pub stride_bytes: u32,
    pub gpu_va: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageMeta {
    pub format: Format,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub dimension: TextureDimension,
}

#[derive(Clone, Copy, Debug)]
pub enum ResourceKind {
    Buffer(BufferMeta),
    Image(ImageMeta),
}

pub struct ResourceNode {
    pub resource: ID3D12Resource,
    pub heap_kind: HeapKind,
    pub kind: ResourceKind,
    pub mapped: Option<MappedPtr>,
    /// The resource's state on the GPU timeline between command-list
    /// boundaries (§3, §4.2). A per-node lock, not a global one: concurrent
    /// submits touching unrelated resources never contend.
    pub master_state: Mutex<ResourceState>,
    /// `true` for a backbuffer injected by the swapchain pool; `free` on
    /// such a handle is a no-op until the swapchain itself releases it.
    pub is_injected_backbuffer: bool,
}

impl ResourceNode {
    pub fn read_master_state(&self) -> ResourceState {
        *self.master_state.lock()
    }

    pub fn write_master_state(&self, state: ResourceState) {
        *self.master_state.lock() = state;
    }
}

pub struct ResourcePool {
    device: ID3D12Device10,
    resources: Mutex<HandlePool<ResourceNode>>,
    backbuffers: Mutex<HandlePool<ResourceNode>>,
}

impl ResourcePool {
    pub fn new(device: ID3D12Device10, max_num_resources: u32, max_injected_backbuffers: u32) -> Self {
        Self {
            device,
            resources: Mutex::new(HandlePool::new(max_num_resources.max(1) as usize)),
            backbuffers: Mutex::new(HandlePool::new(max_injected_backbuffers.max(1) as usize)),
        }
    }

    /// Run `f` against the resource node named by `handle` while the pool's
    /// lock is held. Kept narrow (no escaping references) rather than
    /// exposing a raw `get`, since the shared slot storage backing
    /// [`HandlePool`] is only guaranteed stable while a lock is held against
    /// concurrent `acquire`/`release` of other slots (§4.1).
    pub fn with_node<R>(&self, handle: ResourceHandle, f: impl FnOnce(&ResourceNode) -> R) -> R {
        let idx = handle.index();
        if idx < BACKBUFFER_PREFIX_SIZE {
            f(self.backbuffers.lock().get(idx))
        } else {
            f(self.resources.lock().get(idx - BACKBUFFER_PREFIX_SIZE))
        }
    }

    pub fn create_buffer(&self, desc: BufferDesc) -> Result<ResourceHandle> {
        let (resource, mapped) = self.create_buffer_raw(desc.size_bytes, desc.heap, desc.allow_unordered_access)?;
        let gpu_va = unsafe { resource.GetGPUVirtualAddress() };
        let node = ResourceNode {
            resource,
            heap_kind: desc.heap,
            kind: ResourceKind::Buffer(BufferMeta { size_bytes: desc.size_bytes, stride_bytes: desc.stride_bytes, gpu_va }),
            mapped,
            master_state: Mutex::new(initial_state_for_heap(desc.heap)),
            is_injected_backbuffer: false,
        };
        let index = self.resources.lock().acquire(node);
        Ok(ResourceHandle::from_index(index + BACKBUFFER_PREFIX_SIZE))
    }

    pub fn create_mapped_buffer(&self, desc: BufferDesc) -> Result<(ResourceHandle, *mut u8)> {
        assert!(matches!(desc.heap, HeapKind::Upload | HeapKind::Readback), "create_mapped_buffer requires a CPU-visible heap");
        let handle = self.create_buffer(desc)?;
        let ptr = self.with_node(handle, |n| n.mapped.expect("CPU-visible heap must have produced a mapped pointer").0);
        Ok((handle, ptr))
    }

    /// Internal entry point used by the acceleration-structure pool to
    /// allocate its result/scratch/instance buffers directly (spec.md §4.2).
    pub(crate) fn create_buffer_raw(&self, size_bytes: u64, heap: HeapKind, allow_uav: bool) -> Result<(ID3D12Resource, Option<MappedPtr>)> {
        let heap_props = D3D12_HEAP_PROPERTIES { Type: heap_kind_to_dx12(heap), ..Default::default() };
        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if allow_uav {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }
        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: size_bytes,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: flags,
            ..Default::default()
        };
        // D3D12 requires upload-heap resources to start in GENERIC_READ and
        // readback-heap resources in COPY_DEST; neither maps onto a
        // cross-backend `ResourceState` variant, so this buffer-creation
        // path sets them directly rather than going through `state_to_dx12`.
        let initial_state = match heap {
            HeapKind::Gpu => state_to_dx12(ResourceState::Undefined),
            HeapKind::Upload => D3D12_RESOURCE_STATE_GENERIC_READ,
            HeapKind::Readback => D3D12_RESOURCE_STATE_COPY_DEST,
        };

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device
                .CreateCommittedResource(&heap_props, D3D12_HEAP_FLAG_NONE, &desc, initial_state, None, &mut resource)
                .map_err(|e| e.to_ral_error("CreateCommittedResource (buffer)"))?;
        }
        let resource = resource.ok_or_else(|| Error::Api { what: "CreateCommittedResource (buffer)", detail: "no resource returned".into() })?;

        let mapped = if matches!(heap, HeapKind::Upload | HeapKind::Readback) {
            let mut ptr = std::ptr::null_mut();
            unsafe { resource.Map(0, None, Some(&mut ptr)).map_err(|e| e.to_ral_error("ID3D12Resource::Map"))? };
            Some(MappedPtr(ptr as *mut u8))
        } else {
            None
        };

        Ok((resource, mapped))
    }

    pub fn create_texture(&self, desc: TextureDesc) -> Result<ResourceHandle> {
        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if desc.allow_unordered_access {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }
        if desc.allow_render_target {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
        }
        if desc.allow_depth_stencil {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
        }

        let dimension = match desc.dimension {
            TextureDimension::D1 => D3D12_RESOURCE_DIMENSION_TEXTURE1D,
            TextureDimension::D2 | TextureDimension::Cube => D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            TextureDimension::D3 => D3D12_RESOURCE_DIMENSION_TEXTURE3D,
        };

        let native_desc = D3D12_RESOURCE_DESC {
            Dimension: dimension,
            Width: desc.width as u64,
            Height: desc.height,
            DepthOrArraySize: desc.depth_or_array_size as u16,
            MipLevels: desc.mip_levels as u16,
            Format: format_to_dxgi(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: flags,
            ..Default::default()
        };

        let heap_props = D3D12_HEAP_PROPERTIES { Type: D3D12_HEAP_TYPE_DEFAULT, ..Default::default() };
        let initial_state = state_to_dx12(ResourceState::Undefined);

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device
                .CreateCommittedResource(&heap_props, D3D12_HEAP_FLAG_NONE, &native_desc, initial_state, None, &mut resource)
                .map_err(|e| e.to_ral_error("CreateCommittedResource (texture)"))?;
        }
        let resource = resource.ok_or_else(|| Error::Api { what: "CreateCommittedResource (texture)", detail: "no resource returned".into() })?;

        let node = ResourceNode {
            resource,
            heap_kind: HeapKind::Gpu,
            kind: ResourceKind::Image(ImageMeta {
                format: desc.format,
                mip_levels: desc.mip_levels,
                array_layers: desc.depth_or_array_size,
                dimension: desc.dimension,
            }),
            mapped: None,
            master_state: Mutex::new(ResourceState::Undefined),
            is_injected_backbuffer: false,
        };
        let index = self.resources.lock().acquire(node);
        Ok(ResourceHandle::from_index(index + BACKBUFFER_PREFIX_SIZE))
    }

    pub fn create_render_target(&self, desc: RenderTargetDesc) -> Result<ResourceHandle> {
        self.create_texture(TextureDesc {
            format: desc.format,
            width: desc.width,
            height: desc.height,
            depth_or_array_size: desc.array_size.max(1),
            mip_levels: 1,
            dimension: TextureDimension::D2,
            allow_unordered_access: false,
            allow_render_target: true,
            allow_depth_stencil: desc.format.is_depth_or_stencil(),
        })
    }

    pub fn free_resource(&self, handle: ResourceHandle) {
        let idx = handle.index();
        if idx < BACKBUFFER_PREFIX_SIZE {
            // No-op: backbuffer lifetime is owned by the swapchain pool
            // (spec.md §3 "Invariants").
            return;
        }
        self.resources.lock().release(idx - BACKBUFFER_PREFIX_SIZE);
    }

    /// Injects a swapchain backbuffer resource into the reserved prefix.
    /// Called only by `SwapchainPool`.
    pub fn inject_backbuffer(&self, resource: ID3D12Resource, format: Format, initial_state: ResourceState) -> ResourceHandle {
        let node = ResourceNode {
            resource,
            heap_kind: HeapKind::Gpu,
            kind: ResourceKind::Image(ImageMeta { format, mip_levels: 1, array_layers: 1, dimension: TextureDimension::D2 }),
            mapped: None,
            master_state: Mutex::new(initial_state),
            is_injected_backbuffer: true,
        };
        let index = self.backbuffers.lock().acquire(node);
        ResourceHandle::from_index(index)
    }

    /// Releases a previously injected backbuffer. Called only by
    /// `SwapchainPool` at teardown/resize, never by user code.
    pub fn release_injected_backbuffer(&self, handle: ResourceHandle) {
        assert!(handle.index() < BACKBUFFER_PREFIX_SIZE, "not a backbuffer handle");
        self.backbuffers.lock().release(handle.index());
    }

    pub fn leak_count(&self) -> usize {
        self.resources.lock().count_leaked() + self.backbuffers.lock().count_leaked()
    }
}

fn initial_state_for_heap(heap: HeapKind) -> ResourceState {
    match heap {
        HeapKind::Gpu => ResourceState::Undefined,
        HeapKind::Upload => ResourceState::Unknown,
        HeapKind::Readback => ResourceState::CopyDest,
    }
}
