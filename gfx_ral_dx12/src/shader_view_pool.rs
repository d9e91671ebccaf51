//! Shader-view pool (§4.8, §4.9): bound-together SRV/UAV and sampler
//! descriptor ranges, the unit a `BindShaderArguments` command points at.
//!
//! Grounded in `original_source/d3d12/pools/shader_view_pool.hh`'s
//! `ShaderViewPool`/`DescriptorPageAllocator`: one page-allocated range in
//! the shader-visible CBV/SRV/UAV heap, one in the shader-visible sampler
//! heap, either of which may be empty for a given view (§8 boundary case).

use gfx_ral_core::handle::{AccelStructHandle, Index, ShaderViewHandle};
use gfx_ral_core::pool::HandlePool;
use gfx_ral_core::resource_desc::{ResourceViewDesc, SamplerDesc, ShaderViewDesc};
use gfx_ral_core::state::TextureDimension;
use gfx_ral_core::Result;
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN;

use crate::accel_struct_pool::AccelStructPool;
use crate::descriptor_heap::ShaderVisibleHeap;
use crate::resource_pool::{ResourceKind, ResourcePool};
use crate::utils::{address_mode_to_dx12, filter_to_dx12, format_to_dxgi};

struct ShaderViewNode {
    srv_uav_start: Option<u32>,
    num_srv_uav: u32,
    sampler_start: Option<u32>,
    num_samplers: u32,
}

pub struct ShaderViewPool<'a> {
    device: ID3D12Device10,
    resources: &'a ResourcePool,
    accel_structs: &'a AccelStructPool<'a>,
    srv_uav_heap: ShaderVisibleHeap,
    sampler_heap: ShaderVisibleHeap,
    views: Mutex<HandlePool<ShaderViewNode>>,
}

impl<'a> ShaderViewPool<'a> {
    pub fn new(
        device: ID3D12Device10,
        resources: &'a ResourcePool,
        accel_structs: &'a AccelStructPool<'a>,
        max_num_srvs_uavs: u32,
        max_num_samplers: u32,
        page_size: u32,
        max_num_shader_views: u32,
    ) -> Result<Self> {
        let srv_uav_heap = ShaderVisibleHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, max_num_srvs_uavs, page_size)?;
        let sampler_heap = ShaderVisibleHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER, max_num_samplers, page_size)?;
        Ok(Self { device, resources, accel_structs, srv_uav_heap, sampler_heap, views: Mutex::new(HandlePool::new(max_num_shader_views.max(1) as usize)) })
    }

    pub fn create(&self, desc: &ShaderViewDesc) -> Result<ShaderViewHandle> {
        let srv_uavs = &desc.srv_uavs;
        let samplers = &desc.samplers;

        let srv_uav_start = if srv_uavs.is_empty() { None } else { Some(self.srv_uav_heap.allocate(srv_uavs.len() as u32)?) };
        if let Some(start) = srv_uav_start {
            for (i, view) in srv_uavs.iter().enumerate() {
                self.write_srv_uav(start + i as u32, view);
            }
        }

        let sampler_start = if samplers.is_empty() { None } else { Some(self.sampler_heap.allocate(samplers.len() as u32)?) };
        if let Some(start) = sampler_start {
            for (i, sampler) in samplers.iter().enumerate() {
                self.write_sampler(start + i as u32, sampler);
            }
        }

        let node = ShaderViewNode { srv_uav_start, num_srv_uav: srv_uavs.len() as u32, sampler_start, num_samplers: samplers.len() as u32 };
        let index = self.views.lock().acquire(node);
        Ok(ShaderViewHandle::from_index(index))
    }

    /// Overwrites `views.len()` SRV/UAV descriptors starting at `offset`
    /// within an already-created view's range (§4.8 partial update).
    pub fn write_srvs_uavs(&self, view: ShaderViewHandle, offset: u32, views: &[ResourceViewDesc]) {
        let start = self.with_node(view, |n| {
            assert!(offset + views.len() as u32 <= n.num_srv_uav, "write_srvs_uavs: range exceeds the view's SRV/UAV allocation");
            n.srv_uav_start.expect("write_srvs_uavs called on a view with no SRV/UAV range")
        });
        for (i, view_desc) in views.iter().enumerate() {
            self.write_srv_uav(start + offset + i as u32, view_desc);
        }
    }

    pub fn write_samplers(&self, view: ShaderViewHandle, offset: u32, samplers: &[SamplerDesc]) {
        let start = self.with_node(view, |n| {
            assert!(offset + samplers.len() as u32 <= n.num_samplers, "write_samplers: range exceeds the view's sampler allocation");
            n.sampler_start.expect("write_samplers called on a view with no sampler range")
        });
        for (i, sampler) in samplers.iter().enumerate() {
            self.write_sampler(start + offset + i as u32, sampler);
        }
    }

    pub fn free(&self, handle: ShaderViewHandle) {
        let node = self.views.lock().release(handle.index());
        if let Some(start) = node.srv_uav_start {
            self.srv_uav_heap.free(start);
        }
        if let Some(start) = node.sampler_start {
            self.sampler_heap.free(start);
        }
    }

    /// The GPU-visible start handle of the view's SRV/UAV table, or `None`
    /// if it declared zero SRVs/UAVs (§8 boundary case — nothing to bind).
    pub fn srv_uav_gpu_handle(&self, handle: ShaderViewHandle) -> Option<D3D12_GPU_DESCRIPTOR_HANDLE> {
        self.with_node(handle, |n| n.srv_uav_start.map(|s| self.srv_uav_heap.gpu_handle(s)))
    }

    pub fn sampler_gpu_handle(&self, handle: ShaderViewHandle) -> Option<D3D12_GPU_DESCRIPTOR_HANDLE> {
        self.with_node(handle, |n| n.sampler_start.map(|s| self.sampler_heap.gpu_handle(s)))
    }

    pub fn has_srv_uav(&self, handle: ShaderViewHandle) -> bool {
        self.with_node(handle, |n| n.srv_uav_start.is_some())
    }

    pub fn has_sampler(&self, handle: ShaderViewHandle) -> bool {
        self.with_node(handle, |n| n.sampler_start.is_some())
    }

    /// Both shader-visible heaps, in the order `SetDescriptorHeaps` expects
    /// them bound for the lifetime of a translated command list (§4.7 step 1).
    pub fn gpu_relevant_heaps(&self) -> [ID3D12DescriptorHeap; 2] {
        [self.srv_uav_heap.native_heap().clone(), self.sampler_heap.native_heap().clone()]
    }

    pub fn leak_count(&self) -> usize {
        self.views.lock().count_leaked()
    }

    fn with_node<R>(&self, handle: ShaderViewHandle, f: impl FnOnce(&ShaderViewNode) -> R) -> R {
        f(self.views.lock().get(handle.index()))
    }

    fn write_srv_uav(&self, index: Index, view: &ResourceViewDesc) {
        let handle = self.srv_uav_heap.cpu_handle(index);
        match *view {
            ResourceViewDesc::ShaderResourceBuffer { resource, first_element, num_elements, structure_stride_bytes } => {
                self.resources.with_node(resource, |n| {
                    let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
                        Format: DXGI_FORMAT_UNKNOWN,
                        ViewDimension: D3D12_SRV_DIMENSION_BUFFER,
                        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                        Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                            Buffer: D3D12_BUFFER_SRV {
                                FirstElement: first_element as u64,
                                NumElements: num_elements,
                                StructureByteStride: structure_stride_bytes,
                                Flags: D3D12_BUFFER_SRV_FLAG_NONE,
                            },
                        },
                    };
                    unsafe { self.device.CreateShaderResourceView(&n.resource, Some(&desc), handle) };
                });
            }
            ResourceViewDesc::ShaderResourceTexture { resource, most_detailed_mip, mip_levels } => {
                self.resources.with_node(resource, |n| {
                    let ResourceKind::Image(meta) = n.kind else { panic!("ShaderResourceTexture view on a non-image resource") };
                    let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
                        Format: format_to_dxgi(meta.format),
                        ViewDimension: texture_srv_dimension(meta.dimension),
                        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                        Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                            Texture2D: D3D12_TEX2D_SRV {
                                MostDetailedMip: most_detailed_mip,
                                MipLevels: mip_levels,
                                PlaneSlice: 0,
                                ResourceMinLODClamp: 0.0,
                            },
                        },
                    };
                    unsafe { self.device.CreateShaderResourceView(&n.resource, Some(&desc), handle) };
                });
            }
            ResourceViewDesc::UnorderedAccessBuffer { resource, first_element, num_elements, structure_stride_bytes } => {
                self.resources.with_node(resource, |n| {
                    let desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                        Format: DXGI_FORMAT_UNKNOWN,
                        ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                        Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                            Buffer: D3D12_BUFFER_UAV {
                                FirstElement: first_element as u64,
                                NumElements: num_elements,
                                StructureByteStride: structure_stride_bytes,
                                CounterOffsetInBytes: 0,
                                Flags: D3D12_BUFFER_UAV_FLAG_NONE,
                            },
                        },
                    };
                    unsafe { self.device.CreateUnorderedAccessView(&n.resource, None, Some(&desc), handle) };
                });
            }
            ResourceViewDesc::UnorderedAccessTexture { resource, mip_slice } => {
                self.resources.with_node(resource, |n| {
                    let ResourceKind::Image(meta) = n.kind else { panic!("UnorderedAccessTexture view on a non-image resource") };
                    let desc = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                        Format: format_to_dxgi(meta.format),
                        ViewDimension: D3D12_UAV_DIMENSION_TEXTURE2D,
                        Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_UAV { MipSlice: mip_slice, PlaneSlice: 0 } },
                    };
                    unsafe { self.device.CreateUnorderedAccessView(&n.resource, None, Some(&desc), handle) };
                });
            }
            ResourceViewDesc::AccelerationStructure { accel_struct } => {
                let gpu_va = self.accel_struct_gpu_va(accel_struct);
                let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
                    Format: DXGI_FORMAT_UNKNOWN,
                    ViewDimension: D3D12_SRV_DIMENSION_RAYTRACING_ACCELERATION_STRUCTURE,
                    Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                    Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                        RaytracingAccelerationStructure: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_SRV { Location: gpu_va },
                    },
                };
                // The resource parameter is `None`: an acceleration-structure
                // SRV names its buffer through the descriptor itself.
                unsafe { self.device.CreateShaderResourceView(None, Some(&desc), handle) };
            }
        }
    }

    fn accel_struct_gpu_va(&self, accel_struct: AccelStructHandle) -> u64 {
        self.accel_structs.with_node(accel_struct, |n| self.resources.with_node(n.result_buffer, |r| unsafe { r.resource.GetGPUVirtualAddress() }))
    }

    fn write_sampler(&self, index: Index, sampler: &SamplerDesc) {
        let handle = self.sampler_heap.cpu_handle(index);
        let (filter, max_anisotropy) = filter_to_dx12(sampler.filter);
        let desc = D3D12_SAMPLER_DESC {
            Filter: filter,
            AddressU: address_mode_to_dx12(sampler.address_u),
            AddressV: address_mode_to_dx12(sampler.address_v),
            AddressW: address_mode_to_dx12(sampler.address_w),
            MipLODBias: 0.0,
            MaxAnisotropy: max_anisotropy,
            ComparisonFunc: D3D12_COMPARISON_FUNC_NEVER,
            BorderColor: sampler.border_color,
            MinLOD: 0.0,
            MaxLOD: D3D12_FLOAT32_MAX,
        };
        unsafe { self.device.CreateSampler(&desc, handle) };
    }
}

fn texture_srv_dimension(dim: TextureDimension) -> D3D12_SRV_DIMENSION {
    match dim {
        TextureDimension::D1 => D3D12_SRV_DIMENSION_TEXTURE1D,
        TextureDimension::D2 => D3D12_SRV_DIMENSION_TEXTURE2D,
        TextureDimension::D3 => D3D12_SRV_DIMENSION_TEXTURE3D,
        TextureDimension::Cube => D3D12_SRV_DIMENSION_TEXTURECUBE,
    }
}
