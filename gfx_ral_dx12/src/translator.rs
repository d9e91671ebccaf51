//! Command-list translator (§4.7): walks a decoded
//! [`gfx_ral_core::command_stream::Command`] stream and issues the matching
//! `ID3D12GraphicsCommandList7` calls.
//!
//! Grounded in `original_source/d3d12/CommandList.cc`'s command-replay loop
//! (one native call per recorded command, descriptor heaps bound once up
//! front, transient RTV/DSV descriptors claimed and released around a
//! render pass) and in this crate's own `incomplete_state_cache`: a
//! `TransitionResources` command records the *before* state returned by the
//! list's cache and only emits a barrier when that before state is already
//! known (first touch defers the barrier to the stitching pass in
//! `Dx12Backend::submit`, §4.2).
//!
//! One `Translator` is shared by every thread translating command lists;
//! all of its state (the transient descriptor heaps, the two indirect-draw
//! command signatures) is either lock-free or behind its own
//! synchronization, so no per-thread instance is needed.

use std::ffi::c_void;
use std::mem::ManuallyDrop;

use gfx_ral_core::handle::PipelineStateHandle;
use gfx_ral_core::incomplete_state_cache::IncompleteStateCache;
use gfx_ral_core::shader_table::{calculate_shader_table_sizes, write_shader_table, ArgPresence, RecordArgument, ShaderTableRecord, SHADER_IDENTIFIER_SIZE, SHADER_TABLE_ALIGNMENT};
use gfx_ral_core::state::{HeapKind, ResourceState};
use gfx_ral_core::Result;
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::accel_struct_pool::{AccelStructKind, AccelStructPool};
use crate::descriptor_heap::RtvDsvHeap;
use crate::pipeline_state_pool::PipelineStatePool;
use crate::resource_pool::{ResourceKind, ResourcePool};
use crate::root_sig_cache::ArgumentBinding;
use crate::shader_view_pool::ShaderViewPool;
use crate::utils::{format_to_dxgi, state_to_dx12, ToRalError};

struct BoundState {
    pso: Option<PipelineStateHandle>,
    is_compute: bool,
    arguments: Vec<ArgumentBinding>,
    active_rtvs: Vec<D3D12_CPU_DESCRIPTOR_HANDLE>,
    active_dsv: Option<D3D12_CPU_DESCRIPTOR_HANDLE>,
}

impl BoundState {
    fn new() -> Self {
        Self { pso: None, is_compute: false, arguments: Vec::new(), active_rtvs: Vec::new(), active_dsv: None }
    }
}

pub struct Translator<'a> {
    device: ID3D12Device10,
    resources: &'a ResourcePool,
    shader_views: &'a ShaderViewPool<'a>,
    pipelines: &'a PipelineStatePool<'a>,
    accel_structs: &'a AccelStructPool<'a>,
    queries: &'a crate::query_pool::QueryPool,
    rtv_heap: RtvDsvHeap,
    dsv_heap: RtvDsvHeap,
    draw_signature: ID3D12CommandSignature,
    draw_indexed_signature: ID3D12CommandSignature,
    /// Backing storage for per-dispatch shader tables. `DispatchRays`
    /// carries no fence the translator could use to know when it is safe to
    /// free one of these, so they are intentionally leaked for the life of
    /// the device rather than tracked and freed (documented simplification).
    shader_table_scratch: Mutex<Vec<ID3D12Resource>>,
}

impl<'a> Translator<'a> {
    pub fn new(
        device: ID3D12Device10,
        resources: &'a ResourcePool,
        shader_views: &'a ShaderViewPool<'a>,
        pipelines: &'a PipelineStatePool<'a>,
        accel_structs: &'a AccelStructPool<'a>,
        queries: &'a crate::query_pool::QueryPool,
        max_transient_rtvs: u32,
        max_transient_dsvs: u32,
    ) -> Result<Self> {
        let rtv_heap = RtvDsvHeap::new(&device, false, max_transient_rtvs.max(1))?;
        let dsv_heap = RtvDsvHeap::new(&device, true, max_transient_dsvs.max(1))?;
        let draw_signature = create_indirect_signature(&device, false)?;
        let draw_indexed_signature = create_indirect_signature(&device, true)?;
        Ok(Self {
            device,
            resources,
            shader_views,
            pipelines,
            accel_structs,
            queries,
            rtv_heap,
            dsv_heap,
            draw_signature,
            draw_indexed_signature,
            shader_table_scratch: Mutex::new(Vec::new()),
        })
    }

    /// Replays `stream` onto `native`, stitching resource-state barriers
    /// against `state_cache` (§4.5, §4.7 step 5). Programmer errors in the
    /// stream (an unbound pipeline, a malformed handle) are fatal, matching
    /// the rest of this crate's stance on command-stream corruption.
    pub fn translate(&self, native: &ID3D12GraphicsCommandList7, state_cache: &mut IncompleteStateCache<ResourceState>, stream: &[u8]) {
        let heaps = self.shader_views.gpu_relevant_heaps();
        let heaps_opt = [Some(heaps[0].clone()), Some(heaps[1].clone())];
        unsafe { native.SetDescriptorHeaps(&heaps_opt) };

        let mut bound = BoundState::new();

        for command in gfx_ral_core::command_stream::CommandStreamReader::new(stream) {
            self.dispatch(native, state_cache, &mut bound, command);
        }
    }

    fn dispatch(
        &self,
        native: &ID3D12GraphicsCommandList7,
        state_cache: &mut IncompleteStateCache<ResourceState>,
        bound: &mut BoundState,
        command: gfx_ral_core::command_stream::Command,
    ) {
        use gfx_ral_core::command_stream::Command;

        match command {
            Command::Draw { vertex_count, instance_count, first_vertex, first_instance, indexed, first_index, vertex_offset } => unsafe {
                if indexed {
                    native.DrawIndexedInstanced(vertex_count, instance_count, first_index, vertex_offset, first_instance);
                } else {
                    native.DrawInstanced(vertex_count, instance_count, first_vertex, first_instance);
                }
            },
            Command::DrawIndirect { argument_buffer, argument_buffer_offset_bytes, num_indirect_calls, indexed } => {
                let sig = if indexed { &self.draw_indexed_signature } else { &self.draw_signature };
                self.resources.with_node(argument_buffer, |n| unsafe {
                    native.ExecuteIndirect(sig, num_indirect_calls, &n.resource, argument_buffer_offset_bytes, None, 0);
                });
            }
            Command::Dispatch { group_count_x, group_count_y, group_count_z } => unsafe {
                native.Dispatch(group_count_x, group_count_y, group_count_z);
            },
            Command::TransitionResources { transitions } => {
                let mut barriers: Vec<D3D12_RESOURCE_BARRIER> = Vec::with_capacity(transitions.len());
                for t in &transitions {
                    if let Some(before) = state_cache.transition(t.resource, t.after, 0) {
                        if before != t.after {
                            let native_res = self.resources.with_node(t.resource, |n| n.resource.clone());
                            barriers.push(transition_barrier(native_res, state_to_dx12(before), state_to_dx12(t.after)));
                        }
                    }
                }
                if !barriers.is_empty() {
                    unsafe { native.ResourceBarrier(&barriers) };
                }
            }
            Command::BarrierUav { resource } => {
                let native_res = self.resources.with_node(resource, |n| n.resource.clone());
                let barrier = D3D12_RESOURCE_BARRIER {
                    Type: D3D12_RESOURCE_BARRIER_TYPE_UAV,
                    Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
                    Anonymous: D3D12_RESOURCE_BARRIER_0 { UAV: ManuallyDrop::new(D3D12_RESOURCE_BARRIER_UAV { pResource: ManuallyDrop::new(Some(native_res)) }) },
                };
                unsafe { native.ResourceBarrier(&[barrier]) };
                // Safety: the barrier above is consumed synchronously by
                // `ResourceBarrier`; nothing reads `Anonymous` afterwards.
                std::mem::forget(barrier);
            }
            Command::TransitionImageSlices { resource, mip, array_slice, before, after } => {
                let (native_res, mip_levels) = self.resources.with_node(resource, |n| {
                    let ResourceKind::Image(meta) = n.kind else { panic!("TransitionImageSlices on a non-image resource") };
                    (n.resource.clone(), meta.mip_levels)
                });
                let subresource = mip + array_slice * mip_levels;
                let barrier = subresource_transition_barrier(native_res, state_to_dx12(before), state_to_dx12(after), subresource);
                unsafe { native.ResourceBarrier(&[barrier]) };
                std::mem::forget(barrier);
            }
            Command::CopyBuffer { src, src_offset, dst, dst_offset, size_bytes } => {
                let src_native = self.resources.with_node(src, |n| n.resource.clone());
                let dst_native = self.resources.with_node(dst, |n| n.resource.clone());
                unsafe { native.CopyBufferRegion(&dst_native, dst_offset, &src_native, src_offset, size_bytes) };
            }
            Command::CopyTexture { src, src_mip, src_array_slice, dst, dst_mip, dst_array_slice } => {
                let src_sub = self.resources.with_node(src, |n| {
                    let ResourceKind::Image(meta) = n.kind else { panic!("CopyTexture src is not an image") };
                    src_mip + src_array_slice * meta.mip_levels
                });
                let dst_sub = self.resources.with_node(dst, |n| {
                    let ResourceKind::Image(meta) = n.kind else { panic!("CopyTexture dst is not an image") };
                    dst_mip + dst_array_slice * meta.mip_levels
                });
                let src_native = self.resources.with_node(src, |n| n.resource.clone());
                let dst_native = self.resources.with_node(dst, |n| n.resource.clone());
                let src_loc = subresource_copy_location(&src_native, src_sub);
                let dst_loc = subresource_copy_location(&dst_native, dst_sub);
                unsafe { native.CopyTextureRegion(&dst_loc, 0, 0, 0, &src_loc, None) };
            }
            Command::CopyBufferToTexture { src, src_offset, dst, dst_mip, dst_array_slice } => {
                let dst_sub = self.resources.with_node(dst, |n| {
                    let ResourceKind::Image(meta) = n.kind else { panic!("CopyBufferToTexture dst is not an image") };
                    dst_mip + dst_array_slice * meta.mip_levels
                });
                let src_native = self.resources.with_node(src, |n| n.resource.clone());
                let dst_native = self.resources.with_node(dst, |n| n.resource.clone());
                let footprint = self.copyable_footprint(&dst_native, dst_sub, src_offset);
                let src_loc = D3D12_TEXTURE_COPY_LOCATION { pResource: ManuallyDrop::new(Some(src_native)), Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { PlacedFootprint: footprint } };
                let dst_loc = subresource_copy_location(&dst_native, dst_sub);
                unsafe { native.CopyTextureRegion(&dst_loc, 0, 0, 0, &src_loc, None) };
                std::mem::forget(src_loc);
            }
            Command::CopyTextureToBuffer { src, src_mip, src_array_slice, dst, dst_offset } => {
                let src_sub = self.resources.with_node(src, |n| {
                    let ResourceKind::Image(meta) = n.kind else { panic!("CopyTextureToBuffer src is not an image") };
                    src_mip + src_array_slice * meta.mip_levels
                });
                let src_native = self.resources.with_node(src, |n| n.resource.clone());
                let dst_native = self.resources.with_node(dst, |n| n.resource.clone());
                let footprint = self.copyable_footprint(&src_native, src_sub, dst_offset);
                let dst_loc = D3D12_TEXTURE_COPY_LOCATION { pResource: ManuallyDrop::new(Some(dst_native)), Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { PlacedFootprint: footprint } };
                let src_loc = subresource_copy_location(&src_native, src_sub);
                unsafe { native.CopyTextureRegion(&dst_loc, 0, 0, 0, &src_loc, None) };
                std::mem::forget(dst_loc);
            }
            Command::ResolveTexture { src, src_array_slice, dst, dst_array_slice, format } => {
                let src_native = self.resources.with_node(src, |n| n.resource.clone());
                let dst_native = self.resources.with_node(dst, |n| n.resource.clone());
                unsafe { native.ResolveSubresource(&dst_native, dst_array_slice, &src_native, src_array_slice, format_to_dxgi(format)) };
            }
            Command::BeginRenderPass { render_targets, depth_stencil } => {
                bound.active_rtvs.clear();
                for rt in &render_targets {
                    let native_res = self.resources.with_node(rt.resource, |n| n.resource.clone());
                    let rtv = self.rtv_heap.allocate().expect("transient RTV heap exhausted");
                    let view_desc = D3D12_RENDER_TARGET_VIEW_DESC {
                        ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2DARRAY,
                        Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
                            Texture2DArray: D3D12_TEX2D_ARRAY_RTV { MipSlice: rt.mip, FirstArraySlice: rt.array_slice, ArraySize: 1, PlaneSlice: 0 },
                        },
                        ..unsafe { std::mem::zeroed() }
                    };
                    unsafe { self.device.CreateRenderTargetView(&native_res, Some(&view_desc), rtv) };
                    if let Some(c) = rt.clear {
                        unsafe { native.ClearRenderTargetView(rtv, c.0.as_ptr(), None) };
                    }
                    bound.active_rtvs.push(rtv);
                }
                bound.active_dsv = depth_stencil.as_ref().map(|ds| {
                    let native_res = self.resources.with_node(ds.resource, |n| n.resource.clone());
                    let dsv = self.dsv_heap.allocate().expect("transient DSV heap exhausted");
                    let dsv_flags = if ds.read_only { D3D12_DSV_FLAG_READ_ONLY_DEPTH | D3D12_DSV_FLAG_READ_ONLY_STENCIL } else { D3D12_DSV_FLAG_NONE };
                    let view_desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
                        ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2DARRAY,
                        Flags: dsv_flags,
                        Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                            Texture2DArray: D3D12_TEX2D_ARRAY_DSV { MipSlice: ds.mip, FirstArraySlice: ds.array_slice, ArraySize: 1 },
                        },
                        ..unsafe { std::mem::zeroed() }
                    };
                    unsafe { self.device.CreateDepthStencilView(&native_res, Some(&view_desc), dsv) };
                    if let Some(c) = ds.clear {
                        let flags = D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL;
                        unsafe { native.ClearDepthStencilView(dsv, flags, c.depth, c.stencil, &[]) };
                    }
                    dsv
                });
                unsafe { native.OMSetRenderTargets(bound.active_rtvs.len() as u32, Some(bound.active_rtvs.as_ptr()), false, bound.active_dsv.as_ref().map(|d| d as *const _)) };
            }
            Command::EndRenderPass => {
                for rtv in bound.active_rtvs.drain(..) {
                    self.rtv_heap.free(rtv);
                }
                if let Some(dsv) = bound.active_dsv.take() {
                    self.dsv_heap.free(dsv);
                }
            }
            Command::WriteTimestamp { query_range, index } => {
                let (kind, first) = crate::query_pool::QueryPool::decode_handle(query_range);
                let heap = self.queries().native_heap(kind);
                unsafe { native.EndQuery(&heap, D3D12_QUERY_TYPE_TIMESTAMP, first + index) };
            }
            Command::ResolveQueries { query_range, first, count, dst_buffer, dst_offset_bytes } => {
                let (kind, range_first) = crate::query_pool::QueryPool::decode_handle(query_range);
                let heap = self.queries().native_heap(kind);
                let query_type = query_kind_to_d3d12(kind);
                let dst_native = self.resources.with_node(dst_buffer, |n| n.resource.clone());
                unsafe { native.ResolveQueryData(&heap, query_type, range_first + first, count, &dst_native, dst_offset_bytes) };
            }
            Command::BeginDebugLabel { label } => unsafe {
                native.BeginEvent(0, label.as_ptr() as *const c_void, label.len() as u32);
            },
            Command::EndDebugLabel => unsafe {
                native.EndEvent();
            },
            Command::UpdateBottomLevel { accel_struct } => self.update_bottom_level(native, accel_struct),
            Command::UpdateTopLevel { accel_struct, num_instances } => self.update_top_level(native, accel_struct, num_instances),
            Command::DispatchRays { pso, width, height, depth } => self.dispatch_rays(native, pso, width, height, depth),
            Command::ClearTextures { targets } => {
                for (resource, color) in &targets {
                    let native_res = self.resources.with_node(*resource, |n| n.resource.clone());
                    let rtv = self.rtv_heap.allocate().expect("transient RTV heap exhausted");
                    unsafe {
                        self.device.CreateRenderTargetView(&native_res, None, rtv);
                        native.ClearRenderTargetView(rtv, color.0.as_ptr(), None);
                    }
                    self.rtv_heap.free(rtv);
                }
            }
            Command::CodeLocationMarker { line, file } => unsafe {
                let text = format!("{}:{line}", String::from_utf8_lossy(&file));
                native.SetMarker(0, text.as_ptr() as *const c_void, text.len() as u32);
            },
            Command::BeginProfileScope { name } => unsafe {
                native.BeginEvent(0, name.as_ptr() as *const c_void, name.len() as u32);
            },
            Command::EndProfileScope => unsafe {
                native.EndEvent();
            },
            Command::BindPipeline { pso } => {
                bound.pso = Some(pso);
                if pso.index() >= gfx_ral_core::handle::PIPELINE_RT_INDEX_OFFSET {
                    // Raytracing PSOs are only ever the target of `DispatchRays`,
                    // which re-fetches its own state object; nothing to bind here.
                    bound.is_compute = true;
                    bound.arguments.clear();
                    return;
                }
                self.pipelines.with_graphics_or_compute(pso, |node| {
                    bound.is_compute = node.is_compute;
                    bound.arguments = node.arguments.clone();
                    unsafe {
                        if node.is_compute {
                            native.SetComputeRootSignature(&node.root_sig);
                        } else {
                            native.SetGraphicsRootSignature(&node.root_sig);
                            native.IASetPrimitiveTopology(topology_to_d3d(node.primitive_topology));
                        }
                        native.SetPipelineState(&node.pso);
                    }
                });
            }
            Command::BindVertexBuffer { slot, buffer, offset_bytes } => {
                let view = self.resources.with_node(buffer, |n| {
                    let ResourceKind::Buffer(meta) = n.kind else { panic!("BindVertexBuffer on a non-buffer resource") };
                    D3D12_VERTEX_BUFFER_VIEW {
                        BufferLocation: meta.gpu_va + offset_bytes,
                        SizeInBytes: (meta.size_bytes - offset_bytes) as u32,
                        StrideInBytes: meta.stride_bytes,
                    }
                });
                unsafe { native.IASetVertexBuffers(slot, Some(&[view])) };
            }
            Command::BindIndexBuffer { buffer, offset_bytes } => {
                let view = self.resources.with_node(buffer, |n| {
                    let ResourceKind::Buffer(meta) = n.kind else { panic!("BindIndexBuffer on a non-buffer resource") };
                    let format = if meta.stride_bytes == 2 { DXGI_FORMAT_R16_UINT } else { DXGI_FORMAT_R32_UINT };
                    D3D12_INDEX_BUFFER_VIEW { BufferLocation: meta.gpu_va + offset_bytes, SizeInBytes: (meta.size_bytes - offset_bytes) as u32, Format: format }
                });
                unsafe { native.IASetIndexBuffer(Some(&view)) };
            }
            Command::BindShaderArguments { arguments } => {
                for (i, arg) in arguments.iter().enumerate() {
                    let Some(binding) = bound.arguments.get(i) else {
                        panic!("BindShaderArguments: argument index {i} exceeds the bound pipeline's root signature")
                    };
                    self.bind_one_argument(native, bound.is_compute, binding, arg);
                }
            }
        }
    }

    fn bind_one_argument(&self, native: &ID3D12GraphicsCommandList7, is_compute: bool, binding: &ArgumentBinding, arg: &gfx_ral_core::command_stream::ShaderArgument) {
        unsafe {
            if binding.cbv_param != u32::MAX && arg.cbv.is_valid() {
                let va = self.resources.with_node(arg.cbv, |n| {
                    let ResourceKind::Buffer(meta) = n.kind else { panic!("BindShaderArguments: cbv is not a buffer") };
                    meta.gpu_va
                }) + arg.cbv_offset as u64;
                if is_compute {
                    native.SetComputeRootConstantBufferView(binding.cbv_param, va);
                } else {
                    native.SetGraphicsRootConstantBufferView(binding.cbv_param, va);
                }
            }
            if binding.srv_uav_table_param != u32::MAX && arg.shader_view.is_valid() {
                if let Some(handle) = self.shader_views.srv_uav_gpu_handle(arg.shader_view) {
                    if is_compute {
                        native.SetComputeRootDescriptorTable(binding.srv_uav_table_param, handle);
                    } else {
                        native.SetGraphicsRootDescriptorTable(binding.srv_uav_table_param, handle);
                    }
                }
            }
            if binding.sampler_table_param != u32::MAX && arg.shader_view.is_valid() {
                if let Some(handle) = self.shader_views.sampler_gpu_handle(arg.shader_view) {
                    if is_compute {
                        native.SetComputeRootDescriptorTable(binding.sampler_table_param, handle);
                    } else {
                        native.SetGraphicsRootDescriptorTable(binding.sampler_table_param, handle);
                    }
                }
            }
        }
    }

    /// Builds real triangle-list geometry descs from the bottom-level AS's
    /// declared geometry buffers and issues the build. Each geometry buffer
    /// is assumed tightly packed `R32G32B32_FLOAT` positions (the simplest
    /// layout this backend's buffer metadata can describe); a richer vertex
    /// format would need a stride/format pair threaded through
    /// `create_bottom_level` itself.
    fn update_bottom_level(&self, native: &ID3D12GraphicsCommandList7, handle: gfx_ral_core::handle::AccelStructHandle) {
        let (result_va, scratch_va, geometries, flags) = self.accel_structs.with_node(handle, |n| {
            let AccelStructKind::BottomLevel { geometries } = &n.kind else { panic!("UpdateBottomLevel on a top-level acceleration structure") };
            let result_va = self.resources.with_node(n.result_buffer, |r| unsafe { r.resource.GetGPUVirtualAddress() });
            let scratch_va = self.resources.with_node(n.scratch_buffer, |r| unsafe { r.resource.GetGPUVirtualAddress() });
            (result_va, scratch_va, geometries.clone(), n.build_flags)
        });

        let geometry_descs: Vec<D3D12_RAYTRACING_GEOMETRY_DESC> = geometries
            .iter()
            .map(|&geom| {
                self.resources.with_node(geom, |n| {
                    let ResourceKind::Buffer(meta) = n.kind else { panic!("bottom-level AS geometry is not a buffer") };
                    let vertex_count = (meta.size_bytes / 12) as u32;
                    D3D12_RAYTRACING_GEOMETRY_DESC {
                        Type: D3D12_RAYTRACING_GEOMETRY_TYPE_TRIANGLES,
                        Flags: D3D12_RAYTRACING_GEOMETRY_FLAG_OPAQUE,
                        Anonymous: D3D12_RAYTRACING_GEOMETRY_DESC_0 {
                            Triangles: D3D12_RAYTRACING_GEOMETRY_TRIANGLES_DESC {
                                Transform3x4: 0,
                                IndexFormat: DXGI_FORMAT_UNKNOWN,
                                VertexFormat: DXGI_FORMAT_R32G32B32_FLOAT,
                                IndexCount: 0,
                                VertexCount: vertex_count,
                                IndexBuffer: 0,
                                VertexBuffer: D3D12_GPU_VIRTUAL_ADDRESS_AND_STRIDE { StartAddress: meta.gpu_va, StrideInBytes: 12 },
                            },
                        },
                    }
                })
            })
            .collect();

        let inputs = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS {
            Type: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_TYPE_BOTTOM_LEVEL,
            Flags: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_BUILD_FLAGS(flags),
            NumDescs: geometry_descs.len() as u32,
            DescsLayout: D3D12_ELEMENTS_LAYOUT_ARRAY,
            Anonymous: D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS_0 { pGeometryDescs: geometry_descs.as_ptr() },
        };
        let desc = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_DESC {
            DestAccelerationStructureData: result_va,
            Inputs: inputs,
            SourceAccelerationStructureData: 0,
            ScratchAccelerationStructureData: scratch_va,
        };
        let native4: ID3D12GraphicsCommandList4 = native.cast().expect("ID3D12GraphicsCommandList7::cast to ID3D12GraphicsCommandList4");
        unsafe { native4.BuildRaytracingAccelerationStructure(&desc, None) };
    }

    fn update_top_level(&self, native: &ID3D12GraphicsCommandList7, handle: gfx_ral_core::handle::AccelStructHandle, num_instances: u32) {
        let (result_va, scratch_va, instance_va, flags) = self.accel_structs.with_node(handle, |n| {
            let AccelStructKind::TopLevel { instance_buffer, .. } = &n.kind else { panic!("UpdateTopLevel on a bottom-level acceleration structure") };
            let result_va = self.resources.with_node(n.result_buffer, |r| unsafe { r.resource.GetGPUVirtualAddress() });
            let scratch_va = self.resources.with_node(n.scratch_buffer, |r| unsafe { r.resource.GetGPUVirtualAddress() });
            let instance_va = self.resources.with_node(*instance_buffer, |r| unsafe { r.resource.GetGPUVirtualAddress() });
            (result_va, scratch_va, instance_va, n.build_flags)
        });

        let inputs = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS {
            Type: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_TYPE_TOP_LEVEL,
            Flags: D3D12_RAYTRACING_ACCELERATION_STRUCTURE_BUILD_FLAGS(flags),
            NumDescs: num_instances,
            DescsLayout: D3D12_ELEMENTS_LAYOUT_ARRAY,
            Anonymous: D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_INPUTS_0 { InstanceDescs: instance_va },
        };
        let desc = D3D12_BUILD_RAYTRACING_ACCELERATION_STRUCTURE_DESC {
            DestAccelerationStructureData: result_va,
            Inputs: inputs,
            SourceAccelerationStructureData: 0,
            ScratchAccelerationStructureData: scratch_va,
        };
        let native4: ID3D12GraphicsCommandList4 = native.cast().expect("ID3D12GraphicsCommandList7::cast to ID3D12GraphicsCommandList4");
        unsafe { native4.BuildRaytracingAccelerationStructure(&desc, None) };
    }

    /// Builds a zero-argument shader table for `pso` and dispatches rays.
    /// Per-record arguments aren't threaded through `Command::DispatchRays`
    /// today (the command carries only the PSO and dispatch dimensions), so
    /// every record is identifier-only; a future command-stream addition
    /// would extend this the same way `BindShaderArguments` extends draws.
    fn dispatch_rays(&self, native: &ID3D12GraphicsCommandList7, pso: PipelineStateHandle, width: u32, height: u32, depth: u32) {
        let (ray_gen_id, miss_ids, hit_group_ids) = self.pipelines.with_raytracing(pso, |node| {
            use gfx_ral_core::pso_desc::ShaderLibraryExportKind as Kind;
            let ray_gen = node
                .exports
                .iter()
                .find(|e| e.kind == Kind::RayGeneration)
                .unwrap_or_else(|| panic!("raytracing pipeline has no ray-generation export"));
            let ray_gen_id = shader_identifier(&node.properties, &ray_gen.export_name);

            let miss_ids: Vec<_> = node.exports.iter().filter(|e| e.kind == Kind::Miss).map(|e| shader_identifier(&node.properties, &e.export_name)).collect();

            let hit_group_ids: Vec<_> = node.hit_group_names.iter().map(|name| shader_identifier(&node.properties, name)).collect();

            (ray_gen_id, miss_ids, hit_group_ids)
        });

        let empty_args: [RecordArgument; 0] = [];
        let ray_gen_record = ShaderTableRecord { shader_identifier: &ray_gen_id, arguments: &empty_args, root_constants: &[] };
        let miss_records: Vec<_> = miss_ids.iter().map(|id| ShaderTableRecord { shader_identifier: id, arguments: &empty_args, root_constants: &[] }).collect();
        let hit_group_records: Vec<_> = hit_group_ids.iter().map(|id| ShaderTableRecord { shader_identifier: id, arguments: &empty_args, root_constants: &[] }).collect();
        let callable_records: Vec<ShaderTableRecord<'_>> = Vec::new();

        let sizes = calculate_shader_table_sizes(&ray_gen_record, &miss_records, &hit_group_records, &callable_records);

        let total_size = align_up(sizes.size_ray_gen, SHADER_TABLE_ALIGNMENT)
            + align_up(sizes.size_miss, SHADER_TABLE_ALIGNMENT)
            + align_up(sizes.size_hit_group, SHADER_TABLE_ALIGNMENT);

        let (table_resource, table_ptr, table_va) = self
            .resources
            .create_mapped_buffer(gfx_ral_core::resource_desc::BufferDesc { size_bytes: total_size.max(SHADER_TABLE_ALIGNMENT as u64 as u64), stride_bytes: 0, heap: HeapKind::Upload, allow_unordered_access: false })
            .map(|(handle, ptr)| {
                let (native_res, va) = self.resources.with_node(handle, |n| (n.resource.clone(), unsafe { n.resource.GetGPUVirtualAddress() }));
                (native_res, ptr, va)
            })
            .expect("shader-table scratch buffer allocation failed");

        let buf = unsafe { std::slice::from_raw_parts_mut(table_ptr, total_size as usize) };
        let no_presence: [ArgPresence; 0] = [];

        let ray_gen_offset = 0u32;
        write_shader_table(&mut buf[ray_gen_offset as usize..], sizes.size_ray_gen, std::slice::from_ref(&ray_gen_record), &[&no_presence]);

        let miss_offset = align_up(sizes.size_ray_gen, SHADER_TABLE_ALIGNMENT);
        if !miss_records.is_empty() {
            let presence_refs: Vec<&[ArgPresence]> = miss_records.iter().map(|_| no_presence.as_slice()).collect();
            write_shader_table(&mut buf[miss_offset as usize..], sizes.stride_miss, &miss_records, &presence_refs);
        }

        let hit_group_offset = miss_offset + align_up(sizes.size_miss, SHADER_TABLE_ALIGNMENT);
        if !hit_group_records.is_empty() {
            let presence_refs: Vec<&[ArgPresence]> = hit_group_records.iter().map(|_| no_presence.as_slice()).collect();
            write_shader_table(&mut buf[hit_group_offset as usize..], sizes.stride_hit_group, &hit_group_records, &presence_refs);
        }

        let desc = D3D12_DISPATCH_RAYS_DESC {
            RayGenerationShaderRecord: D3D12_GPU_VIRTUAL_ADDRESS_RANGE { StartAddress: table_va, SizeInBytes: sizes.size_ray_gen as u64 },
            MissShaderTable: D3D12_GPU_VIRTUAL_ADDRESS_RANGE_AND_STRIDE {
                StartAddress: if miss_records.is_empty() { 0 } else { table_va + miss_offset as u64 },
                SizeInBytes: sizes.size_miss as u64,
                StrideInBytes: sizes.stride_miss as u64,
            },
            HitGroupTable: D3D12_GPU_VIRTUAL_ADDRESS_RANGE_AND_STRIDE {
                StartAddress: if hit_group_records.is_empty() { 0 } else { table_va + hit_group_offset as u64 },
                SizeInBytes: sizes.size_hit_group as u64,
                StrideInBytes: sizes.stride_hit_group as u64,
            },
            CallableShaderTable: D3D12_GPU_VIRTUAL_ADDRESS_RANGE_AND_STRIDE::default(),
            Width: width,
            Height: height,
            Depth: depth,
        };

        self.shader_table_scratch.lock().push(table_resource);

        let native4: ID3D12GraphicsCommandList4 = native.cast().expect("ID3D12GraphicsCommandList7::cast to ID3D12GraphicsCommandList4");
        unsafe { native4.DispatchRays(&desc) };
    }

    fn copyable_footprint(&self, texture: &ID3D12Resource, subresource: u32, base_offset: u64) -> D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
        let tex_desc = unsafe { texture.GetDesc() };
        let mut layout = D3D12_PLACED_SUBRESOURCE_FOOTPRINT::default();
        let mut num_rows = 0u32;
        let mut row_size = 0u64;
        let mut total = 0u64;
        unsafe { self.device.GetCopyableFootprints(&tex_desc, subresource, 1, base_offset, Some(&mut layout), Some(&mut num_rows), Some(&mut row_size), Some(&mut total)) };
        layout
    }

    fn queries(&self) -> &crate::query_pool::QueryPool {
        self.queries
    }
}

fn align_up(size: u32, align: u32) -> u32 {
    (size + align - 1) / align * align
}

fn shader_identifier(properties: &ID3D12StateObjectProperties, export_name: &str) -> [u8; SHADER_IDENTIFIER_SIZE as usize] {
    let wide: Vec<u16> = export_name.encode_utf16().chain(std::iter::once(0)).collect();
    let ptr = unsafe { properties.GetShaderIdentifier(windows::core::PCWSTR(wide.as_ptr())) };
    assert!(!ptr.is_null(), "GetShaderIdentifier returned null for export {export_name:?}");
    let mut out = [0u8; SHADER_IDENTIFIER_SIZE as usize];
    unsafe { std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), SHADER_IDENTIFIER_SIZE as usize) };
    out
}

fn query_kind_to_d3d12(kind: gfx_ral_core::state::QueryKind) -> D3D12_QUERY_TYPE {
    match kind {
        gfx_ral_core::state::QueryKind::Timestamp => D3D12_QUERY_TYPE_TIMESTAMP,
        gfx_ral_core::state::QueryKind::Occlusion => D3D12_QUERY_TYPE_OCCLUSION,
        gfx_ral_core::state::QueryKind::PipelineStats => D3D12_QUERY_TYPE_PIPELINE_STATISTICS,
    }
}

fn topology_to_d3d(topology: gfx_ral_core::pso_desc::PrimitiveTopology) -> D3D_PRIMITIVE_TOPOLOGY {
    use gfx_ral_core::pso_desc::PrimitiveTopology as T;
    match topology {
        T::PointList => D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
        T::LineList => D3D_PRIMITIVE_TOPOLOGY_LINELIST,
        T::LineStrip => D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
        T::TriangleList => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        T::TriangleStrip => D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
    }
}

pub(crate) fn transition_barrier(resource: ID3D12Resource, before: D3D12_RESOURCE_STATES, after: D3D12_RESOURCE_STATES) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: ManuallyDrop::new(Some(resource)),
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

fn subresource_transition_barrier(resource: ID3D12Resource, before: D3D12_RESOURCE_STATES, after: D3D12_RESOURCE_STATES, subresource: u32) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER { pResource: ManuallyDrop::new(Some(resource)), Subresource: subresource, StateBefore: before, StateAfter: after }),
        },
    }
}

fn subresource_copy_location(resource: &ID3D12Resource, subresource: u32) -> D3D12_TEXTURE_COPY_LOCATION {
    D3D12_TEXTURE_COPY_LOCATION { pResource: ManuallyDrop::new(Some(resource.clone())), Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { SubresourceIndex: subresource } }
}

fn create_indirect_signature(device: &ID3D12Device10, indexed: bool) -> Result<ID3D12CommandSignature> {
    let (arg, stride) = if indexed {
        (D3D12_INDIRECT_ARGUMENT_DESC { Type: D3D12_INDIRECT_ARGUMENT_TYPE_DRAW_INDEXED, ..Default::default() }, std::mem::size_of::<D3D12_DRAW_INDEXED_ARGUMENTS>())
    } else {
        (D3D12_INDIRECT_ARGUMENT_DESC { Type: D3D12_INDIRECT_ARGUMENT_TYPE_DRAW, ..Default::default() }, std::mem::size_of::<D3D12_DRAW_ARGUMENTS>())
    };
    let desc = D3D12_COMMAND_SIGNATURE_DESC { ByteStride: stride as u32, NumArgumentDescs: 1, pArgumentDescs: &arg, NodeMask: 0 };
    unsafe { device.CreateCommandSignature(&desc, None) }.map_err(|e| e.to_ral_error("CreateCommandSignature"))
}
