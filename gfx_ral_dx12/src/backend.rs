//! Assembles every pool in this crate behind [`gfx_ral_core::Backend`]
//! (§4.17) and owns the one part of the HAL that needs a global view: the
//! state-stitching `submit` pass (§4.2).
//!
//! Several pools borrow from each other (`ShaderViewPool` from
//! `ResourcePool` and `AccelStructPool`, `Translator` from almost all of
//! them), which a single owning struct can't express without either a
//! lifetime parameter on `Dx12Backend` itself — which `Backend` as a
//! trait object doesn't want — or one level of indirection. `Box::leak`
//! gives every borrowed-from pool a `'static` home once, at construction;
//! the leak is intentional and singular, matching the "one backend per
//! process" lifetime these pools already assume elsewhere (compare
//! [`gfx_ral_core::thread_association`]).

use gfx_ral_core::config::Config;
use gfx_ral_core::handle::{AccelStructHandle, CommandListHandle, FenceHandle, PipelineStateHandle, QueryRangeHandle, ResourceHandle, ShaderViewHandle, SwapchainHandle};
use gfx_ral_core::incomplete_state_cache::stitch;
use gfx_ral_core::pso_desc::{ComputePsoDesc, GraphicsPsoDesc, RaytracingPsoDesc};
use gfx_ral_core::resource_desc::{BufferDesc, RenderTargetDesc, ResourceViewDesc, SamplerDesc, ShaderViewDesc, TextureDesc};
use gfx_ral_core::state::{PresentMode, QueryKind, QueueKind};
use gfx_ral_core::thread_association::ThreadAssociation;
use gfx_ral_core::{Backend, Result, SubmitBatch, WindowHandle};
use windows::Win32::Graphics::Direct3D12::*;

use crate::accel_struct_pool::AccelStructPool;
use crate::cmd_list_pool::CommandListPool;
use crate::device::Device;
use crate::fence_pool::FencePool;
use crate::pipeline_state_pool::PipelineStatePool;
use crate::query_pool::QueryPool;
use crate::resource_pool::ResourcePool;
use crate::root_sig_cache::RootSigCache;
use crate::shader_view_pool::ShaderViewPool;
use crate::swapchain_pool::SwapchainPool;
use crate::translator::{self, Translator};
use crate::utils::state_to_dx12;

/// Transient RTV/DSV descriptors the translator claims for the lifetime of
/// a render pass (§4.7); generous enough that no realistic render graph
/// exhausts it, small enough not to matter next to the real descriptor
/// budgets in [`Config`].
const MAX_TRANSIENT_RENDER_TARGET_VIEWS: u32 = 256;
const MAX_TRANSIENT_DEPTH_STENCIL_VIEWS: u32 = 64;

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// The concrete D3D12 [`Backend`]. One instance owns the device, its three
/// queues, and every resource/descriptor/pipeline pool; destroying it
/// flushes the GPU and reports anything still live.
pub struct Dx12Backend {
    config: Config,
    device: Device,
    resources: &'static ResourcePool,
    shader_views: &'static ShaderViewPool<'static>,
    pipelines: &'static PipelineStatePool<'static>,
    accel_structs: &'static AccelStructPool<'static>,
    queries: &'static QueryPool,
    fences: FencePool,
    command_lists: CommandListPool,
    swapchains: SwapchainPool<'static>,
    translator: Translator<'static>,
    thread_assoc: ThreadAssociation,
}

impl Dx12Backend {
    pub fn new(config: Config) -> Result<Self> {
        let device = Device::new(&config)?;

        let max_injected_backbuffers = (config.num_backbuffers.max(1) * config.max_num_swapchains.max(1)).max(1);
        let resources: &'static ResourcePool = leak(ResourcePool::new(device.device.clone(), config.max_num_resources, max_injected_backbuffers));

        let root_sig_capacity = (config.max_num_pipeline_states + config.max_num_raytrace_pipeline_states).max(1) as usize;
        let root_sigs: &'static RootSigCache = leak(RootSigCache::new(device.device.clone(), root_sig_capacity));
        let pipelines: &'static PipelineStatePool<'static> =
            leak(PipelineStatePool::new(device.device.clone(), root_sigs, config.max_num_pipeline_states, config.max_num_raytrace_pipeline_states));

        let accel_structs: &'static AccelStructPool<'static> = leak(AccelStructPool::new(device.device.clone(), resources, config.max_num_accel_structs));

        let shader_views: &'static ShaderViewPool<'static> = leak(ShaderViewPool::new(
            device.device.clone(),
            resources,
            accel_structs,
            config.max_num_srvs + config.max_num_uavs,
            config.max_num_samplers,
            config.shader_view_page_size,
            config.max_num_shader_views,
        )?);

        let queries: &'static QueryPool = leak(QueryPool::new(&device.device, config.max_num_query_ranges)?);

        let fences = FencePool::new(config.max_num_fences);
        let command_lists = CommandListPool::new(device.device.clone(), &config)?;

        let present_queue = if config.present_from_compute_queue { device.compute_queue.clone() } else { device.direct_queue.clone() };
        let swapchains = SwapchainPool::new(device.device.clone(), device.factory.clone(), present_queue, resources, config.num_backbuffers, config.max_num_swapchains)?;

        let translator = Translator::new(
            device.device.clone(),
            resources,
            shader_views,
            pipelines,
            accel_structs,
            queries,
            MAX_TRANSIENT_RENDER_TARGET_VIEWS,
            MAX_TRANSIENT_DEPTH_STENCIL_VIEWS,
        )?;

        let thread_assoc = ThreadAssociation::new();

        Ok(Self { config, device, resources, shader_views, pipelines, accel_structs, queries, fences, command_lists, swapchains, translator, thread_assoc })
    }

    /// Submits the lists in `lists` (already ordered front-to-back) on
    /// `queue`. Each list gets its own `ExecuteCommandLists` call, directly
    /// preceded by a just-in-time micro-prelude when any resource it
    /// touches disagrees with the running master state (§4.2 steps 2-3,
    /// §8 scenario 3) — the running state is updated list by list, so a
    /// later list's prelude is built against what the resource will
    /// actually be once the lists ahead of it in this same chunk have run,
    /// not against the state at the start of the chunk. Every list,
    /// including any prelude, is released back to its pool once its
    /// `ExecuteCommandLists` call has been made — the pool's own fence
    /// bookkeeping (not this function) is what keeps their backing memory
    /// alive until the GPU is actually done with it.
    fn submit_chunk(&self, queue: QueueKind, native_queue: &ID3D12CommandQueue, lists: &[CommandListHandle]) {
        for &list in lists {
            let transitions = self.command_lists.with_slot_mut(list, |slot| {
                stitch(
                    slot.state_cache.entries(),
                    |resource| self.resources.with_node(resource, |node| node.read_master_state()),
                    |resource, state| self.resources.with_node(resource, |node| node.write_master_state(state)),
                )
            });
            let stitching_barriers: Vec<_> = transitions
                .into_iter()
                .map(|(resource, before, after)| translator::transition_barrier(self.resources.with_node(resource, |node| node.resource.clone()), state_to_dx12(before), state_to_dx12(after)))
                .collect();

            let prelude = if stitching_barriers.is_empty() {
                None
            } else {
                let thread_index = self.thread_assoc.current_index();
                let handle = self.command_lists.create(queue, thread_index).expect("stitching prelude command list allocation");
                let native = self.command_lists.native_list(handle);
                unsafe {
                    native.ResourceBarrier(&stitching_barriers);
                    native.Close().expect("close stitching prelude command list");
                }
                Some(handle)
            };

            let mut native_lists: Vec<Option<ID3D12CommandList>> = Vec::with_capacity(2);
            if let Some(handle) = prelude {
                native_lists.push(Some(self.command_lists.native_list(handle).cast().expect("ID3D12GraphicsCommandList7 -> ID3D12CommandList")));
            }
            native_lists.push(Some(self.command_lists.native_list(list).cast().expect("ID3D12GraphicsCommandList7 -> ID3D12CommandList")));
            unsafe { native_queue.ExecuteCommandLists(&native_lists) };

            if let Some(handle) = prelude {
                self.command_lists.free_on_submit(handle, native_queue);
            }
            self.command_lists.free_on_submit(list, native_queue);
        }
    }
}

impl Backend for Dx12Backend {
    fn config(&self) -> &Config {
        &self.config
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<ResourceHandle> {
        self.resources.create_buffer(desc)
    }

    fn create_mapped_buffer(&self, desc: BufferDesc) -> Result<(ResourceHandle, *mut u8)> {
        self.resources.create_mapped_buffer(desc)
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<ResourceHandle> {
        self.resources.create_texture(desc)
    }

    fn create_render_target(&self, desc: RenderTargetDesc) -> Result<ResourceHandle> {
        self.resources.create_render_target(desc)
    }

    fn free_resource(&self, resource: ResourceHandle) {
        self.resources.free_resource(resource)
    }

    fn create_shader_view(&self, desc: &ShaderViewDesc) -> Result<ShaderViewHandle> {
        self.shader_views.create(desc)
    }

    fn write_srvs_uavs(&self, view: ShaderViewHandle, offset: u32, views: &[ResourceViewDesc]) {
        self.shader_views.write_srvs_uavs(view, offset, views)
    }

    fn write_samplers(&self, view: ShaderViewHandle, offset: u32, samplers: &[SamplerDesc]) {
        self.shader_views.write_samplers(view, offset, samplers)
    }

    fn free_shader_view(&self, view: ShaderViewHandle) {
        self.shader_views.free(view)
    }

    fn create_graphics_pipeline_state(&self, desc: &GraphicsPsoDesc) -> Result<PipelineStateHandle> {
        self.pipelines.create_graphics(desc)
    }

    fn create_compute_pipeline_state(&self, desc: &ComputePsoDesc) -> Result<PipelineStateHandle> {
        self.pipelines.create_compute(desc)
    }

    fn create_raytracing_pipeline_state(&self, desc: &RaytracingPsoDesc) -> Result<PipelineStateHandle> {
        self.pipelines.create_raytracing(desc)
    }

    fn free_pipeline_state(&self, pso: PipelineStateHandle) {
        self.pipelines.free(pso)
    }

    fn create_fence(&self) -> Result<FenceHandle> {
        self.fences.create(&self.device.device)
    }

    fn signal_fence_cpu(&self, fence: FenceHandle, value: u64) {
        self.fences.signal_cpu(fence, value)
    }

    fn wait_fence_cpu(&self, fence: FenceHandle, value: u64) {
        self.fences.wait_cpu(fence, value)
    }

    fn get_fence_value(&self, fence: FenceHandle) -> u64 {
        self.fences.get_value(fence)
    }

    fn free_fence(&self, fence: FenceHandle) {
        self.fences.free(fence)
    }

    fn create_bottom_level_accel_struct(&self, geometries: &[ResourceHandle], build_flags: u32) -> Result<AccelStructHandle> {
        self.accel_structs.create_bottom_level(geometries, build_flags)
    }

    fn create_top_level_accel_struct(&self, max_instances: u32, build_flags: u32) -> Result<AccelStructHandle> {
        self.accel_structs.create_top_level(max_instances, build_flags)
    }

    fn free_accel_struct(&self, accel_struct: AccelStructHandle) {
        self.accel_structs.free(accel_struct)
    }

    fn create_query_range(&self, kind: QueryKind, count: u32) -> Result<QueryRangeHandle> {
        self.queries.create_query_range(kind, count)
    }

    fn free_query_range(&self, range: QueryRangeHandle) {
        self.queries.free_query_range(range)
    }

    fn create_command_list(&self, queue: QueueKind) -> Result<CommandListHandle> {
        let thread_index = self.thread_assoc.current_index();
        self.command_lists.create(queue, thread_index)
    }

    fn compile_command_list(&self, list: CommandListHandle, _queue: QueueKind, stream: &[u8]) {
        self.command_lists.with_slot_mut(list, |slot| {
            self.translator.translate(&slot.native, &mut slot.state_cache, stream);
            unsafe { slot.native.Close() }.expect("close recorded command list");
        });
    }

    fn discard_command_lists(&self, lists: &[CommandListHandle]) {
        for &list in lists {
            self.command_lists.free_on_discard(list);
        }
    }

    fn submit(&self, batch: &SubmitBatch<'_>) {
        let native_queue = self.device.queue(batch.queue).clone();

        for &(fence, value) in batch.waits {
            let native_fence = self.fences.native(fence);
            unsafe { native_queue.Wait(&native_fence, value) }.expect("ID3D12CommandQueue::Wait");
        }

        let chunk_size = self.config.max_prelude_batch_size.max(1) as usize;
        for chunk in batch.command_lists.chunks(chunk_size) {
            self.submit_chunk(batch.queue, &native_queue, chunk);
        }

        for &(fence, value) in batch.signals {
            self.fences.signal_gpu(fence, &native_queue, value);
        }
    }

    fn flush_gpu(&self) {
        for &kind in &QueueKind::ALL {
            let fence = self.fences.create(&self.device.device).expect("flush fence");
            let queue = self.device.queue(kind).clone();
            self.fences.signal_gpu(fence, &queue, 1);
            self.fences.wait_cpu(fence, 1);
            self.fences.free(fence);
        }
    }

    fn create_swapchain(&self, window: WindowHandle, initial_width: u32, initial_height: u32, mode: PresentMode) -> Result<SwapchainHandle> {
        self.swapchains.create(window, initial_width, initial_height, mode)
    }

    fn free_swapchain(&self, swapchain: SwapchainHandle) {
        self.swapchains.free(swapchain)
    }

    fn acquire_backbuffer(&self, swapchain: SwapchainHandle) -> Result<ResourceHandle> {
        self.swapchains.acquire_backbuffer(swapchain)
    }

    fn present(&self, swapchain: SwapchainHandle) -> Result<()> {
        self.swapchains.present(swapchain)
    }

    fn clear_resize_flag(&self, swapchain: SwapchainHandle) -> bool {
        self.swapchains.clear_resize_flag(swapchain)
    }

    fn resize_swapchain(&self, swapchain: SwapchainHandle, width: u32, height: u32) -> Result<()> {
        self.swapchains.resize(swapchain, width, height)
    }
}

impl Drop for Dx12Backend {
    fn drop(&mut self) {
        self.flush_gpu();
        let leaked = self.resources.leak_count()
            + self.shader_views.leak_count()
            + self.pipelines.leak_count()
            + self.accel_structs.leak_count()
            + self.fences.leak_count()
            + self.command_lists.leak_count()
            + self.swapchains.leak_count();
        if leaked > 0 {
            log::warn!(target: "gfx_ral::backend", "{leaked} pool entries still live at backend teardown");
        }
    }
}
