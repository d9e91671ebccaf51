//! The capability interface (§9 "Pointer graphs and polymorphism"):
//! the closed set of public operations from §2 and §6, expressed as a
//! trait so a D3D12 backend and a future Vulkan backend can implement the
//! same contract. Per-command dispatch inside a translated command list is
//! *not* part of this trait — that dispatch is a closed jump table over
//! [`crate::command_stream::Command`], handled entirely inside each
//! backend's translator.

use crate::config::Config;
use crate::handle::{AccelStructHandle, CommandListHandle, FenceHandle, PipelineStateHandle, QueryRangeHandle, ResourceHandle, ShaderViewHandle, SwapchainHandle};
use crate::pso_desc::{ComputePsoDesc, GraphicsPsoDesc, RaytracingPsoDesc};
use crate::resource_desc::{BufferDesc, RenderTargetDesc, SamplerDesc, ShaderViewDesc, TextureDesc};
use crate::result::Result;
use crate::state::{PresentMode, QueryKind, QueueKind};

/// One command list plus the queue it was recorded for, as passed to
/// `submit`.
pub struct SubmitBatch<'a> {
    pub queue: QueueKind,
    pub command_lists: &'a [CommandListHandle],
    /// Fences to wait on (value, fence) before this batch executes.
    pub waits: &'a [(FenceHandle, u64)],
    /// Fences to signal (value, fence) on completion.
    pub signals: &'a [(FenceHandle, u64)],
}

/// The backend-agnostic public API surface (§2, §6). Implemented by
/// `gfx_ral_dx12::Dx12Backend` and, prospectively, a Vulkan backend behind
/// the same contract.
pub trait Backend {
    fn config(&self) -> &Config;

    // -- resources --------------------------------------------------
    fn create_buffer(&self, desc: BufferDesc) -> Result<ResourceHandle>;
    fn create_mapped_buffer(&self, desc: BufferDesc) -> Result<(ResourceHandle, *mut u8)>;
    fn create_texture(&self, desc: TextureDesc) -> Result<ResourceHandle>;
    fn create_render_target(&self, desc: RenderTargetDesc) -> Result<ResourceHandle>;
    fn free_resource(&self, resource: ResourceHandle);

    // -- shader views -------------------------------------------------
    fn create_shader_view(&self, desc: &ShaderViewDesc) -> Result<ShaderViewHandle>;
    fn write_srvs_uavs(&self, view: ShaderViewHandle, offset: u32, views: &[crate::resource_desc::ResourceViewDesc]);
    fn write_samplers(&self, view: ShaderViewHandle, offset: u32, samplers: &[SamplerDesc]);
    fn free_shader_view(&self, view: ShaderViewHandle);

    // -- pipeline states ----------------------------------------------
    fn create_graphics_pipeline_state(&self, desc: &GraphicsPsoDesc) -> Result<PipelineStateHandle>;
    fn create_compute_pipeline_state(&self, desc: &ComputePsoDesc) -> Result<PipelineStateHandle>;
    fn create_raytracing_pipeline_state(&self, desc: &RaytracingPsoDesc) -> Result<PipelineStateHandle>;
    fn free_pipeline_state(&self, pso: PipelineStateHandle);

    // -- fences ---------------------------------------------------------
    fn create_fence(&self) -> Result<FenceHandle>;
    fn signal_fence_cpu(&self, fence: FenceHandle, value: u64);
    fn wait_fence_cpu(&self, fence: FenceHandle, value: u64);
    fn get_fence_value(&self, fence: FenceHandle) -> u64;
    fn free_fence(&self, fence: FenceHandle);

    // -- acceleration structures ----------------------------------------
    fn create_bottom_level_accel_struct(&self, geometries: &[crate::handle::ResourceHandle], build_flags: u32) -> Result<AccelStructHandle>;
    fn create_top_level_accel_struct(&self, max_instances: u32, build_flags: u32) -> Result<AccelStructHandle>;
    fn free_accel_struct(&self, accel_struct: AccelStructHandle);

    // -- queries ----------------------------------------------------------
    fn create_query_range(&self, kind: QueryKind, count: u32) -> Result<QueryRangeHandle>;
    fn free_query_range(&self, range: QueryRangeHandle);

    // -- command lists ----------------------------------------------------
    fn create_command_list(&self, queue: QueueKind) -> Result<CommandListHandle>;
    fn compile_command_list(&self, list: CommandListHandle, queue: QueueKind, stream: &[u8]);
    fn discard_command_lists(&self, lists: &[CommandListHandle]);

    // -- submission ---------------------------------------------------
    fn submit(&self, batch: &SubmitBatch<'_>);
    fn flush_gpu(&self);

    // -- swapchain --------------------------------------------------------
    fn create_swapchain(&self, window: crate::WindowHandle, initial_width: u32, initial_height: u32, mode: PresentMode) -> Result<SwapchainHandle>;
    fn free_swapchain(&self, swapchain: SwapchainHandle);
    fn acquire_backbuffer(&self, swapchain: SwapchainHandle) -> Result<ResourceHandle>;
    fn present(&self, swapchain: SwapchainHandle) -> Result<()>;
    /// `true` exactly once after a presentation failure signals the
    /// swapchain needs `resize`; calling this clears the flag (§7).
    fn clear_resize_flag(&self, swapchain: SwapchainHandle) -> bool;
    fn resize_swapchain(&self, swapchain: SwapchainHandle, width: u32, height: u32) -> Result<()>;
}
