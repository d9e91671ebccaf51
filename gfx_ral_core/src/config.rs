//! Backend configuration (§6). All values are fixed at backend creation;
//! nothing here is mutable after `Backend::new`.

use bitflags::bitflags;

use crate::state::{AdapterPreference, ValidationLevel};

bitflags! {
    /// Per-backend feature toggles. Which bits are meaningful is
    /// backend-specific (e.g. DXR tier, mesh shaders); unrecognized bits
    /// are ignored by a backend rather than rejected, so callers can pass
    /// the same superset config across backends.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct NativeFeatureFlags: u32 {
        const RAYTRACING        = 1 << 0;
        const MESH_SHADERS      = 1 << 1;
        const VARIABLE_RATE_SHADING = 1 << 2;
        const ENHANCED_BARRIERS = 1 << 3;
    }
}

/// Per-queue-kind command-allocator sizing.
#[derive(Clone, Copy, Debug)]
pub struct CmdListAllocatorConfig {
    pub num_allocators_per_thread: u32,
    pub num_cmdlists_per_allocator: u32,
}

impl Default for CmdListAllocatorConfig {
    fn default() -> Self {
        Self { num_allocators_per_thread: 2, num_cmdlists_per_allocator: 4 }
    }
}

/// Fixed-at-creation configuration for an entire backend instance.
#[derive(Clone, Debug)]
pub struct Config {
    pub validation: ValidationLevel,
    pub adapter: AdapterPreference,

    pub num_backbuffers: u32,
    pub num_threads: u32,

    pub max_num_resources: u32,
    pub max_num_cbvs: u32,
    pub max_num_srvs: u32,
    pub max_num_uavs: u32,
    pub max_num_samplers: u32,

    pub max_num_pipeline_states: u32,
    pub max_num_raytrace_pipeline_states: u32,
    pub max_num_shader_views: u32,

    pub max_num_fences: u32,
    pub max_num_accel_structs: u32,
    pub max_num_swapchains: u32,
    pub max_num_query_ranges: u32,

    pub direct_cmdlists: CmdListAllocatorConfig,
    pub compute_cmdlists: CmdListAllocatorConfig,
    pub copy_cmdlists: CmdListAllocatorConfig,

    pub present_from_compute_queue: bool,
    pub native_feature_flags: NativeFeatureFlags,

    /// Maximum number of command lists stitched into one prelude batch
    /// before a submit is split (Open Question in §9: made configurable
    /// here rather than hard-coded, default matches the observed "16").
    pub max_prelude_batch_size: u32,

    /// Descriptor page size for the shader-view descriptor allocators
    /// (§4.8); default matches the observed "8".
    pub shader_view_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validation: ValidationLevel::On,
            adapter: AdapterPreference::HighestVram,
            num_backbuffers: 3,
            num_threads: 1,
            max_num_resources: 4096,
            max_num_cbvs: 4096,
            max_num_srvs: 4096,
            max_num_uavs: 1024,
            max_num_samplers: 256,
            max_num_pipeline_states: 256,
            max_num_raytrace_pipeline_states: 64,
            max_num_shader_views: 4096,
            max_num_fences: 256,
            max_num_accel_structs: 256,
            max_num_swapchains: 4,
            max_num_query_ranges: 64,
            direct_cmdlists: CmdListAllocatorConfig::default(),
            compute_cmdlists: CmdListAllocatorConfig::default(),
            copy_cmdlists: CmdListAllocatorConfig::default(),
            present_from_compute_queue: false,
            native_feature_flags: NativeFeatureFlags::empty(),
            max_prelude_batch_size: 16,
            shader_view_page_size: 8,
        }
    }
}

impl Config {
    pub fn cmdlists_for(&self, queue: crate::state::QueueKind) -> &CmdListAllocatorConfig {
        match queue {
            crate::state::QueueKind::Direct => &self.direct_cmdlists,
            crate::state::QueueKind::Compute => &self.compute_cmdlists,
            crate::state::QueueKind::Copy => &self.copy_cmdlists,
        }
    }
}
