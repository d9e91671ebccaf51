//! D3D12 backend for `gfx_ral_core`: native device/queue creation and
//! command-stream translation.
//!
//! [`Dx12Backend`] assembles every pool in this crate behind
//! [`gfx_ral_core::Backend`] and owns the single state-stitching `submit`
//! pass (§4.2) that reconciles per-list incomplete state against each
//! resource's master state.

pub mod accel_struct_pool;
pub mod backend;
pub mod cmd_allocator_bundle;
pub mod cmd_list_pool;
pub mod descriptor_heap;
pub mod device;
pub mod fence_pool;
pub mod pipeline_state_pool;
pub mod query_pool;
pub mod resource_pool;
pub mod root_sig_cache;
pub mod shader_view_pool;
pub mod swapchain_pool;
pub mod translator;
pub mod utils;

pub use backend::Dx12Backend;
