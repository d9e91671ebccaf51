//! Backend-agnostic resource and command management substrate for a
//! D3D12/Vulkan graphics HAL.
//!
//! This crate is the "core" from the design document: the handle-pool
//! allocators, the state-stitching incomplete-state cache, the command
//! stream encoder/decoder, the descriptor-page allocator, the root-signature
//! cache key, the shader-table record layout, and the [`Backend`] capability
//! trait a concrete backend (e.g. `gfx_ral_dx12`) implements. It owns no
//! native graphics objects itself — those live behind the trait in a
//! backend crate.

pub mod backend;
pub mod cache_map;
pub mod command_stream;
pub mod config;
pub mod format;
pub mod handle;
pub mod incomplete_state_cache;
pub mod page_allocator;
pub mod pool;
pub mod pso_desc;
pub mod resource_desc;
pub mod result;
pub mod shader_arg;
pub mod shader_table;
pub mod state;
pub mod thread_association;

pub use backend::{Backend, SubmitBatch};
pub use format::Format;
pub use handle::{
    AccelStructHandle, CommandListHandle, FenceHandle, GenerationalHandle, PipelineStateHandle, QueryRangeHandle, ResourceHandle, ShaderViewHandle,
    SwapchainHandle,
};
pub use result::{Error, Result};

/// Opaque platform window handle. Window creation and the platform event
/// loop are out of scope (§1); this is just the token a caller passes to
/// `create_swapchain` to name a surface. Concretely a raw HWND on Windows;
/// kept as an untyped pointer-sized value so this crate does not depend on
/// a windowing crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WindowHandle(pub usize);
