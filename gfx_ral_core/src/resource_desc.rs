//! Creation-time descriptors for resources, shader views, and samplers
//! (§3). These are backend-agnostic inputs; the backend's resource pool
//! turns them into native allocations.

use crate::format::Format;
use crate::state::{HeapKind, TextureDimension};

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BufferDesc {
    pub size_bytes: u64,
    /// Element stride, for index/vertex interpretation; `0` if not
    /// applicable (e.g. a raw byte-address or constant buffer).
    pub stride_bytes: u32,
    pub heap: HeapKind,
    pub allow_unordered_access: bool,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct TextureDesc {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub depth_or_array_size: u32,
    pub mip_levels: u32,
    pub dimension: TextureDimension,
    pub allow_unordered_access: bool,
    pub allow_render_target: bool,
    pub allow_depth_stencil: bool,
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct ClearValue {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u8,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RenderTargetDesc {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub array_size: u32,
    pub optimized_clear: Option<ClearValue>,
}

/// A single descriptor to be created in a shader view's SRV+UAV range.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ResourceViewDesc {
    ShaderResourceBuffer { resource: crate::handle::ResourceHandle, first_element: u32, num_elements: u32, structure_stride_bytes: u32 },
    ShaderResourceTexture { resource: crate::handle::ResourceHandle, most_detailed_mip: u32, mip_levels: u32 },
    UnorderedAccessBuffer { resource: crate::handle::ResourceHandle, first_element: u32, num_elements: u32, structure_stride_bytes: u32 },
    UnorderedAccessTexture { resource: crate::handle::ResourceHandle, mip_slice: u32 },
    AccelerationStructure { accel_struct: crate::handle::AccelStructHandle },
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum FilterMode {
    Point,
    Linear,
    Anisotropic { max_anisotropy: u8 },
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Mirror,
    Border,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub border_color: [f32; 4],
}

/// Full creation description for a shader view: its SRV+UAV contents and
/// its sampler contents. Either (or both) may be empty; a fully-empty
/// shader view is a valid handle whose GPU descriptors are both null
/// (§8 boundary behavior).
#[derive(Clone, Debug, Default)]
pub struct ShaderViewDesc {
    pub srv_uavs: Vec<ResourceViewDesc>,
    pub samplers: Vec<SamplerDesc>,
}
