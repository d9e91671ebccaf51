//! Native-type lookup tables and `HRESULT` -> [`gfx_ral_core::Error`]
//! conversion (grounded in `onca_ral_dx12::utils::ToRalError`/`ToDx`).
//!
//! Keeping these as straight array lookups (declaration order of the
//! backend-agnostic enum matches declaration order of the lookup table)
//! means the backend's native-format table is a lookup, not a computation,
//! per spec.md §9's framing of the format enum.

use gfx_ral_core::format::Format;
use gfx_ral_core::resource_desc::{AddressMode, FilterMode};
use gfx_ral_core::state::{HeapKind, QueueKind, ResourceState};
use gfx_ral_core::Error;
use windows::core::Error as WinError;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

pub trait ToRalError {
    fn to_ral_error(&self, what: &'static str) -> Error;
}

impl ToRalError for WinError {
    fn to_ral_error(&self, what: &'static str) -> Error {
        Error::Api { what, detail: self.message().to_string() }
    }
}

pub fn format_to_dxgi(format: Format) -> DXGI_FORMAT {
    match format {
        Format::R8Unorm => DXGI_FORMAT_R8_UNORM,
        Format::R8Snorm => DXGI_FORMAT_R8_SNORM,
        Format::R8Uint => DXGI_FORMAT_R8_UINT,
        Format::R8Sint => DXGI_FORMAT_R8_SINT,
        Format::R16Float => DXGI_FORMAT_R16_FLOAT,
        Format::R16Uint => DXGI_FORMAT_R16_UINT,
        Format::R16Sint => DXGI_FORMAT_R16_SINT,
        Format::R32Float => DXGI_FORMAT_R32_FLOAT,
        Format::R32Uint => DXGI_FORMAT_R32_UINT,
        Format::R32Sint => DXGI_FORMAT_R32_SINT,
        Format::Rg8Unorm => DXGI_FORMAT_R8G8_UNORM,
        Format::Rg8Uint => DXGI_FORMAT_R8G8_UINT,
        Format::Rg8Sint => DXGI_FORMAT_R8G8_SINT,
        Format::Rg16Float => DXGI_FORMAT_R16G16_FLOAT,
        Format::Rg16Uint => DXGI_FORMAT_R16G16_UINT,
        Format::Rg16Sint => DXGI_FORMAT_R16G16_SINT,
        Format::Rg32Float => DXGI_FORMAT_R32G32_FLOAT,
        Format::Rg32Uint => DXGI_FORMAT_R32G32_UINT,
        Format::Rg32Sint => DXGI_FORMAT_R32G32_SINT,
        Format::Rgb32Float => DXGI_FORMAT_R32G32B32_FLOAT,
        Format::Rgb32Uint => DXGI_FORMAT_R32G32B32_UINT,
        Format::Rgb32Sint => DXGI_FORMAT_R32G32B32_SINT,
        Format::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        Format::Rgba8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        Format::Rgba8Uint => DXGI_FORMAT_R8G8B8A8_UINT,
        Format::Rgba8Sint => DXGI_FORMAT_R8G8B8A8_SINT,
        Format::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        Format::Rgba16Uint => DXGI_FORMAT_R16G16B16A16_UINT,
        Format::Rgba16Sint => DXGI_FORMAT_R16G16B16A16_SINT,
        Format::Rgba32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        Format::Rgba32Uint => DXGI_FORMAT_R32G32B32A32_UINT,
        Format::Rgba32Sint => DXGI_FORMAT_R32G32B32A32_SINT,
        Format::Bgra8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        Format::Rgb10a2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        Format::Rgb10a2Uint => DXGI_FORMAT_R10G10B10A2_UINT,
        Format::Rg11b10Float => DXGI_FORMAT_R11G11B10_FLOAT,
        Format::Bc1Unorm => DXGI_FORMAT_BC1_UNORM,
        Format::Bc3Unorm => DXGI_FORMAT_BC3_UNORM,
        Format::Bc4Unorm => DXGI_FORMAT_BC4_UNORM,
        Format::Bc5Unorm => DXGI_FORMAT_BC5_UNORM,
        Format::Depth16Unorm => DXGI_FORMAT_D16_UNORM,
        Format::Depth32Float => DXGI_FORMAT_D32_FLOAT,
        Format::Depth24UnormStencil8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
        Format::Depth32FloatStencil8 => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
        Format::Stencil8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
    }
}

/// Whole-resource states only; `TransitionImageSlices` barriers are built
/// directly by the translator from the same table (§4.7 step 5).
pub fn state_to_dx12(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Undefined => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::Unknown => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::VertexBuffer => D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::IndexBuffer => D3D12_RESOURCE_STATE_INDEX_BUFFER,
        ResourceState::ConstantBuffer => D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::ShaderResource => D3D12_RESOURCE_STATE_ALL_SHADER_RESOURCE,
        ResourceState::ShaderResourceNonPixel => D3D12_RESOURCE_STATE_NON_PIXEL_SHADER_RESOURCE,
        ResourceState::UnorderedAccess => D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::DepthRead => D3D12_RESOURCE_STATE_DEPTH_READ,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
        ResourceState::IndirectArgument => D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
        ResourceState::CopySrc => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::ResolveSrc => D3D12_RESOURCE_STATE_RESOLVE_SOURCE,
        ResourceState::ResolveDest => D3D12_RESOURCE_STATE_RESOLVE_DEST,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RaytraceAccelStruct => D3D12_RESOURCE_STATE_RAYTRACING_ACCELERATION_STRUCTURE,
    }
}

pub fn heap_kind_to_dx12(kind: HeapKind) -> D3D12_HEAP_TYPE {
    match kind {
        HeapKind::Gpu => D3D12_HEAP_TYPE_DEFAULT,
        HeapKind::Upload => D3D12_HEAP_TYPE_UPLOAD,
        HeapKind::Readback => D3D12_HEAP_TYPE_READBACK,
    }
}

pub fn queue_kind_to_dx12(kind: QueueKind) -> D3D12_COMMAND_LIST_TYPE {
    match kind {
        QueueKind::Direct => D3D12_COMMAND_LIST_TYPE_DIRECT,
        QueueKind::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
        QueueKind::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
    }
}

/// Returns the native filter plus the max-anisotropy value D3D12 ignores
/// outside `D3D12_FILTER_ANISOTROPIC` but still wants populated in the desc.
pub fn filter_to_dx12(filter: FilterMode) -> (D3D12_FILTER, u32) {
    match filter {
        FilterMode::Point => (D3D12_FILTER_MIN_MAG_MIP_POINT, 1),
        FilterMode::Linear => (D3D12_FILTER_MIN_MAG_MIP_LINEAR, 1),
        FilterMode::Anisotropic { max_anisotropy } => (D3D12_FILTER_ANISOTROPIC, max_anisotropy as u32),
    }
}

pub fn address_mode_to_dx12(mode: AddressMode) -> D3D12_TEXTURE_ADDRESS_MODE {
    match mode {
        AddressMode::Wrap => D3D12_TEXTURE_ADDRESS_MODE_WRAP,
        AddressMode::Clamp => D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        AddressMode::Mirror => D3D12_TEXTURE_ADDRESS_MODE_MIRROR,
        AddressMode::Border => D3D12_TEXTURE_ADDRESS_MODE_BORDER,
    }
}
