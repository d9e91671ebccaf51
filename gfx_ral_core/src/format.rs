//! Pixel format enum (§6), closed.
//!
//! Named after component shape and data type the way the native APIs name
//! them (matches DXGI_FORMAT / VkFormat naming well enough that the
//! backend's native-format table is a straight lookup, not a computation).

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Format {
    // Single-channel.
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    R16Float,
    R16Uint,
    R16Sint,
    R32Float,
    R32Uint,
    R32Sint,

    // Two-channel.
    Rg8Unorm,
    Rg8Uint,
    Rg8Sint,
    Rg16Float,
    Rg16Uint,
    Rg16Sint,
    Rg32Float,
    Rg32Uint,
    Rg32Sint,

    // Three-channel.
    Rgb32Float,
    Rgb32Uint,
    Rgb32Sint,

    // Four-channel.
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba8Uint,
    Rgba8Sint,
    Rgba16Float,
    Rgba16Uint,
    Rgba16Sint,
    Rgba32Float,
    Rgba32Uint,
    Rgba32Sint,

    // Swizzled / packed.
    Bgra8Unorm,
    Rgb10a2Unorm,
    Rgb10a2Uint,
    Rg11b10Float,

    // Block-compressed.
    Bc1Unorm,
    Bc3Unorm,
    Bc4Unorm,
    Bc5Unorm,

    // Depth / depth-stencil.
    Depth16Unorm,
    Depth32Float,
    Depth24UnormStencil8,
    Depth32FloatStencil8,
    Stencil8,
}

impl Format {
    /// The sRGB sibling of `Rgba8Unorm`, the only format pair the spec
    /// calls out as sRGB-related.
    pub fn srgb_sibling(self) -> Option<Format> {
        match self {
            Format::Rgba8Unorm => Some(Format::Rgba8UnormSrgb),
            _ => None,
        }
    }

    pub fn is_depth_or_stencil(self) -> bool {
        matches!(
            self,
            Format::Depth16Unorm
                | Format::Depth32Float
                | Format::Depth24UnormStencil8
                | Format::Depth32FloatStencil8
                | Format::Stencil8
        )
    }

    pub fn is_block_compressed(self) -> bool {
        matches!(self, Format::Bc1Unorm | Format::Bc3Unorm | Format::Bc4Unorm | Format::Bc5Unorm)
    }

    /// Backend-fixed swapchain backbuffer format (BGRA8 unorm, no sRGB).
    pub const SWAPCHAIN_BACKBUFFER: Format = Format::Bgra8Unorm;
}
