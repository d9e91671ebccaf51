//! Pipeline-state creation descriptors (§3).

use crate::format::Format;
use crate::shader_arg::ShaderArgShape;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct VertexAttribute {
    pub semantic_index: u32,
    pub format: Format,
    pub offset_bytes: u32,
    pub input_slot: u32,
}

#[derive(Clone, Debug, Default)]
pub struct VertexFormat {
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct FramebufferConfig {
    pub render_target_formats: [Option<Format>; crate::command_stream::MAX_RENDER_TARGETS],
    pub depth_stencil_format: Option<Format>,
    pub sample_count: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PrimitiveConfig {
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub wireframe: bool,
}

/// Opaque compiled shader binary; shader compilation is out of scope
/// (§1) and binaries enter the HAL as already-compiled spans.
#[derive(Clone, Debug)]
pub struct ShaderBinary {
    pub bytes: Vec<u8>,
    pub entry_point: String,
}

#[derive(Clone, Debug, Default)]
pub struct GraphicsShaderStages {
    pub vertex: Option<ShaderBinary>,
    pub pixel: Option<ShaderBinary>,
    pub hull: Option<ShaderBinary>,
    pub domain: Option<ShaderBinary>,
    pub geometry: Option<ShaderBinary>,
}

#[derive(Clone, Debug)]
pub struct GraphicsPsoDesc {
    pub vertex_format: VertexFormat,
    pub framebuffer: FramebufferConfig,
    pub shaders: GraphicsShaderStages,
    pub primitive_config: PrimitiveConfig,
    pub arg_shapes: Vec<ShaderArgShape>,
    pub has_root_constants: bool,
}

#[derive(Clone, Debug)]
pub struct ComputePsoDesc {
    pub shader: ShaderBinary,
    pub arg_shapes: Vec<ShaderArgShape>,
    pub has_root_constants: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShaderLibraryExportKind {
    RayGeneration,
    Miss,
    ClosestHit,
    AnyHit,
    Intersection,
    Callable,
}

#[derive(Clone, Debug)]
pub struct ShaderLibraryExport {
    pub kind: ShaderLibraryExportKind,
    pub export_name: String,
    pub arg_shapes: Vec<ShaderArgShape>,
    pub has_root_constants: bool,
}

#[derive(Clone, Debug)]
pub struct ShaderLibrary {
    pub binary: ShaderBinary,
    pub exports: Vec<ShaderLibraryExport>,
}

#[derive(Clone, Debug)]
pub struct HitGroup {
    pub name: String,
    pub closest_hit_export: Option<String>,
    pub any_hit_export: Option<String>,
    pub intersection_export: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RaytracingPsoDesc {
    pub libraries: Vec<ShaderLibrary>,
    pub hit_groups: Vec<HitGroup>,
    pub max_recursion_depth: u32,
    pub max_payload_size_bytes: u32,
    pub max_attribute_size_bytes: u32,
    /// Shape of the raytracing-global root signature, shared by the whole
    /// pipeline (distinct from each export's local root signature, which is
    /// derived from its own `arg_shapes`).
    pub global_arg_shapes: Vec<ShaderArgShape>,
    pub global_has_root_constants: bool,
}
