//! Closed enums from the external interface (§6).

/// Resource state, as used in `transition_resources` and tracked as the
/// master state on every resource node. Closed: adding a variant is a
/// coordinated change across both backends' native-state translation
/// tables.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum ResourceState {
    Undefined,
    Unknown,
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    ShaderResource,
    ShaderResourceNonPixel,
    UnorderedAccess,
    RenderTarget,
    DepthRead,
    DepthWrite,
    IndirectArgument,
    CopySrc,
    CopyDest,
    ResolveSrc,
    ResolveDest,
    Present,
    RaytraceAccelStruct,
}

/// CPU/GPU visibility of a resource's backing heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HeapKind {
    Gpu,
    Upload,
    Readback,
}

/// One of the three asynchronous queues the backend schedules across.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum QueueKind {
    Direct = 0,
    Compute = 1,
    Copy = 2,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Direct, QueueKind::Compute, QueueKind::Copy];
}

/// One of the three query heap kinds; each lives in its own handle
/// sub-range (see [`crate::handle::QUEUE_INDEX_STEP`]).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum QueryKind {
    Timestamp = 0,
    Occlusion = 1,
    PipelineStats = 2,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [QueryKind::Timestamp, QueryKind::Occlusion, QueryKind::PipelineStats];
}

/// Swapchain present mode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PresentMode {
    Synced,
    Synced2ndVblank,
    Unsynced,
    AllowTearing,
}

impl PresentMode {
    /// Whether this present mode requires the tearing flag on the native
    /// swapchain (`allow_tearing` is the only mode that does).
    pub fn requires_tearing_flag(self) -> bool {
        matches!(self, PresentMode::AllowTearing)
    }
}

/// Validation-layer aggressiveness requested at backend init.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ValidationLevel {
    Off,
    #[default]
    On,
    OnExtended,
    OnExtendedDred,
}

/// Adapter selection strategy at backend init.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AdapterPreference {
    HighestVram,
    Integrated,
    ExplicitIndex(u32),
    First,
    HighestFeatureLevel,
}

/// Shader-argument-shape kind, used as part of the root-signature cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RootSignatureKind {
    Graphics,
    Compute,
    RaytracingLocal,
    RaytracingGlobal,
}

/// Texture dimensionality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    Cube,
}
