//! Graphics/compute/raytracing pipeline-state pools (§3, §4.9, §4.10).
//!
//! Graphics and compute state objects go through
//! `ID3D12Device::CreateGraphicsPipelineState`/`CreateComputePipelineState`
//! against a directly-populated `D3D12_GRAPHICS_PIPELINE_STATE_DESC`/
//! `D3D12_COMPUTE_PIPELINE_STATE_DESC` — a deliberate simplification of
//! `onca_ral_dx12::pipeline::Pipeline::new_graphics`'s subobject-stream
//! builder (`PipelineStream`), which exists there mainly to let one stream
//! type serve pipelines with wildly different subobject sets. This backend
//! has exactly one shape per PSO kind, so the plain desc struct says the
//! same thing with far less machinery.
//!
//! Raytracing state objects are unavoidably state-object-stream based (DXR
//! has no flat desc struct), built from
//! `windows::Win32::Graphics::Direct3D12::D3D12_STATE_SUBOBJECT` entries per
//! `D3D12CreateStateObject`, grounded in the DXR pipeline shape §4 describes:
//! one DXIL library per `ShaderLibrary`, one hit-group subobject per
//! `HitGroup`, a shared shader-config and pipeline-config, and a global root
//! signature built from `global_arg_shapes`.

use std::ffi::c_void;

use gfx_ral_core::handle::{PipelineStateHandle, PIPELINE_RT_INDEX_OFFSET};
use gfx_ral_core::pool::HandlePool;
use gfx_ral_core::pso_desc::{ComputePsoDesc, CullMode, GraphicsPsoDesc, PrimitiveTopology, RaytracingPsoDesc, ShaderLibraryExportKind};
use gfx_ral_core::shader_arg::RootSignatureKey;
use gfx_ral_core::state::RootSignatureKind;
use gfx_ral_core::Result;
use parking_lot::Mutex;
use windows::core::{PCSTR, PCWSTR};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;

use crate::root_sig_cache::{ArgumentBinding, RootSigCache};
use crate::utils::{format_to_dxgi, ToRalError};

pub struct GraphicsPipelineNode {
    pub pso: ID3D12PipelineState,
    pub root_sig: ID3D12RootSignature,
    pub arguments: Vec<ArgumentBinding>,
    pub root_constants_param: Option<u32>,
    pub primitive_topology: PrimitiveTopology,
    pub is_compute: bool,
}

pub struct RaytracingExportInfo {
    pub export_name: String,
    pub kind: ShaderLibraryExportKind,
    pub arguments: Vec<ArgumentBinding>,
    pub root_constants_param: Option<u32>,
}

pub struct RaytracingPipelineNode {
    pub state_object: ID3D12StateObject,
    pub properties: ID3D12StateObjectProperties,
    pub exports: Vec<RaytracingExportInfo>,
    pub hit_group_names: Vec<String>,
    pub global_root_sig: ID3D12RootSignature,
    pub global_arguments: Vec<ArgumentBinding>,
    pub global_root_constants_param: Option<u32>,
}

pub struct PipelineStatePool<'a> {
    device: ID3D12Device10,
    root_sigs: &'a RootSigCache,
    graphics_compute: Mutex<HandlePool<GraphicsPipelineNode>>,
    raytracing: Mutex<HandlePool<RaytracingPipelineNode>>,
}

impl<'a> PipelineStatePool<'a> {
    pub fn new(device: ID3D12Device10, root_sigs: &'a RootSigCache, max_num_pipeline_states: u32, max_num_raytrace_pipeline_states: u32) -> Self {
        Self {
            device,
            root_sigs,
            graphics_compute: Mutex::new(HandlePool::new(max_num_pipeline_states.max(1) as usize)),
            raytracing: Mutex::new(HandlePool::new(max_num_raytrace_pipeline_states.max(1) as usize)),
        }
    }

    pub fn create_graphics(&self, desc: &GraphicsPsoDesc) -> Result<PipelineStateHandle> {
        let key = RootSignatureKey { arg_shapes: desc.arg_shapes.clone(), has_root_constants: desc.has_root_constants, kind: RootSignatureKind::Graphics };
        let root_sig_ref = self.root_sigs.get_or_create(&key)?;
        let (root_sig, arguments, root_constants_param) = root_sig_ref.with(|e| (e.root_sig.clone(), e.arguments.clone(), e.root_constants_param));

        let input_elements: Vec<D3D12_INPUT_ELEMENT_DESC> = desc
            .vertex_format
            .attributes
            .iter()
            .map(|attr| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(ATTRIB_SEMANTIC.as_ptr()),
                SemanticIndex: attr.semantic_index,
                Format: format_to_dxgi(attr.format),
                InputSlot: attr.input_slot,
                AlignedByteOffset: attr.offset_bytes,
                InputSlotClass: D3D12_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();

        let vs = shader_bytecode(desc.shaders.vertex.as_ref());
        let ps = shader_bytecode(desc.shaders.pixel.as_ref());
        let hs = shader_bytecode(desc.shaders.hull.as_ref());
        let ds = shader_bytecode(desc.shaders.domain.as_ref());
        let gs = shader_bytecode(desc.shaders.geometry.as_ref());

        let mut rtv_formats = [windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN; 8];
        let mut num_rtvs = 0u32;
        for (i, fmt) in desc.framebuffer.render_target_formats.iter().enumerate() {
            if let Some(fmt) = fmt {
                rtv_formats[i] = format_to_dxgi(*fmt);
                num_rtvs = (i + 1) as u32;
            }
        }

        let raster_desc = D3D12_RASTERIZER_DESC {
            FillMode: if desc.primitive_config.wireframe { D3D12_FILL_MODE_WIREFRAME } else { D3D12_FILL_MODE_SOLID },
            CullMode: match desc.primitive_config.cull_mode {
                CullMode::None => D3D12_CULL_MODE_NONE,
                CullMode::Front => D3D12_CULL_MODE_FRONT,
                CullMode::Back => D3D12_CULL_MODE_BACK,
            },
            FrontCounterClockwise: false.into(),
            DepthClipEnable: true.into(),
            ..Default::default()
        };

        let depth_stencil_desc = D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: desc.primitive_config.depth_test_enabled.into(),
            DepthWriteMask: if desc.primitive_config.depth_write_enabled { D3D12_DEPTH_WRITE_MASK_ALL } else { D3D12_DEPTH_WRITE_MASK_ZERO },
            DepthFunc: D3D12_COMPARISON_FUNC_LESS_EQUAL,
            StencilEnable: false.into(),
            ..Default::default()
        };

        let blend_desc = D3D12_BLEND_DESC {
            RenderTarget: [default_render_target_blend(); 8],
            ..Default::default()
        };

        let native_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            pRootSignature: windows::core::ManuallyDrop::new(&root_sig),
            VS: vs,
            PS: ps,
            DS: ds,
            HS: hs,
            GS: gs,
            BlendState: blend_desc,
            SampleMask: u32::MAX,
            RasterizerState: raster_desc,
            DepthStencilState: depth_stencil_desc,
            InputLayout: D3D12_INPUT_LAYOUT_DESC { pInputElementDescs: input_elements.as_ptr(), NumElements: input_elements.len() as u32 },
            PrimitiveTopologyType: topology_type(desc.primitive_config.topology),
            NumRenderTargets: num_rtvs,
            RTVFormats: rtv_formats,
            DSVFormat: desc.framebuffer.depth_stencil_format.map(format_to_dxgi).unwrap_or(windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN),
            SampleDesc: DXGI_SAMPLE_DESC { Count: desc.framebuffer.sample_count.max(1), Quality: 0 },
            NodeMask: 0,
            ..Default::default()
        };

        let pso: ID3D12PipelineState = unsafe { self.device.CreateGraphicsPipelineState(&native_desc) }.map_err(|e| e.to_ral_error("CreateGraphicsPipelineState"))?;

        let index = self.graphics_compute.lock().acquire(GraphicsPipelineNode {
            pso,
            root_sig,
            arguments,
            root_constants_param,
            primitive_topology: desc.primitive_config.topology,
            is_compute: false,
        });
        Ok(PipelineStateHandle::from_index(index))
    }

    pub fn create_compute(&self, desc: &ComputePsoDesc) -> Result<PipelineStateHandle> {
        let key = RootSignatureKey { arg_shapes: desc.arg_shapes.clone(), has_root_constants: desc.has_root_constants, kind: RootSignatureKind::Compute };
        let root_sig_ref = self.root_sigs.get_or_create(&key)?;
        let (root_sig, arguments, root_constants_param) = root_sig_ref.with(|e| (e.root_sig.clone(), e.arguments.clone(), e.root_constants_param));

        let native_desc = D3D12_COMPUTE_PIPELINE_STATE_DESC {
            pRootSignature: windows::core::ManuallyDrop::new(&root_sig),
            CS: shader_bytecode(Some(&desc.shader)),
            NodeMask: 0,
            ..Default::default()
        };

        let pso: ID3D12PipelineState = unsafe { self.device.CreateComputePipelineState(&native_desc) }.map_err(|e| e.to_ral_error("CreateComputePipelineState"))?;

        let index = self.graphics_compute.lock().acquire(GraphicsPipelineNode {
            pso,
            root_sig,
            arguments,
            root_constants_param,
            primitive_topology: PrimitiveTopology::TriangleList,
            is_compute: true,
        });
        Ok(PipelineStateHandle::from_index(index))
    }

    pub fn create_raytracing(&self, desc: &RaytracingPsoDesc) -> Result<PipelineStateHandle> {
        let global_key =
            RootSignatureKey { arg_shapes: desc.global_arg_shapes.clone(), has_root_constants: desc.global_has_root_constants, kind: RootSignatureKind::RaytracingGlobal };
        let global_ref = self.root_sigs.get_or_create(&global_key)?;
        let (global_root_sig, global_bindings, global_root_constants_param) = global_ref.with(|e| (e.root_sig.clone(), e.arguments.clone(), e.root_constants_param));

        // Per-export local root signatures, one per distinct arg-shape list
        // an export declares; exports sharing a shape share a native local
        // root signature the same way graphics/compute PSOs share theirs.
        let mut export_names: Vec<Vec<u16>> = Vec::new();
        let mut export_infos: Vec<RaytracingExportInfo> = Vec::new();
        let mut local_root_sigs: Vec<ID3D12RootSignature> = Vec::new();
        let mut local_root_sig_for_export: Vec<usize> = Vec::new();

        for lib in &desc.libraries {
            for export in &lib.exports {
                let key =
                    RootSignatureKey { arg_shapes: export.arg_shapes.clone(), has_root_constants: export.has_root_constants, kind: RootSignatureKind::RaytracingLocal };
                let local_ref = self.root_sigs.get_or_create(&key)?;
                let (local_sig, bindings, rc_param) = local_ref.with(|e| (e.root_sig.clone(), e.arguments.clone(), e.root_constants_param));
                local_root_sig_for_export.push(local_root_sigs.len());
                local_root_sigs.push(local_sig);
                export_infos.push(RaytracingExportInfo { export_name: export.export_name.clone(), kind: export.kind, arguments: bindings, root_constants_param: rc_param });
                export_names.push(wide_z(&export.export_name));
            }
        }

        let mut subobjects: Vec<D3D12_STATE_SUBOBJECT> = Vec::new();

        // Storage kept alive for the lifetime of `D3D12CreateStateObject`.
        let mut dxil_descs: Vec<D3D12_DXIL_LIBRARY_DESC> = Vec::new();
        let mut export_descs_per_lib: Vec<Vec<D3D12_EXPORT_DESC>> = Vec::new();
        let mut hit_group_descs: Vec<D3D12_HIT_GROUP_DESC> = Vec::new();
        let mut hit_group_name_storage: Vec<(Vec<u16>, Vec<u16>, Vec<u16>, Vec<u16>)> = Vec::new();
        let mut association_exports: Vec<Vec<PCWSTR>> = Vec::new();

        let mut flat_export_index = 0usize;
        for lib in &desc.libraries {
            let mut exports_for_lib = Vec::with_capacity(lib.exports.len());
            for export in &lib.exports {
                let name_ptr = PCWSTR(export_names[flat_export_index].as_ptr());
                exports_for_lib.push(D3D12_EXPORT_DESC { Name: name_ptr, ExportToRename: PCWSTR::null(), Flags: D3D12_EXPORT_FLAG_NONE });
                flat_export_index += 1;
            }
            export_descs_per_lib.push(exports_for_lib);

            dxil_descs.push(D3D12_DXIL_LIBRARY_DESC {
                DXILLibrary: D3D12_SHADER_BYTECODE { pShaderBytecode: lib.binary.bytes.as_ptr() as *const c_void, BytecodeLength: lib.binary.bytes.len() },
                NumExports: lib.exports.len() as u32,
                pExports: std::ptr::null(),
            });
        }
        for (i, lib_descs) in export_descs_per_lib.iter().enumerate() {
            dxil_descs[i].pExports = lib_descs.as_ptr();
        }
        for dxil_desc in &dxil_descs {
            subobjects.push(D3D12_STATE_SUBOBJECT { Type: D3D12_STATE_SUBOBJECT_TYPE_DXIL_LIBRARY, pDesc: dxil_desc as *const _ as *const c_void });
        }

        for group in &desc.hit_groups {
            let group_name = wide_z(&group.name);
            let closest = group.closest_hit_export.as_deref().map(wide_z).unwrap_or_default();
            let any_hit = group.any_hit_export.as_deref().map(wide_z).unwrap_or_default();
            let intersection = group.intersection_export.as_deref().map(wide_z).unwrap_or_default();
            hit_group_name_storage.push((group_name, closest, any_hit, intersection));
        }
        for (group, (group_name, closest, any_hit, intersection)) in desc.hit_groups.iter().zip(hit_group_name_storage.iter()) {
            let group_type = if group.intersection_export.is_some() { D3D12_HIT_GROUP_TYPE_PROCEDURAL_PRIMITIVE } else { D3D12_HIT_GROUP_TYPE_TRIANGLES };
            hit_group_descs.push(D3D12_HIT_GROUP_DESC {
                HitGroupExport: PCWSTR(group_name.as_ptr()),
                Type: group_type,
                AnyHitShaderImport: if group.any_hit_export.is_some() { PCWSTR(any_hit.as_ptr()) } else { PCWSTR::null() },
                ClosestHitShaderImport: if group.closest_hit_export.is_some() { PCWSTR(closest.as_ptr()) } else { PCWSTR::null() },
                IntersectionShaderImport: if group.intersection_export.is_some() { PCWSTR(intersection.as_ptr()) } else { PCWSTR::null() },
            });
        }
        for hit_group_desc in &hit_group_descs {
            subobjects.push(D3D12_STATE_SUBOBJECT { Type: D3D12_STATE_SUBOBJECT_TYPE_HIT_GROUP, pDesc: hit_group_desc as *const _ as *const c_void });
        }

        let shader_config =
            D3D12_RAYTRACING_SHADER_CONFIG { MaxPayloadSizeInBytes: desc.max_payload_size_bytes, MaxAttributeSizeInBytes: desc.max_attribute_size_bytes };
        subobjects.push(D3D12_STATE_SUBOBJECT { Type: D3D12_STATE_SUBOBJECT_TYPE_RAYTRACING_SHADER_CONFIG, pDesc: &shader_config as *const _ as *const c_void });

        let pipeline_config = D3D12_RAYTRACING_PIPELINE_CONFIG { MaxTraceRecursionDepth: desc.max_recursion_depth };
        subobjects.push(D3D12_STATE_SUBOBJECT { Type: D3D12_STATE_SUBOBJECT_TYPE_RAYTRACING_PIPELINE_CONFIG, pDesc: &pipeline_config as *const _ as *const c_void });

        let global_root_sig_desc = D3D12_GLOBAL_ROOT_SIGNATURE { pGlobalRootSignature: windows::core::ManuallyDrop::new(Some(global_root_sig.clone())) };
        subobjects.push(D3D12_STATE_SUBOBJECT { Type: D3D12_STATE_SUBOBJECT_TYPE_GLOBAL_ROOT_SIGNATURE, pDesc: &global_root_sig_desc as *const _ as *const c_void });

        // One local-root-signature subobject per distinct native signature,
        // each followed by an association subobject naming the exports that
        // use it.
        let mut local_sig_descs: Vec<D3D12_LOCAL_ROOT_SIGNATURE> = local_root_sigs.iter().map(|sig| D3D12_LOCAL_ROOT_SIGNATURE { pLocalRootSignature: windows::core::ManuallyDrop::new(Some(sig.clone())) }).collect();
        let mut associations: Vec<D3D12_SUBOBJECT_TO_EXPORTS_ASSOCIATION> = Vec::new();
        for (sig_index, _) in local_root_sigs.iter().enumerate() {
            let mut names: Vec<PCWSTR> = Vec::new();
            for (export_idx, &bound_sig) in local_root_sig_for_export.iter().enumerate() {
                if bound_sig == sig_index {
                    names.push(PCWSTR(export_names[export_idx].as_ptr()));
                }
            }
            association_exports.push(names);
        }

        let local_sig_subobject_start = subobjects.len();
        for local_sig_desc in &local_sig_descs {
            subobjects.push(D3D12_STATE_SUBOBJECT { Type: D3D12_STATE_SUBOBJECT_TYPE_LOCAL_ROOT_SIGNATURE, pDesc: local_sig_desc as *const _ as *const c_void });
        }
        for (i, names) in association_exports.iter().enumerate() {
            associations.push(D3D12_SUBOBJECT_TO_EXPORTS_ASSOCIATION {
                pSubobjectToAssociate: &subobjects[local_sig_subobject_start + i] as *const _,
                NumExports: names.len() as u32,
                pExports: names.as_ptr(),
            });
        }
        for association in &associations {
            subobjects.push(D3D12_STATE_SUBOBJECT { Type: D3D12_STATE_SUBOBJECT_TYPE_SUBOBJECT_TO_EXPORTS_ASSOCIATION, pDesc: association as *const _ as *const c_void });
        }
        let _ = &mut local_sig_descs;

        let state_object_desc =
            D3D12_STATE_OBJECT_DESC { Type: D3D12_STATE_OBJECT_TYPE_RAYTRACING_PIPELINE, NumSubobjects: subobjects.len() as u32, pSubobjects: subobjects.as_ptr() };

        let device5: ID3D12Device5 = self.device.cast().map_err(|e| e.to_ral_error("ID3D12Device10::cast to ID3D12Device5"))?;
        let state_object: ID3D12StateObject = unsafe { device5.CreateStateObject(&state_object_desc) }.map_err(|e| e.to_ral_error("CreateStateObject"))?;
        let properties: ID3D12StateObjectProperties = state_object.cast().map_err(|e| e.to_ral_error("ID3D12StateObject::cast to ID3D12StateObjectProperties"))?;

        let hit_group_names: Vec<String> = desc.hit_groups.iter().map(|g| g.name.clone()).collect();

        let node = RaytracingPipelineNode {
            state_object,
            properties,
            exports: export_infos,
            hit_group_names,
            global_root_sig,
            global_arguments: global_bindings,
            global_root_constants_param,
        };
        let index = self.raytracing.lock().acquire(node);
        Ok(PipelineStateHandle::from_index(index + PIPELINE_RT_INDEX_OFFSET))
    }

    pub fn free(&self, handle: PipelineStateHandle) {
        let idx = handle.index();
        if idx >= PIPELINE_RT_INDEX_OFFSET {
            self.raytracing.lock().release(idx - PIPELINE_RT_INDEX_OFFSET);
        } else {
            self.graphics_compute.lock().release(idx);
        }
    }

    pub fn with_graphics_or_compute<R>(&self, handle: PipelineStateHandle, f: impl FnOnce(&GraphicsPipelineNode) -> R) -> R {
        f(self.graphics_compute.lock().get(handle.index()))
    }

    pub fn with_raytracing<R>(&self, handle: PipelineStateHandle, f: impl FnOnce(&RaytracingPipelineNode) -> R) -> R {
        f(self.raytracing.lock().get(handle.index() - PIPELINE_RT_INDEX_OFFSET))
    }

    pub fn leak_count(&self) -> usize {
        self.graphics_compute.lock().count_leaked() + self.raytracing.lock().count_leaked()
    }
}

static ATTRIB_SEMANTIC: &[u8] = b"ATTRIB\0";

fn wide_z(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn shader_bytecode(shader: Option<&gfx_ral_core::pso_desc::ShaderBinary>) -> D3D12_SHADER_BYTECODE {
    match shader {
        Some(s) => D3D12_SHADER_BYTECODE { pShaderBytecode: s.bytes.as_ptr() as *const c_void, BytecodeLength: s.bytes.len() },
        None => D3D12_SHADER_BYTECODE::default(),
    }
}

fn topology_type(topology: PrimitiveTopology) -> D3D12_PRIMITIVE_TOPOLOGY_TYPE {
    match topology {
        PrimitiveTopology::PointList => D3D12_PRIMITIVE_TOPOLOGY_TYPE_POINT,
        PrimitiveTopology::LineList | PrimitiveTopology::LineStrip => D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
        PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip => D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
    }
}

fn default_render_target_blend() -> D3D12_RENDER_TARGET_BLEND_DESC {
    D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: false.into(),
        LogicOpEnable: false.into(),
        SrcBlend: D3D12_BLEND_ONE,
        DestBlend: D3D12_BLEND_ZERO,
        BlendOp: D3D12_BLEND_OP_ADD,
        SrcBlendAlpha: D3D12_BLEND_ONE,
        DestBlendAlpha: D3D12_BLEND_ZERO,
        BlendOpAlpha: D3D12_BLEND_OP_ADD,
        LogicOp: D3D12_LOGIC_OP_NOOP,
        RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
    }
}
