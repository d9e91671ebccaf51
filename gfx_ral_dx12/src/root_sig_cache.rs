//! Root-signature cache (§4.10 "Root signature").
//!
//! Keyed by [`RootSignatureKey::hash`] through [`gfx_ral_core::cache_map::CacheMap`]
//! so signatures are shared across PSOs that declare the same argument
//! shapes. Construction itself is grounded in
//! `onca_ral_dx12::pipeline::PipelineLayout::new`: a `D3D12_ROOT_SIGNATURE_DESC1`
//! serialized with `D3D12SerializeVersionedRootSignature` and turned into a
//! native object with `CreateRootSignature`. Parameter layout differs from
//! the teacher (whose `PipelineLayout` is a TODO stub with zero parameters):
//! here every shader argument in the key becomes, in order, an optional root
//! CBV, an optional SRV/UAV descriptor table, and an optional sampler
//! descriptor table, with one root-constants parameter first when declared.

use gfx_ral_core::cache_map::CacheMap;
use gfx_ral_core::shader_arg::RootSignatureKey;
use gfx_ral_core::state::RootSignatureKind;
use gfx_ral_core::{Error, Result};
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;

use crate::utils::ToRalError;

/// Four 32-bit values, matching the root-constants payload the shader-table
/// writer in `gfx_ral_core::shader_table` budgets for an argument.
pub const MAX_ROOT_CONSTANTS_DWORDS: u32 = 4;

/// Where, in the built root signature, each shader argument's parts land.
/// `u32::MAX` means "not present for this argument" (matches the key's
/// `ShaderArgShape` per-argument flags).
#[derive(Clone, Copy, Debug, Default)]
pub struct ArgumentBinding {
    pub cbv_param: u32,
    pub srv_uav_table_param: u32,
    pub sampler_table_param: u32,
}

pub struct RootSignatureEntry {
    pub root_sig: ID3D12RootSignature,
    pub root_constants_param: Option<u32>,
    pub arguments: Vec<ArgumentBinding>,
}

pub struct RootSigCache {
    device: ID3D12Device10,
    cache: Mutex<CacheMap<RootSignatureEntry>>,
}

impl RootSigCache {
    pub fn new(device: ID3D12Device10, capacity: usize) -> Self {
        Self { device, cache: Mutex::new(CacheMap::new(capacity)) }
    }

    /// Returns the cached entry for `key`, building a new native root
    /// signature on first use.
    pub fn get_or_create(&self, key: &RootSignatureKey) -> Result<RootSigHandleRef<'_>> {
        let hash = key.hash();
        {
            let cache = self.cache.lock();
            if cache.contains(hash) {
                return Ok(RootSigHandleRef { cache: &self.cache, hash });
            }
        }
        let entry = build_root_signature(&self.device, key)?;
        let mut cache = self.cache.lock();
        // Another thread may have raced us to the same key; `CacheMap`
        // treats a hash match as identity, so inserting twice would silently
        // overwrite rather than duplicate the native object — still correct,
        // just redundant work. Not worth a second lock round-trip to avoid.
        cache.insert(hash, entry);
        Ok(RootSigHandleRef { cache: &self.cache, hash })
    }
}

/// A short-lived accessor into the cache; avoids handing out a raw
/// `&RootSignatureEntry` whose backing storage lives behind the pool's lock.
pub struct RootSigHandleRef<'a> {
    cache: &'a Mutex<CacheMap<RootSignatureEntry>>,
    hash: u64,
}

impl<'a> RootSigHandleRef<'a> {
    pub fn with<R>(&self, f: impl FnOnce(&RootSignatureEntry) -> R) -> R {
        let cache = self.cache.lock();
        let entry = cache.look_up(self.hash).expect("root signature vanished from cache between insert and lookup");
        f(entry)
    }
}

fn build_root_signature(device: &ID3D12Device10, key: &RootSignatureKey) -> Result<RootSignatureEntry> {
    let mut ranges_srv_uav = Vec::with_capacity(key.arg_shapes.len());
    let mut ranges_sampler = Vec::with_capacity(key.arg_shapes.len());
    let mut params: Vec<D3D12_ROOT_PARAMETER1> = Vec::new();

    let root_constants_param = if key.has_root_constants {
        params.push(D3D12_ROOT_PARAMETER1 {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
            Anonymous: D3D12_ROOT_PARAMETER1_0 {
                Constants: D3D12_ROOT_CONSTANTS { ShaderRegister: 0, RegisterSpace: 0, Num32BitValues: MAX_ROOT_CONSTANTS_DWORDS },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
        });
        Some(0u32)
    } else {
        None
    };

    let mut arguments = Vec::with_capacity(key.arg_shapes.len());
    for (i, shape) in key.arg_shapes.iter().enumerate() {
        let mut binding = ArgumentBinding { cbv_param: u32::MAX, srv_uav_table_param: u32::MAX, sampler_table_param: u32::MAX };
        let space = i as u32;

        if shape.has_cbv {
            binding.cbv_param = params.len() as u32;
            params.push(D3D12_ROOT_PARAMETER1 {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_CBV,
                Anonymous: D3D12_ROOT_PARAMETER1_0 {
                    Descriptor: D3D12_ROOT_DESCRIPTOR1 { ShaderRegister: 0, RegisterSpace: space, Flags: D3D12_ROOT_DESCRIPTOR_FLAG_NONE },
                },
                ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            });
        }

        let num_srv_uav = shape.num_srvs as u32 + shape.num_uavs as u32;
        if num_srv_uav > 0 {
            ranges_srv_uav.push((
                params.len(),
                [
                    D3D12_DESCRIPTOR_RANGE1 {
                        RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
                        NumDescriptors: shape.num_srvs as u32,
                        BaseShaderRegister: 0,
                        RegisterSpace: space,
                        Flags: D3D12_DESCRIPTOR_RANGE_FLAG_NONE,
                        OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
                    },
                    D3D12_DESCRIPTOR_RANGE1 {
                        RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
                        NumDescriptors: shape.num_uavs as u32,
                        BaseShaderRegister: 0,
                        RegisterSpace: space,
                        Flags: D3D12_DESCRIPTOR_RANGE_FLAG_NONE,
                        OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
                    },
                ],
            ));
            binding.srv_uav_table_param = params.len() as u32;
            params.push(D3D12_ROOT_PARAMETER1 {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                Anonymous: D3D12_ROOT_PARAMETER1_0::default(),
                ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            });
        }

        if shape.num_samplers > 0 {
            ranges_sampler.push((
                params.len(),
                [D3D12_DESCRIPTOR_RANGE1 {
                    RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER,
                    NumDescriptors: shape.num_samplers as u32,
                    BaseShaderRegister: 0,
                    RegisterSpace: space,
                    Flags: D3D12_DESCRIPTOR_RANGE_FLAG_NONE,
                    OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
                }],
            ));
            binding.sampler_table_param = params.len() as u32;
            params.push(D3D12_ROOT_PARAMETER1 {
                ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                Anonymous: D3D12_ROOT_PARAMETER1_0::default(),
                ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
            });
        }

        arguments.push(binding);
    }

    // Descriptor-table parameters hold a pointer to their range array; the
    // ranges must outlive the `CreateRootSignature` call, so they're filled
    // in only after every `params` entry has a final, stable address.
    for (param_index, ranges) in &ranges_srv_uav {
        params[*param_index].Anonymous.DescriptorTable = D3D12_ROOT_DESCRIPTOR_TABLE1 { NumDescriptorRanges: ranges.len() as u32, pDescriptorRanges: ranges.as_ptr() };
    }
    for (param_index, ranges) in &ranges_sampler {
        params[*param_index].Anonymous.DescriptorTable = D3D12_ROOT_DESCRIPTOR_TABLE1 { NumDescriptorRanges: ranges.len() as u32, pDescriptorRanges: ranges.as_ptr() };
    }

    let mut flags = D3D12_ROOT_SIGNATURE_FLAG_DENY_HULL_SHADER_ROOT_ACCESS
        | D3D12_ROOT_SIGNATURE_FLAG_DENY_DOMAIN_SHADER_ROOT_ACCESS
        | D3D12_ROOT_SIGNATURE_FLAG_DENY_GEOMETRY_SHADER_ROOT_ACCESS;
    if key.kind == RootSignatureKind::Graphics {
        flags |= D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT;
    }
    if matches!(key.kind, RootSignatureKind::RaytracingLocal) {
        flags |= D3D12_ROOT_SIGNATURE_FLAG_LOCAL_ROOT_SIGNATURE;
    }

    let root_desc = D3D12_ROOT_SIGNATURE_DESC1 { NumParameters: params.len() as u32, pParameters: params.as_ptr(), NumStaticSamplers: 0, pStaticSamplers: std::ptr::null(), Flags: flags };
    let versioned = D3D12_VERSIONED_ROOT_SIGNATURE_DESC { Version: D3D_ROOT_SIGNATURE_VERSION_1_1, Anonymous: D3D12_VERSIONED_ROOT_SIGNATURE_DESC_0 { Desc_1_1: root_desc } };

    let mut signature_blob = None;
    let mut error_blob = None;
    let serialize_result = unsafe { D3D12SerializeVersionedRootSignature(&versioned, &mut signature_blob, Some(&mut error_blob)) };
    if let Err(e) = serialize_result {
        let detail = error_blob.map(|b| blob_to_string(&b)).unwrap_or_default();
        return Err(Error::Api { what: "D3D12SerializeVersionedRootSignature", detail: format!("{e}: {detail}") });
    }
    let signature_blob = signature_blob.expect("serialize succeeded but produced no blob");
    let serialized = unsafe { std::slice::from_raw_parts(signature_blob.GetBufferPointer() as *const u8, signature_blob.GetBufferSize()) };

    let root_sig: ID3D12RootSignature = unsafe { device.CreateRootSignature(0, serialized) }.map_err(|e| e.to_ral_error("CreateRootSignature"))?;

    Ok(RootSignatureEntry { root_sig, root_constants_param, arguments })
}

fn blob_to_string(blob: &ID3D10Blob) -> String {
    unsafe {
        let ptr = blob.GetBufferPointer() as *const u8;
        let len = blob.GetBufferSize();
        let bytes = std::slice::from_raw_parts(ptr, len);
        String::from_utf8_lossy(bytes).into_owned()
    }
}
