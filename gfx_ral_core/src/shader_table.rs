//! Raytracing shader-table record layout (§4.12). Bit-exact for raytracing
//! interop: a record written here for a given set of arguments must be
//! byte-identical to what a native dispatch-rays call expects.
//!
//! Layout per record, in order:
//! 1. the native shader identifier (fixed [`SHADER_IDENTIFIER_SIZE`] bytes)
//! 2. for each argument, in declared order: a CBV GPU VA (8 bytes) if the
//!    argument declares a CBV; an SRV/UAV descriptor-table GPU handle
//!    (8 bytes) if its shader view has any; a sampler descriptor-table GPU
//!    handle (8 bytes) if its shader view has any samplers
//! 3. root constants, padded up to a multiple of 8 bytes
//!
//! Record stride is the maximum record size across a table, rounded up to
//! [`SHADER_RECORD_ALIGNMENT`].

use crate::handle::ResourceHandle;
use crate::shader_arg::ShaderArgShape;

/// D3D12_SHADER_IDENTIFIER_SIZE_IN_BYTES.
pub const SHADER_IDENTIFIER_SIZE: u32 = 32;
/// D3D12_RAYTRACING_SHADER_RECORD_BYTE_ALIGNMENT.
pub const SHADER_RECORD_ALIGNMENT: u32 = 64;
/// D3D12_RAYTRACING_SHADER_TABLE_BYTE_ALIGNMENT.
pub const SHADER_TABLE_ALIGNMENT: u32 = 64;

fn align_up(size: u32, align: u32) -> u32 {
    (size + align - 1) / align * align
}

/// Per-argument presence info recorded by the PSO at raytracing-state
/// creation, used to catch a miscount between what the caller declares a
/// record's arguments to contain and what it actually writes.
#[derive(Clone, Copy, Debug)]
pub struct ArgPresence {
    pub has_cbv: bool,
    pub has_srv_uav: bool,
    pub has_sampler: bool,
}

impl ArgPresence {
    pub fn from_shape(shape: ShaderArgShape, shader_view_has_srv_uav: bool, shader_view_has_sampler: bool) -> Self {
        Self { has_cbv: shape.has_cbv, has_srv_uav: shader_view_has_srv_uav, has_sampler: shader_view_has_sampler }
    }
}

/// One argument's runtime values for a single shader-table record.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordArgument {
    pub cbv: Option<(ResourceHandle, u64 /* GPU VA */)>,
    pub srv_uav_gpu_handle: Option<u64>,
    pub sampler_gpu_handle: Option<u64>,
}

/// One record to be written: the shader identifier, its arguments, and any
/// trailing root constants.
#[derive(Clone, Debug)]
pub struct ShaderTableRecord<'a> {
    pub shader_identifier: &'a [u8; SHADER_IDENTIFIER_SIZE as usize],
    pub arguments: &'a [RecordArgument],
    pub root_constants: &'a [u8],
}

/// Computes the maximum-over-records 8-byte-block count, yielding the
/// record stride for a table (§4.12, §8 scenario 6).
pub fn compute_record_stride(records: &[ShaderTableRecord<'_>]) -> u32 {
    let mut max_blocks = 0u32;
    for rec in records {
        let mut blocks = 0u32;
        for arg in rec.arguments {
            if arg.cbv.is_some() {
                blocks += 1;
            }
            if arg.srv_uav_gpu_handle.is_some() {
                blocks += 1;
            }
            if arg.sampler_gpu_handle.is_some() {
                blocks += 1;
            }
        }
        if !rec.root_constants.is_empty() {
            blocks += (rec.root_constants.len() as u32 + 7) / 8;
        }
        max_blocks = max_blocks.max(blocks);
    }
    align_up(SHADER_IDENTIFIER_SIZE + 8 * max_blocks, SHADER_RECORD_ALIGNMENT)
}

/// Aggregate stride/size info for the three (or four, with callables)
/// shader-table sections of one raytracing dispatch.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShaderTableStrides {
    pub size_ray_gen: u32,
    pub stride_miss: u32,
    pub size_miss: u32,
    pub stride_hit_group: u32,
    pub size_hit_group: u32,
    pub stride_callable: u32,
    pub size_callable: u32,
}

pub fn calculate_shader_table_sizes(
    ray_gen_record: &ShaderTableRecord<'_>,
    miss_records: &[ShaderTableRecord<'_>],
    hit_group_records: &[ShaderTableRecord<'_>],
    callable_records: &[ShaderTableRecord<'_>],
) -> ShaderTableStrides {
    let size_ray_gen = compute_record_stride(std::slice::from_ref(ray_gen_record));

    let stride_miss = compute_record_stride(miss_records);
    let stride_hit_group = compute_record_stride(hit_group_records);
    let stride_callable = compute_record_stride(callable_records);

    ShaderTableStrides {
        size_ray_gen,
        stride_miss,
        size_miss: stride_miss * miss_records.len() as u32,
        stride_hit_group,
        size_hit_group: stride_hit_group * hit_group_records.len() as u32,
        stride_callable,
        size_callable: stride_callable * callable_records.len() as u32,
    }
}

/// Writes `records` into `dest` at `stride_bytes` apart, validating each
/// record's actual argument data against `arg_presence` (one entry per
/// argument per record, in the same order as `record.arguments`). A
/// miscount between declared and written argument presence is a
/// programming error and panics, per §4.12 and §7.
pub fn write_shader_table(dest: &mut [u8], stride_bytes: u32, records: &[ShaderTableRecord<'_>], arg_presence: &[&[ArgPresence]]) {
    assert!(stride_bytes > 0 || records.len() == 1, "a zero stride is only valid for a single record");
    assert_eq!(records.len(), arg_presence.len(), "one arg-presence slice is required per record");

    let mut outer = 0usize;
    for (rec, presence) in records.iter().zip(arg_presence) {
        assert_eq!(rec.arguments.len(), presence.len(), "argument count mismatch between record and its PSO-recorded arg info");

        let mut inner = outer;
        dest[inner..inner + SHADER_IDENTIFIER_SIZE as usize].copy_from_slice(rec.shader_identifier);
        inner += SHADER_IDENTIFIER_SIZE as usize;

        for (arg, info) in rec.arguments.iter().zip(presence.iter()) {
            if let Some((_, va)) = arg.cbv {
                assert!(info.has_cbv, "shader table write invalid: CBV written where none is declared");
                dest[inner..inner + 8].copy_from_slice(&va.to_le_bytes());
                inner += 8;
            } else {
                assert!(!info.has_cbv, "shader table write invalid: CBV omitted where one is declared");
            }

            if let Some(h) = arg.srv_uav_gpu_handle {
                assert!(info.has_srv_uav, "shader table write invalid: SRV/UAV handle written where none is declared");
                dest[inner..inner + 8].copy_from_slice(&h.to_le_bytes());
                inner += 8;
            } else {
                assert!(!info.has_srv_uav, "shader table write invalid: SRV/UAV handle omitted where one is declared");
            }

            if let Some(h) = arg.sampler_gpu_handle {
                assert!(info.has_sampler, "shader table write invalid: sampler handle written where none is declared");
                dest[inner..inner + 8].copy_from_slice(&h.to_le_bytes());
                inner += 8;
            } else {
                assert!(!info.has_sampler, "shader table write invalid: sampler handle omitted where one is declared");
            }
        }

        if !rec.root_constants.is_empty() {
            dest[inner..inner + rec.root_constants.len()].copy_from_slice(rec.root_constants);
            inner += align_up(rec.root_constants.len() as u32, 8) as usize;
        }

        outer += stride_bytes as usize;
        assert!(stride_bytes == 0 || inner <= outer, "stride too small for shader table record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_gen_with_one_cbv_argument_is_64_bytes() {
        // Spec §8 scenario 6: identifier(32) + 8(CBV VA) aligned up to 64 = 64.
        let args = [RecordArgument { cbv: Some((ResourceHandle::from_index(0), 0)), srv_uav_gpu_handle: None, sampler_gpu_handle: None }];
        let id = [0u8; SHADER_IDENTIFIER_SIZE as usize];
        let rec = ShaderTableRecord { shader_identifier: &id, arguments: &args, root_constants: &[] };
        assert_eq!(compute_record_stride(std::slice::from_ref(&rec)), 64);
    }

    #[test]
    fn identifier_only_record_rounds_up_to_alignment() {
        let id = [0u8; SHADER_IDENTIFIER_SIZE as usize];
        let rec = ShaderTableRecord { shader_identifier: &id, arguments: &[], root_constants: &[] };
        assert_eq!(compute_record_stride(std::slice::from_ref(&rec)), 64);
    }

    #[test]
    fn larger_record_rounds_up_past_one_alignment_unit() {
        // identifier(32) + 6 * 8(48) = 80 -> rounds up to 128.
        let args = [RecordArgument {
            cbv: Some((ResourceHandle::from_index(0), 0)),
            srv_uav_gpu_handle: Some(1),
            sampler_gpu_handle: Some(2),
        }; 2];
        let id = [0u8; SHADER_IDENTIFIER_SIZE as usize];
        let rec = ShaderTableRecord { shader_identifier: &id, arguments: &args, root_constants: &[] };
        assert_eq!(compute_record_stride(std::slice::from_ref(&rec)), 128);
    }

    #[test]
    fn write_round_trips_resource_handles_and_offsets() {
        let id = [7u8; SHADER_IDENTIFIER_SIZE as usize];
        let args = [RecordArgument { cbv: Some((ResourceHandle::from_index(4), 0x1000)), srv_uav_gpu_handle: None, sampler_gpu_handle: None }];
        let rec = ShaderTableRecord { shader_identifier: &id, arguments: &args, root_constants: &[1, 2, 3, 4] };
        let stride = compute_record_stride(std::slice::from_ref(&rec));
        let presence = [ArgPresence { has_cbv: true, has_srv_uav: false, has_sampler: false }];
        let mut buf = vec![0u8; stride as usize];
        write_shader_table(&mut buf, stride, std::slice::from_ref(&rec), &[&presence]);
        assert_eq!(&buf[0..32], &id);
        assert_eq!(u64::from_le_bytes(buf[32..40].try_into().unwrap()), 0x1000);
        assert_eq!(&buf[40..44], &[1, 2, 3, 4]);
    }

    #[test]
    #[should_panic(expected = "CBV written where none is declared")]
    fn miscounted_cbv_panics() {
        let id = [0u8; SHADER_IDENTIFIER_SIZE as usize];
        let args = [RecordArgument { cbv: Some((ResourceHandle::from_index(0), 0)), srv_uav_gpu_handle: None, sampler_gpu_handle: None }];
        let rec = ShaderTableRecord { shader_identifier: &id, arguments: &args, root_constants: &[] };
        let presence = [ArgPresence { has_cbv: false, has_srv_uav: false, has_sampler: false }];
        let mut buf = vec![0u8; 64];
        write_shader_table(&mut buf, 64, std::slice::from_ref(&rec), &[&presence]);
    }
}
