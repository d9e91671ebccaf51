//! Query-range pool (§3 "Query range", §4 component table).
//!
//! Each query kind gets its own native `ID3D12QueryHeap` and its own
//! [`PageAllocator`]; handle index ranges are partitioned by kind the same
//! way [`crate::command_list_pool`] partitions by queue kind, using the same
//! [`QUEUE_INDEX_STEP`] constant so the encoding is one idiom throughout the
//! crate.

use gfx_ral_core::handle::{Index, QueryRangeHandle, QUEUE_INDEX_STEP};
use gfx_ral_core::state::QueryKind;
use gfx_ral_core::{Error, Result};
use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;

use crate::utils::ToRalError;

struct QueryHeap {
    heap: ID3D12QueryHeap,
    allocator: gfx_ral_core::page_allocator::PageAllocator,
}

pub struct QueryPool {
    heaps: [Mutex<QueryHeap>; 3],
}

impl QueryPool {
    pub fn new(device: &ID3D12Device10, max_num_query_ranges: u32) -> Result<Self> {
        let make = |kind: QueryKind| -> Result<Mutex<QueryHeap>> {
            let heap_type = match kind {
                QueryKind::Timestamp => D3D12_QUERY_HEAP_TYPE_TIMESTAMP,
                QueryKind::Occlusion => D3D12_QUERY_HEAP_TYPE_OCCLUSION,
                QueryKind::PipelineStats => D3D12_QUERY_HEAP_TYPE_PIPELINE_STATISTICS,
            };
            let desc = D3D12_QUERY_HEAP_DESC { Type: heap_type, Count: max_num_query_ranges, NodeMask: 0 };
            let heap: ID3D12QueryHeap = unsafe { device.CreateQueryHeap(&desc) }.map_err(|e| e.to_ral_error("CreateQueryHeap"))?;
            Ok(Mutex::new(QueryHeap { heap, allocator: gfx_ral_core::page_allocator::PageAllocator::new(max_num_query_ranges, 1) }))
        };
        Ok(Self { heaps: [make(QueryKind::Timestamp)?, make(QueryKind::Occlusion)?, make(QueryKind::PipelineStats)?] })
    }

    fn heap_index(kind: QueryKind) -> usize {
        kind as u32 as usize
    }

    pub fn create_query_range(&self, kind: QueryKind, count: u32) -> Result<QueryRangeHandle> {
        let mut heap = self.heaps[Self::heap_index(kind)].lock();
        let first = heap.allocator.allocate(count).ok_or(Error::PoolExhausted("QueryPool"))?;
        Ok(QueryRangeHandle::from_index(first + QUEUE_INDEX_STEP * kind as u32))
    }

    pub fn free_query_range(&self, range: QueryRangeHandle) {
        let (kind, first) = decode(range);
        self.heaps[Self::heap_index(kind)].lock().allocator.free(first);
    }

    pub fn native_heap(&self, kind: QueryKind) -> ID3D12QueryHeap {
        self.heaps[Self::heap_index(kind)].lock().heap.clone()
    }

    /// Decodes a handle back into `(kind, first query index)`, used by the
    /// translator to build native `EndQuery`/`ResolveQueryData` calls.
    pub fn decode_handle(range: QueryRangeHandle) -> (QueryKind, u32) {
        decode(range)
    }
}

fn decode(range: QueryRangeHandle) -> (QueryKind, Index) {
    let idx = range.index();
    let kind_ord = idx / QUEUE_INDEX_STEP;
    let first = idx % QUEUE_INDEX_STEP;
    let kind = match kind_ord {
        0 => QueryKind::Timestamp,
        1 => QueryKind::Occlusion,
        2 => QueryKind::PipelineStats,
        other => panic!("corrupt query-range handle: unknown kind ordinal {other}"),
    };
    (kind, first)
}
