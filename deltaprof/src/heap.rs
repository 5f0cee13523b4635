// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delta computation for allocation profiles.

use crate::collections::ProfMap;
use crate::pprof::ProfileBuilder;
use crate::runtime::{MemProfileRecord, Symbolizer};
use crate::ProfileError;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct HeapPrev {
    alloc_objects: i64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct HeapAcc {
    alloc_objects: i64,
    inuse_objects: i64,
}

/// Turns cumulative allocation records into per-read allocation deltas.
///
/// Keys are (stack, block size): the runtime keeps one bucket per size class
/// for a stack, and those buckets are reported as separate samples.
#[derive(Debug, Default)]
pub struct DeltaHeapProfiler {
    m: ProfMap<HeapPrev, HeapAcc>,
}

impl DeltaHeapProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one sample per (stack, block size) whose allocation count
    /// changed since the previous call, or that still has live objects.
    ///
    /// Sample values are `[alloc_objects, alloc_space, inuse_objects,
    /// inuse_space]`, bias corrected for `rate`. Allocation values are the
    /// delta since the last read; in-use values are the current gauge. The
    /// builder is not finished here.
    pub fn write_heap_proto<B: ProfileBuilder + ?Sized>(
        &mut self,
        b: &mut B,
        symbolizer: &dyn Symbolizer,
        records: &[MemProfileRecord],
        rate: i64,
    ) -> Result<(), ProfileError> {
        let mut pending: Vec<(usize, [i64; 4], i64)> = Vec::new();
        pending.try_reserve(records.len())?;
        for r in records {
            if r.is_empty() {
                // Not published yet, it shows up after the next GC cycles.
                continue;
            }
            let entry = self.m.lookup(r.stack(), block_size(r) as usize);
            entry.acc.alloc_objects = entry.acc.alloc_objects.saturating_add(r.alloc_objects);
            entry.acc.inuse_objects = entry.acc.inuse_objects.saturating_add(r.in_use_objects());
        }

        // Every entry is settled before the first byte is encoded, so an
        // encoding error never leaves an accumulator behind.
        for (i, r) in records.iter().enumerate() {
            if r.is_empty() {
                continue;
            }
            let block_size = block_size(r);
            let entry = self.m.lookup(r.stack(), block_size as usize);
            if entry.acc == HeapAcc::default() {
                // Already handled as a duplicate of an earlier record.
                continue;
            }

            let alloc_objects = entry.acc.alloc_objects.saturating_sub(entry.prev.alloc_objects);
            let inuse_objects = entry.acc.inuse_objects;
            entry.prev.alloc_objects = entry.acc.alloc_objects;
            entry.acc = HeapAcc::default();
            if alloc_objects < 0 {
                tracing::trace!(
                    alloc_objects,
                    block_size,
                    "heap bucket counter went backwards, rebaselined"
                );
                continue;
            }

            let (alloc_count, alloc_bytes) =
                scale_heap_sample(alloc_objects, alloc_objects.saturating_mul(block_size), rate);
            let (inuse_count, inuse_bytes) =
                scale_heap_sample(inuse_objects, inuse_objects.saturating_mul(block_size), rate);
            let values = [alloc_count, alloc_bytes, inuse_count, inuse_bytes];
            if values == [0; 4] {
                continue;
            }
            pending.push((i, values, block_size));
        }

        let mut locs = Vec::new();
        for (i, values, block_size) in &pending {
            append_user_locs(b, symbolizer, &mut locs, records[*i].stack())?;
            b.sample(values, &locs, *block_size)?;
        }
        tracing::debug!(samples = pending.len(), tracked_buckets = self.m.len(), "wrote heap profile");
        Ok(())
    }
}

fn block_size(r: &MemProfileRecord) -> i64 {
    if r.alloc_objects > 0 {
        r.alloc_bytes / r.alloc_objects
    } else {
        0
    }
}

/// Resolves `stack`, hiding runtime frames at the leaf end. If nothing is
/// left, all frames are shown instead.
fn append_user_locs<B: ProfileBuilder + ?Sized>(
    b: &mut B,
    symbolizer: &dyn Symbolizer,
    locs: &mut Vec<u64>,
    stack: &[usize],
) -> Result<(), ProfileError> {
    let user = stack
        .iter()
        .position(|&addr| {
            !symbolizer
                .function_name(addr)
                .is_some_and(|name| symbolizer.is_runtime_function(&name))
        })
        .map_or(stack, |first| &stack[first..]);

    locs.clear();
    b.append_locs_for_stack(locs, user)?;
    if locs.is_empty() && user.len() != stack.len() {
        b.append_locs_for_stack(locs, stack)?;
    }
    Ok(())
}

/// Estimates the unsampled totals behind a heap sample.
///
/// Allocations are sampled by a Poisson process averaging one sample every
/// `rate` bytes, so a block of size S is sampled with probability
/// `1 - exp(-S/rate)`. Both `count` and `size` are divided by that
/// probability, using the average block size `size / count`.
///
/// A `rate` of 1 means every allocation was recorded; a `rate` below 1 is
/// unknown. Neither is scaled.
pub fn scale_heap_sample(count: i64, size: i64, rate: i64) -> (i64, i64) {
    if count == 0 || size == 0 {
        return (0, 0);
    }
    if rate <= 1 {
        return (count, size);
    }
    let avg_size = size as f64 / count as f64;
    let scale = 1.0 / (1.0 - (-avg_size / rate as f64).exp());
    ((count as f64 * scale) as i64, (size as f64 * scale) as i64)
}
