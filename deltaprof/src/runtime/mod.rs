// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The seam between the profilers and the runtime being profiled.
//!
//! The profilers never walk stacks or read allocator state themselves. They
//! are handed cumulative records and resolve addresses through a
//! [`Symbolizer`].

mod generics;
mod symbolizer;

pub use generics::collapse_type_parameters;
pub use symbolizer::*;

use crate::mapping::MemMap;
use std::borrow::Cow;

/// Depth of the fixed-size stack arrays reported by the runtime. Deeper
/// stacks are truncated.
pub const MAX_STACK_DEPTH: usize = 32;

/// One frame of a symbolized address.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Frame {
    /// Program counter of the call site, 0 if it could not be resolved.
    pub pc: usize,
    /// Display name, with type parameters collapsed to `[...]`.
    pub function: String,
    /// Full symbol name including concrete type parameters.
    pub symbol_name: String,
    pub file: String,
    pub line: i64,
    /// Line of the function's declaration.
    pub start_line: i64,
    /// Entry point of the physical function containing this frame, 0 if
    /// unknown.
    pub entry: usize,
    /// The frame is an inlined call with no physical frame of its own.
    pub inlined: bool,
}

/// Resolves return addresses into frames.
pub trait Symbolizer: Send + Sync {
    /// Expands one address into its frame chain, leaf first: inlined frames
    /// come first and the physical function last. An empty result means the
    /// address could not be resolved.
    fn frames(&self, addr: usize) -> Vec<Frame>;

    /// Name of the physical function containing `addr`.
    fn function_name(&self, addr: usize) -> Option<String> {
        self.frames(addr).pop().map(|frame| frame.symbol_name)
    }

    /// Recovers inline frames lost when a stack was truncated at
    /// [`MAX_STACK_DEPTH`], by appending the addresses of the inlined
    /// callers of the last address.
    fn expand_final_inline_frame<'a>(&self, stack: &'a [usize]) -> Cow<'a, [usize]> {
        Cow::Borrowed(stack)
    }

    /// Whether `name` belongs to the runtime's own internals. Such frames are
    /// hidden from the leaf end of heap stacks.
    fn is_runtime_function(&self, name: &str) -> bool;

    /// Whether `frame` is the marker at the bottom of every thread's stack.
    /// Stack walking stops there and the marker is never reported.
    fn is_thread_exit(&self, frame: &Frame) -> bool;
}

/// One allocation bucket: cumulative counters for every allocation of a
/// given size class made from a given stack.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MemProfileRecord {
    pub alloc_bytes: i64,
    pub free_bytes: i64,
    pub alloc_objects: i64,
    pub free_objects: i64,
    /// Return addresses, leaf first, zero padded.
    pub stack0: [usize; MAX_STACK_DEPTH],
}

impl MemProfileRecord {
    /// Builds a record, truncating `stack` to [`MAX_STACK_DEPTH`].
    pub fn new(
        alloc_objects: i64,
        alloc_bytes: i64,
        free_objects: i64,
        free_bytes: i64,
        stack: &[usize],
    ) -> Self {
        Self {
            alloc_bytes,
            free_bytes,
            alloc_objects,
            free_objects,
            stack0: fill_stack(stack),
        }
    }

    pub fn in_use_objects(&self) -> i64 {
        self.alloc_objects - self.free_objects
    }

    pub fn in_use_bytes(&self) -> i64 {
        self.alloc_bytes - self.free_bytes
    }

    /// The stack up to the first zero entry.
    pub fn stack(&self) -> &[usize] {
        trim_stack(&self.stack0)
    }

    /// A bucket the runtime has created but not published yet.
    pub fn is_empty(&self) -> bool {
        self.alloc_bytes == 0
            && self.alloc_objects == 0
            && self.free_bytes == 0
            && self.free_objects == 0
    }
}

/// One contention bucket: how many times a stack waited, and for how many
/// CPU cycles in total.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockProfileRecord {
    pub count: i64,
    pub cycles: i64,
    pub stack0: [usize; MAX_STACK_DEPTH],
}

impl BlockProfileRecord {
    pub fn new(count: i64, cycles: i64, stack: &[usize]) -> Self {
        Self {
            count,
            cycles,
            stack0: fill_stack(stack),
        }
    }

    pub fn stack(&self) -> &[usize] {
        trim_stack(&self.stack0)
    }
}

/// Snapshot of the allocation profile.
pub trait HeapSource: Send + Sync {
    fn mem_profile(&self) -> Vec<MemProfileRecord>;

    /// Average number of bytes between two sampled allocations.
    fn sampling_rate(&self) -> i64;
}

/// Snapshot of a mutex or block contention profile.
pub trait ContentionSource: Send + Sync {
    fn contention_profile(&self) -> Vec<BlockProfileRecord>;

    fn cycles_per_second(&self) -> i64;
}

/// The process's executable memory mappings.
pub trait MappingSource: Send + Sync {
    fn read_mappings(&self) -> Vec<MemMap>;
}

fn fill_stack(stack: &[usize]) -> [usize; MAX_STACK_DEPTH] {
    let mut stack0 = [0; MAX_STACK_DEPTH];
    let n = stack.len().min(MAX_STACK_DEPTH);
    stack0[..n].copy_from_slice(&stack[..n]);
    stack0
}

fn trim_stack(stack: &[usize]) -> &[usize] {
    match stack.iter().position(|&pc| pc == 0) {
        Some(end) => &stack[..end],
        None => stack,
    }
}
