// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A scripted runtime shared by the integration tests.

#![allow(dead_code)]

use deltaprof::mapping::{MemMap, StaticMappings};
use deltaprof::pprof::test_utils::{deserialize_compressed_pprof, stack_collapse};
use deltaprof::runtime::{
    BlockProfileRecord, ContentionSource, HeapSource, MemProfileRecord, StaticSymbolizer,
};
use deltaprof::Resolver;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RATE: i64 = 524288;
pub const OBJECT_SIZE: i64 = 327680;

/// Leaf first, as the runtime reports them.
pub const STACK0: [usize; 2] = [0x1100, 0x1200];
pub const STACK1: [usize; 2] = [0x2100, 0x2200];
pub const STACK0_MARKER: &str = "main.caller0;main.alloc0";
pub const STACK1_MARKER: &str = "main.caller1;main.alloc1";

pub const MALLOC: usize = 0x3100;
pub const RUNTIME_CALLER: usize = 0x3200;
pub const GOEXIT: usize = 0x3f00;

/// Inlined chain `main.inner` <- `main.middle` <- `main.outer`, reported as
/// three fake return addresses, plus the physical caller of `main.outer`.
pub const INLINED_STACK: [usize; 4] = [0x4001, 0x4002, 0x4003, 0x1200];

pub fn symbolizer() -> StaticSymbolizer {
    let mut symbolizer = StaticSymbolizer::new()
        .with_runtime_prefix("runtime.")
        .with_thread_exit("runtime.goexit");
    symbolizer.insert_function(STACK0[0], "main.alloc0", "main.go", 10);
    symbolizer.insert_function(STACK0[1], "main.caller0", "main.go", 20);
    symbolizer.insert_function(STACK1[0], "main.alloc1", "main.go", 30);
    symbolizer.insert_function(STACK1[1], "main.caller1", "main.go", 40);
    symbolizer.insert_function(MALLOC, "runtime.mallocgc", "malloc.go", 900);
    symbolizer.insert_function(RUNTIME_CALLER, "runtime.newobject", "malloc.go", 1300);
    symbolizer.insert_function(GOEXIT, "runtime.goexit", "asm_amd64.s", 1700);

    let entry = 0x4000;
    for (addr, name, line, inlined) in [
        (0x4001, "main.inner", 5, true),
        (0x4002, "main.middle", 6, true),
        (0x4003, "main.outer", 9, false),
    ] {
        symbolizer.insert(
            addr,
            vec![deltaprof::runtime::Frame {
                pc: addr - 1,
                function: name.to_owned(),
                symbol_name: name.to_owned(),
                file: "inline.go".to_owned(),
                line,
                start_line: line,
                entry,
                inlined,
            }],
        );
    }
    symbolizer
}

pub fn text_mapping() -> MemMap {
    MemMap {
        start: 0x1000,
        end: 0x5000,
        file: "/usr/bin/app".to_owned(),
        build_id: "deadbeef".to_owned(),
        ..MemMap::default()
    }
}

pub fn resolver() -> Resolver {
    Resolver::new(
        Arc::new(symbolizer()),
        Arc::new(StaticMappings(vec![text_mapping()])),
    )
}

pub fn heap_record(
    alloc_objects: i64,
    alloc_bytes: i64,
    free_objects: i64,
    free_bytes: i64,
    stack: &[usize],
) -> MemProfileRecord {
    MemProfileRecord::new(alloc_objects, alloc_bytes, free_objects, free_bytes, stack)
}

pub fn block_record(count: i64, cycles: i64, stack: &[usize]) -> BlockProfileRecord {
    BlockProfileRecord::new(count, cycles, stack)
}

/// A runtime whose profiles are set by the test.
pub struct FakeRuntime {
    pub heap: Mutex<Vec<MemProfileRecord>>,
    pub contention: Mutex<Vec<BlockProfileRecord>>,
    pub rate: i64,
    pub cycles_per_second: i64,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            heap: Mutex::new(Vec::new()),
            contention: Mutex::new(Vec::new()),
            rate: RATE,
            // One cycle per nanosecond.
            cycles_per_second: 1_000_000_000,
        }
    }
}

impl HeapSource for FakeRuntime {
    fn mem_profile(&self) -> Vec<MemProfileRecord> {
        self.heap.lock().clone()
    }

    fn sampling_rate(&self) -> i64 {
        self.rate
    }
}

impl ContentionSource for FakeRuntime {
    fn contention_profile(&self) -> Vec<BlockProfileRecord> {
        self.contention.lock().clone()
    }

    fn cycles_per_second(&self) -> i64 {
        self.cycles_per_second
    }
}

/// Decodes a gzip pprof and folds it into collapsed stacks.
pub fn collapse(encoded: &[u8]) -> BTreeMap<String, Vec<i64>> {
    let profile = deserialize_compressed_pprof(encoded).unwrap();
    stack_collapse(&profile).unwrap()
}

#[track_caller]
pub fn expect_stack(collapsed: &BTreeMap<String, Vec<i64>>, stack: &str, values: &[i64]) {
    match collapsed.get(stack) {
        Some(found) => assert_eq!(found, values, "values of {stack}"),
        None => panic!("{stack} not found in {collapsed:?}"),
    }
}
