// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::*;
use deltaprof::heap::scale_heap_sample;
use deltaprof::mapping::{MemMap, StaticMappings};
use deltaprof::mutex::{CounterSemantics, MutexProfileScaler};
use deltaprof::pprof::test_utils::{
    deserialize_compressed_pprof, deserialize_pprof, string_table_fetch,
};
use deltaprof::runtime::{MappingSource, StaticSymbolizer};
use deltaprof::{BlockProfiler, HeapProfiler, ProfileError, ProfileOptions, Resolver};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn heap_profiler() -> (Arc<FakeRuntime>, HeapProfiler) {
    let runtime = Arc::new(FakeRuntime::default());
    let profiler = HeapProfiler::new(runtime.clone(), resolver(), ProfileOptions::default());
    (runtime, profiler)
}

fn heap_dump(
    profiler: &HeapProfiler,
    records: &[deltaprof::runtime::MemProfileRecord],
) -> std::collections::BTreeMap<String, Vec<i64>> {
    collapse(&profiler.profile_from_records(Vec::new(), records).unwrap())
}

#[test]
fn heap_delta() {
    let (_, profiler) = heap_profiler();

    let p1 = heap_dump(
        &profiler,
        &[
            heap_record(0, 0, 0, 0, &STACK0),
            heap_record(0, 0, 0, 0, &STACK1),
        ],
    );
    assert!(p1.is_empty());

    let records = [
        heap_record(5, 5 * OBJECT_SIZE, 0, 0, &STACK0),
        heap_record(3, 3 * OBJECT_SIZE, 3, 3 * OBJECT_SIZE, &STACK1),
    ];
    let p2 = heap_dump(&profiler, &records);
    expect_stack(&p2, STACK0_MARKER, &[10, 3525422, 10, 3525422]);
    expect_stack(&p2, STACK1_MARKER, &[6, 2115253, 0, 0]);

    for _ in 0..3 {
        // Nothing was allocated. Live objects are still reported.
        let p3 = heap_dump(&profiler, &records);
        expect_stack(&p3, STACK0_MARKER, &[0, 0, 10, 3525422]);
        assert!(!p3.contains_key(STACK1_MARKER));
    }

    let p4 = heap_dump(
        &profiler,
        &[
            heap_record(5, 5 * OBJECT_SIZE, 5, 5 * OBJECT_SIZE, &STACK0),
            heap_record(3, 3 * OBJECT_SIZE, 3, 3 * OBJECT_SIZE, &STACK1),
        ],
    );
    assert!(p4.is_empty());

    let p5 = heap_dump(
        &profiler,
        &[
            heap_record(8, 8 * OBJECT_SIZE, 5, 5 * OBJECT_SIZE, &STACK0),
            heap_record(3, 3 * OBJECT_SIZE, 3, 3 * OBJECT_SIZE, &STACK1),
        ],
    );
    expect_stack(&p5, STACK0_MARKER, &[6, 2115253, 6, 2115253]);
    assert!(!p5.contains_key(STACK1_MARKER));
}

#[test]
fn heap_duplicates_are_merged() {
    let (_, profiler) = heap_profiler();
    const BLOCK_SIZE: i64 = 1024;
    let records = [
        heap_record(239, 239 * BLOCK_SIZE, 239, 239 * BLOCK_SIZE, &STACK0),
        heap_record(42, 42 * BLOCK_SIZE, 42, 42 * BLOCK_SIZE, &STACK1),
        heap_record(7, 7 * BLOCK_SIZE, 7, 7 * BLOCK_SIZE, &STACK0),
    ];
    let p = heap_dump(&profiler, &records);
    let (c1, b1) = scale_heap_sample(239 + 7, (239 + 7) * BLOCK_SIZE, RATE);
    expect_stack(&p, STACK0_MARKER, &[c1, b1, 0, 0]);
    let (c2, b2) = scale_heap_sample(42, 42 * BLOCK_SIZE, RATE);
    expect_stack(&p, STACK1_MARKER, &[c2, b2, 0, 0]);

    assert!(heap_dump(&profiler, &records).is_empty());
}

#[test]
fn heap_block_sizes_stay_separate() {
    let (_, profiler) = heap_profiler();
    let encoded = profiler
        .profile_from_records(
            Vec::new(),
            &[
                heap_record(4, 4 * 64, 4, 4 * 64, &STACK0),
                heap_record(2, 2 * 4096, 2, 2 * 4096, &STACK0),
            ],
        )
        .unwrap();
    let profile = deserialize_compressed_pprof(&encoded).unwrap();
    assert_eq!(profile.samples.len(), 2);
    let mut sizes: Vec<i64> = profile
        .samples
        .iter()
        .map(|s| {
            assert_eq!(string_table_fetch(&profile, s.labels[0].key), "bytes");
            s.labels[0].num
        })
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, [64, 4096]);
    // Both samples share their locations.
    assert_eq!(profile.locations.len(), 2);
}

#[test]
fn heap_counter_reset_rebaselines() {
    let (_, profiler) = heap_profiler();
    let p = heap_dump(&profiler, &[heap_record(10, 10 * 64, 10, 10 * 64, &STACK0)]);
    assert!(p.contains_key(STACK0_MARKER));

    // The bucket was recycled: its counter went backwards.
    let p = heap_dump(&profiler, &[heap_record(4, 4 * 64, 4, 4 * 64, &STACK0)]);
    assert!(p.is_empty());

    let p = heap_dump(&profiler, &[heap_record(6, 6 * 64, 6, 6 * 64, &STACK0)]);
    let (count, bytes) = scale_heap_sample(2, 2 * 64, RATE);
    expect_stack(&p, STACK0_MARKER, &[count, bytes, 0, 0]);
}

#[test]
fn heap_runtime_frames_are_hidden() {
    let (_, profiler) = heap_profiler();
    let p = heap_dump(
        &profiler,
        &[
            heap_record(1, 512, 0, 0, &[MALLOC, RUNTIME_CALLER, STACK1[0], STACK1[1]]),
            heap_record(1, 256, 0, 0, &[MALLOC, RUNTIME_CALLER]),
        ],
    );
    let stacks: Vec<&str> = p.keys().map(String::as_str).collect();
    assert_eq!(
        stacks,
        [
            STACK1_MARKER,
            // Only runtime frames: shown rather than dropped.
            "runtime.newobject;runtime.mallocgc",
        ]
    );
}

#[test]
fn heap_profile_reads_the_source() {
    let (runtime, profiler) = heap_profiler();
    runtime
        .heap
        .lock()
        .push(heap_record(5, 5 * OBJECT_SIZE, 0, 0, &STACK0));
    let p = collapse(&profiler.profile(Vec::new()).unwrap());
    expect_stack(&p, STACK0_MARKER, &[10, 3525422, 10, 3525422]);
}

#[test]
fn inlined_frames_share_a_location() {
    let (_, profiler) = heap_profiler();
    let records = [heap_record(1, 100, 0, 0, &INLINED_STACK)];
    let encoded = profiler.profile_from_records(Vec::new(), &records).unwrap();
    let profile = deserialize_compressed_pprof(&encoded).unwrap();
    assert_eq!(profile.locations.len(), 2);
    assert_eq!(profile.locations[0].lines.len(), 3);
    let collapsed = deltaprof::pprof::test_utils::stack_collapse(&profile).unwrap();
    assert!(collapsed.contains_key("main.caller0;main.outer;main.middle;main.inner"));
}

#[test]
fn thread_exit_is_not_reported() {
    let (_, profiler) = heap_profiler();
    let p = heap_dump(
        &profiler,
        &[heap_record(1, 100, 0, 0, &[STACK0[0], STACK0[1], GOEXIT])],
    );
    assert!(p.contains_key(STACK0_MARKER));
}

#[test]
fn empty_profile_is_valid() {
    let (_, profiler) = heap_profiler();
    let encoded = profiler.profile(Vec::new()).unwrap();
    let profile = deserialize_compressed_pprof(&encoded).unwrap();
    assert!(profile.samples.is_empty());
    assert!(profile.locations.is_empty());
    assert!(profile.functions.is_empty());
    assert_eq!(profile.sample_types.len(), 4);
    assert_eq!(profile.period, RATE);
    assert_eq!(profile.mappings.len(), 1);
    let mapping = &profile.mappings[0];
    assert_eq!(string_table_fetch(&profile, mapping.filename), "/usr/bin/app");
    assert_eq!(string_table_fetch(&profile, mapping.build_id), "deadbeef");
}

#[test]
fn mapping_reports_failed_symbolization() {
    let (_, profiler) = heap_profiler();
    let encoded = profiler
        .profile_from_records(Vec::new(), &[heap_record(1, 100, 0, 0, &STACK0)])
        .unwrap();
    let profile = deserialize_compressed_pprof(&encoded).unwrap();
    assert!(profile.mappings[0].has_functions);

    // A fresh profile starts with fresh flags.
    let encoded = profiler
        .profile_from_records(Vec::new(), &[heap_record(1, 100, 0, 0, &[0x1500])])
        .unwrap();
    let profile = deserialize_compressed_pprof(&encoded).unwrap();
    assert!(!profile.mappings[0].has_functions);
    assert_eq!(profile.locations[0].mapping_id, 1);
}

#[test]
fn generics_frames_option() {
    let mut symbolizer = StaticSymbolizer::new();
    symbolizer.insert_function(0x1100, "main.F[go.shape.int]", "main.go", 3);
    symbolizer.insert_function(0x1200, "main.F[go.shape.string]", "main.go", 3);
    let records = [
        heap_record(1, 100, 0, 0, &[0x1100]),
        heap_record(1, 100, 0, 0, &[0x1200]),
    ];

    for (generics_frames, expected) in [
        (false, vec!["main.F[...]"]),
        (true, vec!["main.F[go.shape.int]", "main.F[go.shape.string]"]),
    ] {
        let profiler = HeapProfiler::new(
            Arc::new(FakeRuntime::default()),
            Resolver::new(
                Arc::new(symbolizer.clone()),
                Arc::new(StaticMappings(vec![text_mapping()])),
            ),
            ProfileOptions::default().with_generics_frames(generics_frames),
        );
        let p = heap_dump(&profiler, &records);
        let stacks: Vec<&str> = p.keys().map(String::as_str).collect();
        assert_eq!(stacks, expected);
    }
}

#[test]
fn uncompressed_output() {
    let profiler = HeapProfiler::new(
        Arc::new(FakeRuntime::default()),
        resolver(),
        ProfileOptions::default().with_no_compression(true),
    );
    let encoded = profiler
        .profile_from_records(Vec::new(), &[heap_record(1, 100, 0, 0, &STACK0)])
        .unwrap();
    let profile = deserialize_pprof(&encoded).unwrap();
    assert_eq!(profile.samples.len(), 1);
}

struct CountingMappings {
    reads: AtomicUsize,
}

impl MappingSource for CountingMappings {
    fn read_mappings(&self) -> Vec<MemMap> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        vec![text_mapping()]
    }
}

#[test]
fn lazy_mappings_are_read_once() {
    for (lazy, expected_reads) in [(true, 1), (false, 3)] {
        let mappings = Arc::new(CountingMappings {
            reads: AtomicUsize::new(0),
        });
        let profiler = HeapProfiler::new(
            Arc::new(FakeRuntime::default()),
            Resolver::new(Arc::new(symbolizer()), mappings.clone()),
            ProfileOptions::default().with_lazy_mappings(lazy),
        );
        for _ in 0..3 {
            profiler.profile(Vec::new()).unwrap();
        }
        assert_eq!(mappings.reads.load(Ordering::Relaxed), expected_reads);
    }
}

#[test]
fn missing_mappings_get_a_fake_one() {
    let profiler = HeapProfiler::new(
        Arc::new(FakeRuntime::default()),
        Resolver::new(Arc::new(symbolizer()), Arc::new(StaticMappings::default())),
        ProfileOptions::default(),
    );
    let encoded = profiler
        .profile_from_records(Vec::new(), &[heap_record(1, 100, 0, 0, &STACK0)])
        .unwrap();
    let profile = deserialize_compressed_pprof(&encoded).unwrap();
    assert_eq!(profile.mappings.len(), 1);
    assert_eq!(profile.mappings[0].memory_limit, 0);
    assert!(profile.locations.iter().all(|l| l.mapping_id == 1));
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }
}

#[test]
fn writer_errors_are_returned() {
    let (_, profiler) = heap_profiler();
    let err = profiler
        .profile_from_records(FailingWriter, &[heap_record(1, 100, 0, 0, &STACK0)])
        .err()
        .unwrap();
    assert!(matches!(err, ProfileError::Io(_)));
}

/// Enough distinct stacks that the encoder flushes while samples are still
/// being written.
fn many_stacks() -> Vec<[usize; 2]> {
    (0..2000).map(|i| [0x10_0000 + i * 0x10, STACK0[1]]).collect()
}

#[test]
fn heap_write_failure_keeps_later_deltas_exact() {
    let runtime = Arc::new(FakeRuntime {
        rate: 1,
        ..FakeRuntime::default()
    });
    let options = ProfileOptions::default().with_no_compression(true);
    let profiler = HeapProfiler::new(runtime, resolver(), options);
    let stacks = many_stacks();
    let records: Vec<_> = stacks
        .iter()
        .map(|stack| heap_record(10, 640, 0, 0, stack))
        .collect();

    assert!(profiler.profile_from_records(FailingWriter, &records).is_err());

    let encoded = profiler.profile_from_records(Vec::new(), &records).unwrap();
    let profile = deserialize_pprof(&encoded).unwrap();
    assert_eq!(profile.samples.len(), stacks.len());
    for sample in &profile.samples {
        assert_eq!(sample.values, [0, 0, 10, 640]);
    }
}

#[test]
fn contention_write_failure_keeps_later_deltas_exact() {
    let options = ProfileOptions::default().with_no_compression(true);
    let profiler = BlockProfiler::block(
        Arc::new(FakeRuntime::default()),
        resolver(),
        CounterSemantics::PreCorrected,
        options,
    );
    let stacks = many_stacks();
    let records: Vec<_> = stacks
        .iter()
        .map(|stack| block_record(10, 1000, stack))
        .collect();

    assert!(profiler.profile_from_records(FailingWriter, &records).is_err());

    let records: Vec<_> = stacks
        .iter()
        .map(|stack| block_record(20, 2000, stack))
        .collect();
    let encoded = profiler.profile_from_records(Vec::new(), &records).unwrap();
    let profile = deserialize_pprof(&encoded).unwrap();
    assert_eq!(profile.samples.len(), stacks.len());
    for sample in &profile.samples {
        assert_eq!(sample.values, [10, 1000]);
    }
}

const CYCLES: i64 = 42;

fn contention_profilers() -> Vec<(&'static str, MutexProfileScaler, BlockProfiler)> {
    let semantics = CounterSemantics::Sampled {
        mutex_profile_fraction: 5,
    };
    let runtime = Arc::new(FakeRuntime::default());
    vec![
        (
            "mutex",
            MutexProfileScaler::mutex(semantics),
            BlockProfiler::mutex(
                runtime.clone(),
                resolver(),
                semantics,
                ProfileOptions::default(),
            ),
        ),
        (
            "block",
            MutexProfileScaler::block(semantics),
            BlockProfiler::block(runtime, resolver(), semantics, ProfileOptions::default()),
        ),
    ]
}

fn block_dump(
    profiler: &BlockProfiler,
    records: &[deltaprof::runtime::BlockProfileRecord],
) -> std::collections::BTreeMap<String, Vec<i64>> {
    collapse(&profiler.profile_from_records(Vec::new(), records).unwrap())
}

fn scaled(scaler: MutexProfileScaler, count: i64, cycles: i64) -> (i64, i64) {
    // One cycle per nanosecond.
    let (count, nanoseconds) = scaler.scale(count, cycles as f64);
    (count, nanoseconds as i64)
}

#[test]
fn contention_delta() {
    for (name, scaler, profiler) in contention_profilers() {
        let p1 = block_dump(
            &profiler,
            &[block_record(0, 0, &STACK0), block_record(0, 0, &STACK1)],
        );
        assert!(p1.is_empty(), "{name}");

        let records = [
            block_record(239, 239 * CYCLES, &STACK0),
            block_record(0, 0, &STACK1),
        ];
        let p2 = block_dump(&profiler, &records);
        let (count0, nanos0) = scaled(scaler, 239, 239 * CYCLES);
        expect_stack(&p2, STACK0_MARKER, &[count0, nanos0]);
        assert!(!p2.contains_key(STACK1_MARKER), "{name}");

        for _ in 0..2 {
            assert!(block_dump(&profiler, &records).is_empty(), "{name}");
        }

        let p4 = block_dump(&profiler, &[block_record(240, 240 * CYCLES, &STACK0)]);
        let (count1, nanos1) = scaled(scaler, 240, 240 * CYCLES);
        expect_stack(&p4, STACK0_MARKER, &[count1 - count0, nanos1 - nanos0]);
        assert!(!p4.contains_key(STACK1_MARKER), "{name}");
    }
}

#[test]
fn contention_duplicates_are_merged() {
    let runtime = Arc::new(FakeRuntime::default());
    let profiler = BlockProfiler::mutex(
        runtime,
        resolver(),
        CounterSemantics::PreCorrected,
        ProfileOptions::default(),
    );
    let records = [
        block_record(239, 239 * CYCLES, &STACK0),
        block_record(42, 42 * CYCLES, &STACK1),
        block_record(7, 7 * CYCLES, &STACK0),
    ];
    let p = block_dump(&profiler, &records);
    expect_stack(&p, STACK0_MARKER, &[239 + 7, (239 + 7) * CYCLES]);
    expect_stack(&p, STACK1_MARKER, &[42, 42 * CYCLES]);
    assert!(block_dump(&profiler, &records).is_empty());
}

#[test]
fn contention_counter_reset_rebaselines() {
    let profiler = BlockProfiler::block(
        Arc::new(FakeRuntime::default()),
        resolver(),
        CounterSemantics::PreCorrected,
        ProfileOptions::default(),
    );
    let p = block_dump(&profiler, &[block_record(10, 1000, &STACK0)]);
    expect_stack(&p, STACK0_MARKER, &[10, 1000]);
    assert!(block_dump(&profiler, &[block_record(5, 500, &STACK0)]).is_empty());
    let p = block_dump(&profiler, &[block_record(7, 700, &STACK0)]);
    expect_stack(&p, STACK0_MARKER, &[2, 200]);
}

#[test]
fn contention_profile_is_sorted_by_cycles() {
    let runtime = Arc::new(FakeRuntime::default());
    runtime.contention.lock().extend([
        block_record(1, 10, &STACK0),
        block_record(1, 5000, &STACK1),
    ]);
    let profiler = BlockProfiler::block(
        runtime,
        resolver(),
        CounterSemantics::PreCorrected,
        ProfileOptions::default(),
    );
    let encoded = profiler.profile(Vec::new()).unwrap();
    let profile = deserialize_compressed_pprof(&encoded).unwrap();
    let values: Vec<&[i64]> = profile.samples.iter().map(|s| s.values.as_slice()).collect();
    assert_eq!(values, [&[1, 5000][..], &[1, 10][..]]);
    assert!(profile.samples.iter().all(|s| s.labels.is_empty()));
    let sample_type = &profile.sample_types[1];
    assert_eq!(string_table_fetch(&profile, sample_type.r#type), "delay");
    assert_eq!(string_table_fetch(&profile, sample_type.unit), "nanoseconds");
}

#[test]
fn cycles_are_converted_to_nanoseconds() {
    let runtime = Arc::new(FakeRuntime {
        cycles_per_second: 2_000_000_000,
        ..FakeRuntime::default()
    });
    let profiler = BlockProfiler::block(
        runtime,
        resolver(),
        CounterSemantics::PreCorrected,
        ProfileOptions::default(),
    );
    let p = block_dump(&profiler, &[block_record(3, 3000, &STACK0)]);
    expect_stack(&p, STACK0_MARKER, &[3, 1500]);
}
