// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::heap::DeltaHeapProfiler;
use crate::mapping::{MappingCache, MemMap, ProcSelfMaps};
use crate::mutex::{CounterSemantics, DeltaMutexProfiler, MutexProfileScaler};
use crate::pprof::{PprofBuilder, ProfileBuilder};
use crate::runtime::{
    BacktraceSymbolizer, BlockProfileRecord, ContentionSource, HeapSource, MappingSource,
    MemProfileRecord, Symbolizer,
};
use crate::{ProfileConfig, ProfileError, ProfileOptions};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::io::Write;
use std::sync::Arc;

/// Where addresses are resolved: symbols and memory mappings.
#[derive(Clone)]
pub struct Resolver {
    pub symbolizer: Arc<dyn Symbolizer>,
    pub mappings: Arc<dyn MappingSource>,
}

impl Resolver {
    pub fn new(symbolizer: Arc<dyn Symbolizer>, mappings: Arc<dyn MappingSource>) -> Self {
        Self {
            symbolizer,
            mappings,
        }
    }

    /// Resolves addresses of the current process.
    pub fn current_process() -> Self {
        Self::new(Arc::new(BacktraceSymbolizer::new()), Arc::new(ProcSelfMaps))
    }
}

struct HeapState {
    delta: DeltaHeapProfiler,
    mappings: MappingCache,
}

/// Delta state and sources shared by both heap profile encodings.
pub(crate) struct HeapCore {
    state: Mutex<HeapState>,
    source: Arc<dyn HeapSource>,
    pub(crate) resolver: Resolver,
    pub(crate) options: ProfileOptions,
}

impl HeapCore {
    pub(crate) fn new(
        source: Arc<dyn HeapSource>,
        resolver: Resolver,
        options: ProfileOptions,
    ) -> Self {
        Self {
            state: Mutex::new(HeapState {
                delta: DeltaHeapProfiler::new(),
                mappings: MappingCache::new(options.lazy_mappings),
            }),
            source,
            resolver,
            options,
        }
    }

    pub(crate) fn records(&self) -> Vec<MemProfileRecord> {
        self.source.mem_profile()
    }

    /// Runs one delta read under the lock, from builder construction to
    /// `finish`.
    pub(crate) fn write<B: ProfileBuilder, T>(
        &self,
        records: &[MemProfileRecord],
        new_builder: impl FnOnce(Vec<MemMap>, &ProfileConfig) -> Result<B, ProfileError>,
        finish: impl FnOnce(B) -> Result<T, ProfileError>,
    ) -> Result<T, ProfileError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let rate = self.source.sampling_rate();
        let config = ProfileConfig::heap(rate);
        let mappings = state.mappings.mappings(&*self.resolver.mappings);
        let mut b = new_builder(mappings, &config)?;
        state
            .delta
            .write_heap_proto(&mut b, &*self.resolver.symbolizer, records, rate)?;
        finish(b)
    }
}

struct ContentionState {
    delta: DeltaMutexProfiler,
    mappings: MappingCache,
}

/// Delta state and sources shared by both contention profile encodings.
pub(crate) struct ContentionCore {
    state: Mutex<ContentionState>,
    source: Arc<dyn ContentionSource>,
    scaler: MutexProfileScaler,
    config: ProfileConfig,
    pub(crate) resolver: Resolver,
    pub(crate) options: ProfileOptions,
}

impl ContentionCore {
    pub(crate) fn new(
        source: Arc<dyn ContentionSource>,
        resolver: Resolver,
        scaler: MutexProfileScaler,
        config: ProfileConfig,
        options: ProfileOptions,
    ) -> Self {
        Self {
            state: Mutex::new(ContentionState {
                delta: DeltaMutexProfiler::new(),
                mappings: MappingCache::new(options.lazy_mappings),
            }),
            source,
            scaler,
            config,
            resolver,
            options,
        }
    }

    /// The current contention records, most contended first.
    pub(crate) fn records(&self) -> Vec<BlockProfileRecord> {
        let mut records = self.source.contention_profile();
        records.sort_by_key(|r| Reverse(r.cycles));
        records
    }

    pub(crate) fn write<B: ProfileBuilder, T>(
        &self,
        records: &[BlockProfileRecord],
        new_builder: impl FnOnce(Vec<MemMap>, &ProfileConfig) -> Result<B, ProfileError>,
        finish: impl FnOnce(B) -> Result<T, ProfileError>,
    ) -> Result<T, ProfileError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mappings = state.mappings.mappings(&*self.resolver.mappings);
        let mut b = new_builder(mappings, &self.config)?;
        state.delta.print_count_cycle_profile(
            &mut b,
            self.scaler,
            self.source.cycles_per_second(),
            records,
        )?;
        finish(b)
    }
}

/// Writes heap profiles holding only what changed since the previous call.
///
/// Allocation values are deltas; in-use values are the current totals.
/// Calls are serialized; separate profilers run independently.
pub struct HeapProfiler {
    core: HeapCore,
}

impl HeapProfiler {
    pub fn new(source: Arc<dyn HeapSource>, resolver: Resolver, options: ProfileOptions) -> Self {
        Self {
            core: HeapCore::new(source, resolver, options),
        }
    }

    /// Reads the source and writes one gzip pprof profile to `writer`.
    ///
    /// # Errors
    /// Only if encoding fails. The output is then incomplete and must be
    /// discarded. Nothing to report is an empty, valid profile.
    pub fn profile<W: Write>(&self, writer: W) -> Result<W, ProfileError> {
        let records = self.core.records();
        self.profile_from_records(writer, &records)
    }

    /// Like [`HeapProfiler::profile`], with records read by the caller.
    pub fn profile_from_records<W: Write>(
        &self,
        writer: W,
        records: &[MemProfileRecord],
    ) -> Result<W, ProfileError> {
        let core = &self.core;
        core.write(
            records,
            |mappings, config| {
                PprofBuilder::new(
                    writer,
                    &core.options,
                    mappings,
                    Arc::clone(&core.resolver.symbolizer),
                    config,
                )
            },
            PprofBuilder::build,
        )
    }
}

/// Writes mutex or block contention profiles holding only what changed
/// since the previous call.
pub struct BlockProfiler {
    core: ContentionCore,
}

impl BlockProfiler {
    /// Profiles contended mutexes.
    pub fn mutex(
        source: Arc<dyn ContentionSource>,
        resolver: Resolver,
        semantics: CounterSemantics,
        options: ProfileOptions,
    ) -> Self {
        Self {
            core: ContentionCore::new(
                source,
                resolver,
                MutexProfileScaler::mutex(semantics),
                ProfileConfig::mutex(),
                options,
            ),
        }
    }

    /// Profiles blocking on synchronization primitives.
    pub fn block(
        source: Arc<dyn ContentionSource>,
        resolver: Resolver,
        semantics: CounterSemantics,
        options: ProfileOptions,
    ) -> Self {
        Self {
            core: ContentionCore::new(
                source,
                resolver,
                MutexProfileScaler::block(semantics),
                ProfileConfig::block(),
                options,
            ),
        }
    }

    /// Reads the source and writes one gzip pprof profile to `writer`.
    pub fn profile<W: Write>(&self, writer: W) -> Result<W, ProfileError> {
        let records = self.core.records();
        self.profile_from_records(writer, &records)
    }

    pub fn profile_from_records<W: Write>(
        &self,
        writer: W,
        records: &[BlockProfileRecord],
    ) -> Result<W, ProfileError> {
        let core = &self.core;
        core.write(
            records,
            |mappings, config| {
                PprofBuilder::new(
                    writer,
                    &core.options,
                    mappings,
                    Arc::clone(&core.resolver.symbolizer),
                    config,
                )
            },
            PprofBuilder::build,
        )
    }
}
