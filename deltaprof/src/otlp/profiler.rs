// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{OtlpBuilder, Profile};
use crate::mutex::{CounterSemantics, MutexProfileScaler};
use crate::profiler::{ContentionCore, HeapCore};
use crate::runtime::{BlockProfileRecord, ContentionSource, HeapSource, MemProfileRecord};
use crate::{ProfileConfig, ProfileError, ProfileOptions, Resolver};
use std::sync::Arc;

/// [`crate::HeapProfiler`] producing OTLP profiles.
pub struct HeapProfiler {
    core: HeapCore,
}

impl HeapProfiler {
    pub fn new(source: Arc<dyn HeapSource>, resolver: Resolver, options: ProfileOptions) -> Self {
        Self {
            core: HeapCore::new(source, resolver, options),
        }
    }

    pub fn profile(&self) -> Result<Profile, ProfileError> {
        let records = self.core.records();
        self.profile_from_records(&records)
    }

    pub fn profile_from_records(
        &self,
        records: &[MemProfileRecord],
    ) -> Result<Profile, ProfileError> {
        let core = &self.core;
        core.write(
            records,
            |mappings, config| {
                OtlpBuilder::new(
                    &core.options,
                    mappings,
                    Arc::clone(&core.resolver.symbolizer),
                    config,
                )
            },
            OtlpBuilder::build,
        )
    }
}

/// [`crate::BlockProfiler`] producing OTLP profiles.
pub struct BlockProfiler {
    core: ContentionCore,
}

impl BlockProfiler {
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

    pub fn profile(&self) -> Result<Profile, ProfileError> {
        let records = self.core.records();
        self.profile_from_records(&records)
    }

    pub fn profile_from_records(
        &self,
        records: &[BlockProfileRecord],
    ) -> Result<Profile, ProfileError> {
        let core = &self.core;
        core.write(
            records,
            |mappings, config| {
                OtlpBuilder::new(
                    &core.options,
                    mappings,
                    Arc::clone(&core.resolver.symbolizer),
                    config,
                )
            },
            OtlpBuilder::build,
        )
    }
}
