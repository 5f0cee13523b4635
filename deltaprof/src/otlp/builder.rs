// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::proto::{self, BuildIdKind};
use crate::collections::StringTable;
use crate::mapping::MemMap;
use crate::pprof::{LineInfo, LocationSink, ProfileBuilder, StackInterner};
use crate::runtime::Symbolizer;
use crate::{ProfileConfig, ProfileError, ProfileOptions, ValueTypeDef};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

#[derive(Default)]
struct OtlpSink {
    strings: StringTable,
    location: Vec<proto::Location>,
    function: Vec<proto::Function>,
}

impl OtlpSink {
    fn string(&mut self, s: &str) -> Result<i64, ProfileError> {
        Ok(self.strings.intern(s)?.into())
    }

    fn value_type(&mut self, def: &ValueTypeDef) -> Result<proto::ValueType, ProfileError> {
        Ok(proto::ValueType {
            r#type: self.string(&def.r#type)?,
            unit: self.string(&def.unit)?,
            ..proto::ValueType::default()
        })
    }
}

impl LocationSink for OtlpSink {
    fn location(
        &mut self,
        id: u64,
        mapping_id: u64,
        address: u64,
        lines: &[LineInfo],
    ) -> Result<(), ProfileError> {
        self.location.try_reserve(1)?;
        self.location.push(proto::Location {
            id,
            mapping_index: mapping_id,
            address,
            line: lines
                .iter()
                .map(|line| proto::Line {
                    function_index: line.function_id,
                    line: line.line,
                    column: 0,
                })
                .collect(),
            ..proto::Location::default()
        });
        Ok(())
    }

    fn function(
        &mut self,
        id: u64,
        name: &str,
        file: &str,
        start_line: i64,
    ) -> Result<(), ProfileError> {
        let name = self.string(name)?;
        let filename = self.string(file)?;
        self.function.try_reserve(1)?;
        self.function.push(proto::Function {
            id,
            name,
            system_name: name,
            filename,
            start_line,
        });
        Ok(())
    }
}

/// Builds one OTLP profile in memory.
///
/// Locations and functions are identified by their index in the profile,
/// so ids start at 0. Samples reference their locations through ranges of
/// `location_indices`.
pub struct OtlpBuilder {
    interner: StackInterner,
    sink: OtlpSink,
    profile: proto::Profile,
    bytes_key: i64,
    start: SystemTime,
    started: Instant,
}

impl OtlpBuilder {
    pub fn new(
        options: &ProfileOptions,
        mappings: Vec<MemMap>,
        symbolizer: Arc<dyn Symbolizer>,
        config: &ProfileConfig,
    ) -> Result<Self, ProfileError> {
        let mut sink = OtlpSink::default();
        let mut profile = proto::Profile {
            period_type: Some(sink.value_type(&config.period_type)?),
            period: config.period,
            ..proto::Profile::default()
        };
        for def in &config.sample_types {
            profile.sample_type.push(sink.value_type(def)?);
        }
        if !config.default_sample_type.is_empty() {
            profile.default_sample_type = sink.string(&config.default_sample_type)?;
        }
        let bytes_key = sink.string("bytes")?;

        Ok(Self {
            interner: StackInterner::new(symbolizer, options.generics_frames, 0, mappings),
            sink,
            profile,
            bytes_key,
            start: SystemTime::now(),
            started: Instant::now(),
        })
    }

    pub fn build(self) -> Result<proto::Profile, ProfileError> {
        let Self {
            interner,
            mut sink,
            mut profile,
            start,
            started,
            ..
        } = self;

        for (i, m) in interner.mappings().iter().enumerate() {
            let mapping = proto::Mapping {
                id: i as u64 + 1,
                memory_start: m.start as u64,
                memory_limit: m.end as u64,
                file_offset: m.offset,
                filename: sink.string(&m.file)?,
                build_id: sink.string(&m.build_id)?,
                build_id_kind: BuildIdKind::Linker as i32,
                has_functions: m.has_functions(),
                ..proto::Mapping::default()
            };
            profile.mapping.push(mapping);
        }

        profile.location = sink.location;
        profile.function = sink.function;
        profile.string_table = sink.strings.into_strings();
        profile.time_nanos = start
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos() as i64);
        profile.duration_nanos = started.elapsed().as_nanos() as i64;
        tracing::debug!(
            samples = profile.sample.len(),
            locations = profile.location.len(),
            functions = profile.function.len(),
            "built OTLP profile"
        );
        Ok(profile)
    }
}

impl ProfileBuilder for OtlpBuilder {
    fn append_locs_for_stack(
        &mut self,
        locs: &mut Vec<u64>,
        stack: &[usize],
    ) -> Result<(), ProfileError> {
        self.interner
            .append_locs_for_stack(locs, stack, &mut self.sink)
    }

    fn sample(
        &mut self,
        values: &[i64],
        locs: &[u64],
        block_size: i64,
    ) -> Result<(), ProfileError> {
        let start = self.profile.location_indices.len();
        self.profile.location_indices.try_reserve(locs.len())?;
        self.profile
            .location_indices
            .extend(locs.iter().map(|&loc| loc as i64));
        let label = if block_size != 0 {
            vec![proto::Label {
                key: self.bytes_key,
                num: block_size,
                ..proto::Label::default()
            }]
        } else {
            Vec::new()
        };
        self.profile.sample.try_reserve(1)?;
        self.profile.sample.push(proto::Sample {
            locations_start_index: start as u64,
            locations_length: locs.len() as u64,
            value: values.to_vec(),
            label,
            ..proto::Sample::default()
        });
        Ok(())
    }
}
