// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{LineInfo, LocationSink, ProfileBuilder, StackInterner};
use crate::collections::StringTable;
use crate::mapping::MemMap;
use crate::runtime::Symbolizer;
use crate::serializer::StreamingEncoder;
use crate::{ProfileConfig, ProfileError, ProfileOptions, ValueTypeDef};
use deltaprof_protobuf::{
    profile_field, Field, Function, Line, Location, Mapping, NumLabel, Sample, StringOffset,
    ValueType, NO_OPT_ZERO, OPT_ZERO,
};
use std::io::Write;
use std::sync::Arc;
use std::time::SystemTime;

struct PprofSink<W: Write> {
    encoder: StreamingEncoder<W>,
    strings: StringTable,
    lines: Vec<Field<Line, 4, NO_OPT_ZERO>>,
}

impl<W: Write> PprofSink<W> {
    fn value_type(&mut self, def: &ValueTypeDef) -> Result<ValueType, ProfileError> {
        Ok(ValueType::new(
            self.strings.intern(&def.r#type)?,
            self.strings.intern(&def.unit)?,
        ))
    }
}

impl<W: Write> LocationSink for PprofSink<W> {
    fn location(
        &mut self,
        id: u64,
        mapping_id: u64,
        address: u64,
        lines: &[LineInfo],
    ) -> Result<(), ProfileError> {
        self.lines.clear();
        self.lines.try_reserve(lines.len())?;
        self.lines.extend(
            lines
                .iter()
                .map(|line| Field::from(Line::new(line.function_id, line.line))),
        );
        let location = Location {
            id: id.into(),
            mapping_id: mapping_id.into(),
            address: address.into(),
            lines: &self.lines,
        };
        self.encoder
            .encode(&Field::<_, { profile_field::LOCATION }, NO_OPT_ZERO>::from(location))?;
        Ok(())
    }

    fn function(
        &mut self,
        id: u64,
        name: &str,
        file: &str,
        start_line: i64,
    ) -> Result<(), ProfileError> {
        let name = self.strings.intern(name)?;
        let function = Function {
            id: id.into(),
            name: name.into(),
            system_name: name.into(),
            filename: self.strings.intern(file)?.into(),
            start_line: start_line.into(),
        };
        self.encoder
            .encode(&Field::<_, { profile_field::FUNCTION }, NO_OPT_ZERO>::from(function))?;
        Ok(())
    }
}

/// Streams one pprof profile to a writer.
///
/// Header fields are written on construction, then samples, locations and
/// functions as they are produced. [`PprofBuilder::build`] appends the
/// mappings and the string table and closes the stream. A builder produces
/// exactly one profile; interned locations, functions and strings die with
/// it.
pub struct PprofBuilder<W: Write> {
    interner: StackInterner,
    sink: PprofSink<W>,
    bytes_key: StringOffset,
    start: SystemTime,
    samples: usize,
}

impl<W: Write> PprofBuilder<W> {
    pub fn new(
        writer: W,
        options: &ProfileOptions,
        mappings: Vec<MemMap>,
        symbolizer: Arc<dyn Symbolizer>,
        config: &ProfileConfig,
    ) -> Result<Self, ProfileError> {
        let encoder = if options.no_compression {
            StreamingEncoder::uncompressed(writer)
        } else {
            StreamingEncoder::gzip(writer)
        };
        let mut sink = PprofSink {
            encoder,
            strings: StringTable::new(),
            lines: Vec::new(),
        };

        let period_type = sink.value_type(&config.period_type)?;
        sink.encoder
            .encode(&Field::<_, { profile_field::PERIOD_TYPE }, NO_OPT_ZERO>::from(period_type))?;
        sink.encoder
            .encode(&Field::<_, { profile_field::PERIOD }, OPT_ZERO>::from(config.period))?;
        for def in &config.sample_types {
            let sample_type = sink.value_type(def)?;
            sink.encoder.encode(
                &Field::<_, { profile_field::SAMPLE_TYPE }, NO_OPT_ZERO>::from(sample_type),
            )?;
        }
        if !config.default_sample_type.is_empty() {
            let default_sample_type = sink.strings.intern(&config.default_sample_type)?;
            sink.encoder.encode(
                &Field::<_, { profile_field::DEFAULT_SAMPLE_TYPE }, OPT_ZERO>::from(
                    default_sample_type,
                ),
            )?;
        }
        let bytes_key = sink.strings.intern("bytes")?;

        Ok(Self {
            interner: StackInterner::new(symbolizer, options.generics_frames, 1, mappings),
            sink,
            bytes_key,
            start: SystemTime::now(),
            samples: 0,
        })
    }

    /// Writes the mappings and the string table, closes the compression
    /// stream and hands back the writer.
    ///
    /// # Errors
    /// If the writer fails. The output is then incomplete and must be
    /// discarded.
    pub fn build(self) -> Result<W, ProfileError> {
        let Self {
            interner,
            mut sink,
            start,
            samples,
            ..
        } = self;
        let time_nanos = start
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos() as i64);
        sink.encoder
            .encode(&Field::<_, { profile_field::TIME_NANOS }, OPT_ZERO>::from(time_nanos))?;

        let locations = interner.location_count();
        let functions = interner.function_count();
        for (i, m) in interner.mappings().iter().enumerate() {
            let mapping = Mapping {
                id: (i as u64 + 1).into(),
                memory_start: (m.start as u64).into(),
                memory_limit: (m.end as u64).into(),
                file_offset: m.offset.into(),
                filename: sink.strings.intern(&m.file)?.into(),
                build_id: sink.strings.intern(&m.build_id)?.into(),
                has_functions: m.has_functions().into(),
            };
            sink.encoder
                .encode(&Field::<_, { profile_field::MAPPING }, NO_OPT_ZERO>::from(mapping))?;
        }

        for s in sink.strings.iter() {
            sink.encoder
                .encode(&Field::<&str, { profile_field::STRING_TABLE }, NO_OPT_ZERO>::from(s))?;
        }
        let writer = sink.encoder.finish()?;
        tracing::debug!(samples, locations, functions, "built pprof profile");
        Ok(writer)
    }
}

impl<W: Write> ProfileBuilder for PprofBuilder<W> {
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
        let label = [Field::from(NumLabel::new(self.bytes_key, block_size))];
        let labels: &[Field<NumLabel, 3, NO_OPT_ZERO>] = if block_size != 0 { &label } else { &[] };
        let sample = Sample {
            location_ids: locs.into(),
            values: values.into(),
            labels,
        };
        self.sink
            .encoder
            .encode(&Field::<_, { profile_field::SAMPLE }, NO_OPT_ZERO>::from(sample))?;
        self.samples += 1;
        Ok(())
    }
}
