// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding helpers for checking emitted profiles.

use crate::otlp;
use anyhow::Context;
use deltaprof_protobuf::prost_impls::{Profile, Sample};
use prost::Message;
use std::collections::BTreeMap;
use std::io::Read;

pub fn deserialize_compressed_pprof(encoded: &[u8]) -> anyhow::Result<Profile> {
    let mut decoder = flate2::read::GzDecoder::new(encoded);
    let mut buf = Vec::new();
    decoder
        .read_to_end(&mut buf)
        .context("failed to decompress gzip pprof")?;
    deserialize_pprof(&buf)
}

pub fn deserialize_pprof(encoded: &[u8]) -> anyhow::Result<Profile> {
    Ok(Profile::decode(encoded)?)
}

pub fn sorted_samples(profile: &Profile) -> Vec<Sample> {
    let mut samples = profile.samples.clone();
    samples.sort_unstable();
    samples
}

#[track_caller]
#[allow(clippy::panic)]
pub fn string_table_fetch(profile: &Profile, id: i64) -> &String {
    profile
        .string_table
        .get(id as usize)
        .unwrap_or_else(|| panic!("String {id} not found"))
}

/// Folds samples into `"root;...;leaf" -> values`, summing samples with the
/// same collapsed stack. Frames are named by function.
pub fn stack_collapse(profile: &Profile) -> anyhow::Result<BTreeMap<String, Vec<i64>>> {
    let strings = |id: i64| {
        profile
            .string_table
            .get(id as usize)
            .with_context(|| format!("string {id} not found"))
    };
    let mut collapsed = BTreeMap::new();
    for sample in &profile.samples {
        let mut names = Vec::new();
        for &location_id in &sample.location_ids {
            let location = profile
                .locations
                .iter()
                .find(|l| l.id == location_id)
                .with_context(|| format!("location {location_id} not found"))?;
            for line in &location.lines {
                let function = profile
                    .functions
                    .iter()
                    .find(|f| f.id == line.function_id)
                    .with_context(|| format!("function {} not found", line.function_id))?;
                names.push(strings(function.name)?.as_str());
            }
        }
        add_collapsed(&mut collapsed, names, &sample.values);
    }
    Ok(collapsed)
}

/// [`stack_collapse`] for an OTLP profile.
pub fn stack_collapse_otlp(
    profile: &otlp::Profile,
) -> anyhow::Result<BTreeMap<String, Vec<i64>>> {
    let strings = |id: i64| {
        profile
            .string_table
            .get(id as usize)
            .with_context(|| format!("string {id} not found"))
    };
    let mut collapsed = BTreeMap::new();
    for sample in &profile.sample {
        let start = sample.locations_start_index as usize;
        let end = start + sample.locations_length as usize;
        let indices = profile
            .location_indices
            .get(start..end)
            .context("location indices out of range")?;
        let mut names = Vec::new();
        for &index in indices {
            let location = profile
                .location
                .get(index as usize)
                .with_context(|| format!("location {index} not found"))?;
            for line in &location.line {
                let function = profile
                    .function
                    .get(line.function_index as usize)
                    .with_context(|| format!("function {} not found", line.function_index))?;
                names.push(strings(function.name)?.as_str());
            }
        }
        add_collapsed(&mut collapsed, names, &sample.value);
    }
    Ok(collapsed)
}

fn add_collapsed(collapsed: &mut BTreeMap<String, Vec<i64>>, mut names: Vec<&str>, values: &[i64]) {
    names.reverse();
    let sums = collapsed
        .entry(names.join(";"))
        .or_insert_with(|| vec![0; values.len()]);
    for (sum, value) in sums.iter_mut().zip(values) {
        *sum += value;
    }
}
