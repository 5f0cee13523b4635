// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Knobs shared by every profiler kind. Missing fields deserialize to their
/// defaults, so the struct can be embedded in a host configuration file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    /// Name functions by their full, type-parameter-qualified symbol, so
    /// `F[int]` and `F[string]` stay distinct. When false, all
    /// instantiations of a generic function share the collapsed `F[...]`
    /// name.
    pub generics_frames: bool,
    /// Read the memory mappings once and reuse them for every profile.
    pub lazy_mappings: bool,
    /// Write the raw protobuf stream instead of gzip.
    pub no_compression: bool,
}

impl ProfileOptions {
    pub fn with_generics_frames(mut self, generics_frames: bool) -> Self {
        self.generics_frames = generics_frames;
        self
    }

    pub fn with_lazy_mappings(mut self, lazy_mappings: bool) -> Self {
        self.lazy_mappings = lazy_mappings;
        self
    }

    pub fn with_no_compression(mut self, no_compression: bool) -> Self {
        self.no_compression = no_compression;
        self
    }
}
