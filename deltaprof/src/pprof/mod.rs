// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stack interning and the gzip pprof encoder.

mod builder;
mod deck;
mod frames;
mod interner;
pub mod test_utils;

pub use builder::*;
pub use deck::*;
pub use frames::*;
pub use interner::*;

use crate::ProfileError;

/// The encoder side of the delta profilers. Both the pprof and the OTLP
/// encoders implement it, so delta computation is written once.
pub trait ProfileBuilder {
    /// Appends the location ids for `stack` (return addresses, leaf first)
    /// to `locs`, emitting locations and functions not seen before.
    ///
    /// Nothing may be appended, e.g. when the stack only holds the thread
    /// exit marker.
    fn append_locs_for_stack(
        &mut self,
        locs: &mut Vec<u64>,
        stack: &[usize],
    ) -> Result<(), ProfileError>;

    /// Appends one sample. A non-zero `block_size` is attached as the
    /// numeric "bytes" label.
    fn sample(&mut self, values: &[i64], locs: &[u64], block_size: i64)
        -> Result<(), ProfileError>;
}
