// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Delta heap and contention profiles.
//!
//! The host runtime only exposes cumulative counters: everything ever
//! allocated per call stack, every contended lock acquisition ever observed.
//! The profilers in this crate remember what they reported last time and
//! emit only the change since the previous read, either as a gzip-compressed
//! pprof stream ([`HeapProfiler`], [`BlockProfiler`]) or as an in-memory
//! OTLP profile ([`otlp::HeapProfiler`], [`otlp::BlockProfiler`]).
//!
//! The runtime itself is reached through the traits in [`runtime`], so any
//! process, or a test, can feed records and symbols to the profilers.

pub mod collections;
mod config;
mod error;
pub mod heap;
pub mod mapping;
pub mod mutex;
mod options;
pub mod otlp;
pub mod pprof;
mod profiler;
pub mod runtime;
pub mod serializer;

pub use config::*;
pub use error::*;
pub use options::*;
pub use profiler::*;

/// Hasher used by the interning and delta maps. Keys are addresses and
/// symbol names, so a fast non-cryptographic hash is fine.
pub type SetHasher = core::hash::BuildHasherDefault<rustc_hash::FxHasher>;
