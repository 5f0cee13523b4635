// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delta profiles as in-memory OTLP profiles, for callers that batch or
//! merge profiles before sending them.

mod builder;
mod profiler;
mod proto;

pub use builder::*;
pub use profiler::*;
pub use proto::*;
