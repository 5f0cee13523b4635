// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod profmap;
mod string_table;

pub use profmap::*;
pub use string_table::*;
