// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod compressed_streaming_encoder;

pub use compressed_streaming_encoder::*;
