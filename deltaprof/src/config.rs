// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;

/// The type and unit of a profile value, e.g. ("alloc_space", "bytes").
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValueTypeDef {
    pub r#type: Cow<'static, str>,
    pub unit: Cow<'static, str>,
}

impl ValueTypeDef {
    pub const fn new(r#type: &'static str, unit: &'static str) -> Self {
        Self {
            r#type: Cow::Borrowed(r#type),
            unit: Cow::Borrowed(unit),
        }
    }
}

/// Static description of one profile kind: what each sample value means and
/// the sampling period metadata written into the profile header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileConfig {
    pub period_type: ValueTypeDef,
    pub period: i64,
    pub sample_types: Vec<ValueTypeDef>,
    /// Written as the profile's default sample type when non-empty.
    pub default_sample_type: Cow<'static, str>,
}

impl ProfileConfig {
    /// Heap profiles sample one allocation every `rate` bytes on average.
    pub fn heap(rate: i64) -> Self {
        Self {
            period_type: ValueTypeDef::new("space", "bytes"),
            period: rate,
            sample_types: vec![
                ValueTypeDef::new("alloc_objects", "count"),
                ValueTypeDef::new("alloc_space", "bytes"),
                ValueTypeDef::new("inuse_objects", "count"),
                ValueTypeDef::new("inuse_space", "bytes"),
            ],
            default_sample_type: Cow::Borrowed(""),
        }
    }

    pub fn mutex() -> Self {
        Self {
            period_type: ValueTypeDef::new("contentions", "count"),
            period: 1,
            sample_types: vec![
                ValueTypeDef::new("contentions", "count"),
                ValueTypeDef::new("delay", "nanoseconds"),
            ],
            default_sample_type: Cow::Borrowed(""),
        }
    }

    /// Block profiles share the mutex profile's layout.
    pub fn block() -> Self {
        Self::mutex()
    }

    pub fn with_default_sample_type(mut self, sample_type: impl Into<Cow<'static, str>>) -> Self {
        self.default_sample_type = sample_type.into();
        self
    }
}
