// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{Field, StringOffset, Value, WireType, OPT_ZERO};
use std::io::{self, Write};

/// A (type, unit) pair such as ("alloc_space", "bytes"), as string table
/// offsets. Written once per sample type and once as the period type.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(bolero::generator::TypeGenerator))]
pub struct ValueType {
    pub r#type: Field<StringOffset, 1, OPT_ZERO>,
    pub unit: Field<StringOffset, 2, OPT_ZERO>,
}

impl ValueType {
    pub fn new(r#type: StringOffset, unit: StringOffset) -> Self {
        Self {
            r#type: r#type.into(),
            unit: unit.into(),
        }
    }
}

impl Value for ValueType {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.r#type.proto_len() + self.unit.proto_len()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.r#type.encode(writer)?;
        self.unit.encode(writer)
    }
}

#[cfg(feature = "prost_impls")]
impl From<ValueType> for crate::prost_impls::ValueType {
    fn from(value_type: ValueType) -> Self {
        Self {
            r#type: value_type.r#type.value.into(),
            unit: value_type.unit.value.into(),
        }
    }
}
