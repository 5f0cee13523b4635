// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{Value, WireType};
use std::io::{self, Write};
use std::num::TryFromIntError;

/// String table entries, written as raw UTF-8.
impl Value for &str {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.len() as u64
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.as_bytes())
    }
}

/// Index into the profile string table. Index 0 is the empty string, which
/// also stands for "unset".
///
/// A table with more than `u32::MAX` entries cannot fit in a single protobuf
/// message, so 32 bits are enough.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(test, derive(bolero::generator::TypeGenerator))]
pub struct StringOffset(u32);

impl StringOffset {
    pub const ZERO: Self = Self(0);

    pub const fn new(offset: u32) -> Self {
        Self(offset)
    }
}

impl TryFrom<usize> for StringOffset {
    type Error = TryFromIntError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        u32::try_from(index).map(Self)
    }
}

/// Decoded profiles reference strings with `int64` fields.
impl From<StringOffset> for i64 {
    fn from(offset: StringOffset) -> Self {
        i64::from(offset.0)
    }
}

impl Value for StringOffset {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn proto_len(&self) -> u64 {
        u64::from(self.0).proto_len()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        u64::from(self.0).encode(writer)
    }
}
