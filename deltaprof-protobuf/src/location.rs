// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{
    encode_repeated, repeated_proto_len, Field, Value, WireType, NO_OPT_ZERO, OPT_ZERO,
};
use std::io::{self, Write};

/// Describes function and line table debug information. A location holds
/// one Line per frame: the first line is the leaf-most inlined call and the
/// last line is the caller that the inlined calls were folded into.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Location<'a> {
    /// Unique nonzero id for the location. A profile could use instruction
    /// addresses or any integer sequence as ids.
    pub id: Field<u64, 1, NO_OPT_ZERO>,
    /// The id of the corresponding profile.Mapping for this location.
    /// It can be unset if the mapping is unknown or not applicable for
    /// this profile type.
    pub mapping_id: Field<u64, 2, OPT_ZERO>,
    /// The instruction address for this location, if available. It should be
    /// within `Mapping.memory_start..Mapping.memory_limit` for the
    /// corresponding mapping. A non-leaf address may be in the middle of a
    /// call instruction. It is up to display tools to find the beginning of
    /// the instruction if necessary.
    pub address: Field<u64, 3, OPT_ZERO>,
    pub lines: &'a [Field<Line, 4, NO_OPT_ZERO>],
}

/// Represents function and line number information. Omits column.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(bolero::generator::TypeGenerator))]
pub struct Line {
    /// The id of the corresponding profile.Function for this line.
    pub function_id: Field<u64, 1, OPT_ZERO>,
    /// Line number in source code.
    pub lineno: Field<i64, 2, OPT_ZERO>,
}

impl Line {
    pub fn new(function_id: u64, lineno: i64) -> Self {
        Self {
            function_id: Field::from(function_id),
            lineno: Field::from(lineno),
        }
    }
}

impl Value for Line {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.function_id.proto_len() + self.lineno.proto_len()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.function_id.encode(writer)?;
        self.lineno.encode(writer)
    }
}

impl Value for Location<'_> {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.id.proto_len()
            + self.mapping_id.proto_len()
            + self.address.proto_len()
            + repeated_proto_len(self.lines)
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.id.encode(writer)?;
        self.mapping_id.encode(writer)?;
        self.address.encode(writer)?;
        encode_repeated(self.lines, writer)
    }
}

#[cfg(feature = "prost_impls")]
impl From<&Line> for crate::prost_impls::Line {
    fn from(line: &Line) -> Self {
        Self {
            function_id: line.function_id.value,
            line: line.lineno.value,
        }
    }
}

#[cfg(feature = "prost_impls")]
impl From<&Location<'_>> for crate::prost_impls::Location {
    fn from(location: &Location) -> Self {
        Self {
            id: location.id.value,
            mapping_id: location.mapping_id.value,
            address: location.address.value,
            lines: location
                .lines
                .iter()
                .map(|line| crate::prost_impls::Line::from(&line.value))
                .collect(),
        }
    }
}
