// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{Field, StringOffset, Value, WireType, NO_OPT_ZERO, OPT_ZERO};
use std::io::{self, Write};

/// Describes the mapping of a binary in memory, including its address range,
/// file offset, and metadata like build ID.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(bolero::generator::TypeGenerator))]
pub struct Mapping {
    /// Unique nonzero id for the mapping.
    pub id: Field<u64, 1, NO_OPT_ZERO>,
    /// Address at which the binary (or DLL) is loaded into memory.
    pub memory_start: Field<u64, 2, OPT_ZERO>,
    /// The limit of the address range occupied by this mapping.
    pub memory_limit: Field<u64, 3, OPT_ZERO>,
    /// Offset in the binary that corresponds to the first mapped address.
    pub file_offset: Field<u64, 4, OPT_ZERO>,
    /// The object this entry is loaded from. This can be a filename on
    /// disk for the main binary and shared libraries, or virtual
    /// abstractions like "[vdso]".
    pub filename: Field<StringOffset, 5, OPT_ZERO>,
    /// A string that uniquely identifies a particular program version
    /// with high probability. E.g., for binaries generated by GNU tools,
    /// it could be the contents of the .note.gnu.build-id field.
    pub build_id: Field<StringOffset, 6, OPT_ZERO>,
    /// Every location in this mapping was symbolized to a function.
    pub has_functions: Field<bool, 7, OPT_ZERO>,
}

impl Value for Mapping {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.id.proto_len()
            + self.memory_start.proto_len()
            + self.memory_limit.proto_len()
            + self.file_offset.proto_len()
            + self.filename.proto_len()
            + self.build_id.proto_len()
            + self.has_functions.proto_len()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.id.encode(writer)?;
        self.memory_start.encode(writer)?;
        self.memory_limit.encode(writer)?;
        self.file_offset.encode(writer)?;
        self.filename.encode(writer)?;
        self.build_id.encode(writer)?;
        self.has_functions.encode(writer)
    }
}

#[cfg(feature = "prost_impls")]
impl From<&Mapping> for crate::prost_impls::Mapping {
    fn from(mapping: &Mapping) -> Self {
        Self {
            id: mapping.id.value,
            memory_start: mapping.memory_start.value,
            memory_limit: mapping.memory_limit.value,
            file_offset: mapping.file_offset.value,
            filename: mapping.filename.value.into(),
            build_id: mapping.build_id.value.into(),
            has_functions: mapping.has_functions.value,
        }
    }
}
