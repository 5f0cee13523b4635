// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{Field, StringOffset, Value, WireType, NO_OPT_ZERO, OPT_ZERO};
use std::io::{self, Write};

/// Represents a function in a profile.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(bolero::generator::TypeGenerator))]
pub struct Function {
    /// Unique nonzero id for the function.
    pub id: Field<u64, 1, NO_OPT_ZERO>,
    /// Name of the function, in human-readable form if available.
    pub name: Field<StringOffset, 2, OPT_ZERO>,
    /// Name of the function, as identified by the system.
    /// For instance, it can be a C++ mangled name.
    pub system_name: Field<StringOffset, 3, OPT_ZERO>,
    /// Source file containing the function.
    pub filename: Field<StringOffset, 4, OPT_ZERO>,
    /// Line number in source file of the function's first line.
    pub start_line: Field<i64, 5, OPT_ZERO>,
}

impl Value for Function {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.id.proto_len()
            + self.name.proto_len()
            + self.system_name.proto_len()
            + self.filename.proto_len()
            + self.start_line.proto_len()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.id.encode(writer)?;
        self.name.encode(writer)?;
        self.system_name.encode(writer)?;
        self.filename.encode(writer)?;
        self.start_line.encode(writer)
    }
}

#[cfg(feature = "prost_impls")]
impl From<&Function> for crate::prost_impls::Function {
    fn from(function: &Function) -> Self {
        Self {
            id: function.id.value,
            name: function.name.value.into(),
            system_name: function.system_name.value.into(),
            filename: function.filename.value.into(),
            start_line: function.start_line.value,
        }
    }
}
