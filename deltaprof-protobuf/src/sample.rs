// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{
    encode_repeated, repeated_proto_len, Field, StringOffset, Value, WireType, NO_OPT_ZERO,
    OPT_ZERO,
};
use std::io::{self, Write};

/// Each Sample records values encountered in some program context. The
/// program context is typically a stack trace, perhaps augmented with
/// auxiliary information like the allocation size.
///
/// It borrows its data but requires it to be a slice. An iterator wouldn't
/// work well because we have to walk over the fields twice: one to calculate
/// the length, and one to encode it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Sample<'a> {
    /// The ids recorded here correspond to a Profile.location.id.
    /// The leaf is at location_id\[0\].
    pub location_ids: Field<&'a [u64], 1, NO_OPT_ZERO>,
    /// The type and unit of each value is defined by the corresponding entry
    /// in Profile.sample_type. All samples must have the same number of
    /// values, the same as the length of Profile.sample_type.
    pub values: Field<&'a [i64], 2, NO_OPT_ZERO>,
    /// NOTE: While possible, having multiple values for the same label key is
    /// strongly discouraged and should never be used.
    pub labels: &'a [Field<NumLabel, 3, NO_OPT_ZERO>],
}

/// A numeric sample label, such as the allocation block size under the
/// "bytes" key. The string value and unit of the pprof Label message are
/// never written.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(bolero::generator::TypeGenerator))]
pub struct NumLabel {
    pub key: Field<StringOffset, 1, OPT_ZERO>,
    pub num: Field<i64, 3, OPT_ZERO>,
}

impl NumLabel {
    pub fn new(key: StringOffset, num: i64) -> Self {
        Self {
            key: key.into(),
            num: num.into(),
        }
    }
}

impl Value for NumLabel {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.key.proto_len() + self.num.proto_len()
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.key.encode(writer)?;
        self.num.encode(writer)
    }
}

#[cfg(feature = "prost_impls")]
impl From<&NumLabel> for crate::prost_impls::Label {
    fn from(label: &NumLabel) -> Self {
        Self {
            key: label.key.value.into(),
            num: label.num.value,
        }
    }
}

impl Value for Sample<'_> {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn proto_len(&self) -> u64 {
        self.location_ids.proto_len() + self.values.proto_len() + repeated_proto_len(self.labels)
    }

    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.location_ids.encode(writer)?;
        self.values.encode(writer)?;
        encode_repeated(self.labels, writer)
    }
}

#[cfg(feature = "prost_impls")]
impl From<Sample<'_>> for crate::prost_impls::Sample {
    fn from(sample: Sample) -> Self {
        Self {
            location_ids: Vec::from_iter(sample.location_ids.value.iter().copied()),
            values: Vec::from_iter(sample.values.value.iter().copied()),
            labels: sample
                .labels
                .iter()
                .map(|field| crate::prost_impls::Label::from(&field.value))
                .collect(),
        }
    }
}
