// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{ProfileError, SetHasher};
use deltaprof_protobuf::StringOffset;
use indexmap::IndexSet;

/// Interns strings to consecutive offsets. Offset 0 is always the empty
/// string.
pub struct StringTable {
    set: IndexSet<Box<str>, SetHasher>,
}

impl Default for StringTable {
    fn default() -> Self {
        let mut set = IndexSet::with_hasher(SetHasher::default());
        set.insert(Box::from(""));
        Self { set }
    }
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the offset of `s`, adding it on first use.
    pub fn intern(&mut self, s: &str) -> Result<StringOffset, ProfileError> {
        if let Some(index) = self.set.get_index_of(s) {
            return StringOffset::try_from(index).map_err(|_| ProfileError::StorageFull);
        }
        let offset =
            StringOffset::try_from(self.set.len()).map_err(|_| ProfileError::StorageFull)?;
        self.set.try_reserve(1)?;
        self.set.insert(Box::from(s));
        Ok(offset)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        // The empty string is always present.
        false
    }

    /// The strings in offset order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.set.iter().map(|s| &**s)
    }

    pub fn into_strings(self) -> Vec<String> {
        self.set.into_iter().map(String::from).collect()
    }
}
