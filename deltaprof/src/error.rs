// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::collections::TryReserveError;
use std::io;

/// Errors surfaced while producing a profile.
///
/// Only encoding can fail. Counter resets and unresolvable addresses are
/// part of normal operation and are reconciled silently. When an error is
/// returned, whatever was already written to the output is incomplete and
/// must be discarded by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Failed to allocate memory needed for the operation.
    #[error("out of memory")]
    OutOfMemory,
    /// The underlying container or storage is full. This is different from
    /// out of memory, because it's caused by some other limitation, such as
    /// the string table being limited to 32-bit offsets.
    #[error("storage full")]
    StorageFull,
    #[error("{0}")]
    Other(Cow<'static, str>),
}

impl ProfileError {
    pub fn other(error: impl Into<Cow<'static, str>>) -> Self {
        Self::Other(error.into())
    }
}

impl From<TryReserveError> for ProfileError {
    #[cold]
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<hashbrown::TryReserveError> for ProfileError {
    #[cold]
    fn from(err: hashbrown::TryReserveError) -> Self {
        match err {
            hashbrown::TryReserveError::CapacityOverflow => ProfileError::StorageFull,
            hashbrown::TryReserveError::AllocError { .. } => ProfileError::OutOfMemory,
        }
    }
}

impl From<indexmap::TryReserveError> for ProfileError {
    #[cold]
    fn from(_: indexmap::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}
