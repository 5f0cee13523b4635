// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::SetHasher;
use hashbrown::{Equivalent, HashMap};

/// Per-key delta state: what was last reported, and what the current read
/// has accumulated so far.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProfMapEntry<P, A> {
    pub prev: P,
    pub acc: A,
}

#[derive(Debug, Eq, Hash, PartialEq)]
struct ProfKey {
    stack: Box<[usize]>,
    aux: usize,
}

/// Borrowed form of [`ProfKey`]. Field order and types hash identically.
#[derive(Hash)]
struct ProfKeyRef<'a> {
    stack: &'a [usize],
    aux: usize,
}

impl Equivalent<ProfKey> for ProfKeyRef<'_> {
    fn equivalent(&self, key: &ProfKey) -> bool {
        self.aux == key.aux && *self.stack == *key.stack
    }
}

/// Delta state keyed by stack and an auxiliary discriminant such as the
/// allocation block size.
///
/// Entries are created on first sight and live as long as the map: the
/// runtime never forgets a stack either. Keys compare by value, so callers
/// must pass stacks with trailing padding already trimmed.
///
/// The map is not synchronized; profilers guard it with their own lock.
#[derive(Debug)]
pub struct ProfMap<P, A> {
    index: HashMap<ProfKey, usize, SetHasher>,
    entries: Vec<ProfMapEntry<P, A>>,
}

impl<P, A> Default for ProfMap<P, A> {
    fn default() -> Self {
        Self {
            index: HashMap::default(),
            entries: Vec::new(),
        }
    }
}

impl<P: Default, A: Default> ProfMap<P, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for (`stack`, `aux`), inserting a zeroed one first
    /// if the key is new.
    pub fn lookup(&mut self, stack: &[usize], aux: usize) -> &mut ProfMapEntry<P, A> {
        let slot = match self.index.get(&ProfKeyRef { stack, aux }) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.entries.push(ProfMapEntry::default());
                let key = ProfKey {
                    stack: stack.into(),
                    aux,
                };
                self.index.insert(key, slot);
                slot
            }
        };
        &mut self.entries[slot]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
