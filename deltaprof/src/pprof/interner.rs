// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{all_frames, PcDeck};
use crate::mapping::{MemMap, SymbolizeFlag};
use crate::runtime::{Frame, Symbolizer};
use crate::{ProfileError, SetHasher};
use std::collections::HashMap;
use std::sync::Arc;

/// One line of an emitted location.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineInfo {
    pub function_id: u64,
    pub line: i64,
}

/// Receives the locations and functions produced while interning stacks.
/// A location is always delivered before the functions it introduces.
pub trait LocationSink {
    fn location(
        &mut self,
        id: u64,
        mapping_id: u64,
        address: u64,
        lines: &[LineInfo],
    ) -> Result<(), ProfileError>;

    fn function(
        &mut self,
        id: u64,
        name: &str,
        file: &str,
        start_line: i64,
    ) -> Result<(), ProfileError>;
}

#[derive(Debug)]
struct LocInfo {
    id: u64,
    /// Every address folded into the location, leaf first.
    pcs: Vec<usize>,
    first_pc_frames: Vec<Frame>,
    first_pc_flag: SymbolizeFlag,
}

#[derive(Debug)]
struct NewFunc {
    id: u64,
    name: String,
    file: String,
    start_line: i64,
}

/// Turns stacks of return addresses into location ids, for one profile.
///
/// Every distinct location and function is handed to the sink exactly once.
/// Ids are assigned consecutively from `id_base`. The interner also tracks
/// the symbolization flags of each mapping.
pub struct StackInterner {
    symbolizer: Arc<dyn Symbolizer>,
    generics_frames: bool,
    id_base: u64,
    deck: PcDeck,
    locs: HashMap<usize, LocInfo, SetHasher>,
    funcs: HashMap<Box<str>, u64, SetHasher>,
    mem: Vec<MemMap>,
    lines: Vec<LineInfo>,
    new_funcs: Vec<NewFunc>,
}

impl StackInterner {
    pub fn new(
        symbolizer: Arc<dyn Symbolizer>,
        generics_frames: bool,
        id_base: u64,
        mem: Vec<MemMap>,
    ) -> Self {
        Self {
            symbolizer,
            generics_frames,
            id_base,
            deck: PcDeck::default(),
            locs: HashMap::default(),
            funcs: HashMap::default(),
            mem,
            lines: Vec::new(),
            new_funcs: Vec::new(),
        }
    }

    pub fn symbolizer(&self) -> &dyn Symbolizer {
        &*self.symbolizer
    }

    /// Mappings with the symbolization flags collected so far.
    pub fn mappings(&self) -> &[MemMap] {
        &self.mem
    }

    pub fn into_mappings(self) -> Vec<MemMap> {
        self.mem
    }

    pub fn location_count(&self) -> usize {
        self.locs.len()
    }

    pub fn function_count(&self) -> usize {
        self.funcs.len()
    }

    /// Appends the location ids of `stack` to `locs`.
    pub fn append_locs_for_stack(
        &mut self,
        locs: &mut Vec<u64>,
        stack: &[usize],
        sink: &mut dyn LocationSink,
    ) -> Result<(), ProfileError> {
        self.deck.reset();

        // The last address may be truncated. Recover its inlined callers.
        let symbolizer = Arc::clone(&self.symbolizer);
        let expanded = symbolizer.expand_final_inline_frame(stack);
        let mut stk: &[usize] = &expanded;

        while let Some(&addr) = stk.first() {
            if let Some(l) = self.locs.get(&addr) {
                // A cached location may really be a fake pc in the middle of
                // the inlined chain being collected. Try the deck first.
                if !self.deck.is_empty()
                    && self
                        .deck
                        .try_add(addr, &l.first_pc_frames, l.first_pc_flag)
                {
                    stk = &stk[1..];
                    continue;
                }
                let (id, n) = (l.id, l.pcs.len());
                if let Some(emitted) = self.emit_location(sink)? {
                    locs.push(emitted);
                }
                locs.push(id);
                stk = stk.get(n..).unwrap_or(&[]);
                continue;
            }

            let (frames, flag) = all_frames(&*symbolizer, addr);
            if frames.is_empty() {
                // Thread exit.
                if let Some(emitted) = self.emit_location(sink)? {
                    locs.push(emitted);
                }
                stk = &stk[1..];
                continue;
            }

            if self.deck.try_add(addr, &frames, flag) {
                stk = &stk[1..];
                continue;
            }
            // Not part of the deck's chain. Flush it and start over with addr.
            if let Some(emitted) = self.emit_location(sink)? {
                locs.push(emitted);
            }
            if let Some(l) = self.locs.get(&addr) {
                locs.push(l.id);
                stk = stk.get(l.pcs.len()..).unwrap_or(&[]);
            } else {
                self.deck.try_add(addr, &frames, flag);
                stk = &stk[1..];
            }
        }
        if let Some(emitted) = self.emit_location(sink)? {
            locs.push(emitted);
        }
        Ok(())
    }

    /// Writes the deck out as a new location, with any functions it
    /// introduces, and resets it.
    fn emit_location(&mut self, sink: &mut dyn LocationSink) -> Result<Option<u64>, ProfileError> {
        let (Some(&addr), Some(first_frame)) = (self.deck.pcs.first(), self.deck.frames.first())
        else {
            return Ok(None);
        };
        let address = first_frame.pc as u64;

        let id = self.locs.len() as u64 + self.id_base;
        self.locs.try_reserve(1)?;
        self.locs.insert(
            addr,
            LocInfo {
                id,
                pcs: self.deck.pcs.clone(),
                first_pc_frames: self.deck.frames[..self.deck.first_pc_frames].to_vec(),
                first_pc_flag: self.deck.first_pc_flag,
            },
        );

        self.lines.clear();
        self.new_funcs.clear();
        for frame in &self.deck.frames {
            let function_id = match self.funcs.get(frame.symbol_name.as_str()) {
                Some(&function_id) => function_id,
                None => {
                    let function_id = self.funcs.len() as u64 + self.id_base;
                    self.funcs.try_reserve(1)?;
                    self.funcs
                        .insert(Box::from(frame.symbol_name.as_str()), function_id);
                    let name = if self.generics_frames {
                        &frame.symbol_name
                    } else {
                        &frame.function
                    };
                    self.new_funcs.push(NewFunc {
                        id: function_id,
                        name: name.clone(),
                        file: frame.file.clone(),
                        start_line: frame.start_line,
                    });
                    function_id
                }
            };
            self.lines.push(LineInfo {
                function_id,
                line: frame.line,
            });
        }

        let mut mapping_id = 0;
        for (i, m) in self.mem.iter_mut().enumerate() {
            if m.contains(addr) || m.fake {
                mapping_id = i as u64 + self.id_base;
                m.funcs |= self.deck.flag;
                break;
            }
        }

        sink.location(id, mapping_id, address, &self.lines)?;
        for f in &self.new_funcs {
            sink.function(f.id, &f.name, &f.file, f.start_line)?;
        }
        self.deck.reset();
        Ok(Some(id))
    }
}
