// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::mapping::SymbolizeFlag;
use crate::runtime::Frame;

/// Collects consecutive return addresses that belong to one physical call
/// site.
///
/// When a function is inlined, the compiler leaves a placeholder
/// instruction in the caller for each layer of inlining, and tracebacks
/// report those as separate "fake" return addresses:
///
/// ```text
/// main.go:9   0x4553ec  NOP               // fn main()    { b(v) }
/// main.go:6   0x4553ed  NOP               // fn b(v)      { a(v) }
/// main.go:5   0x4553ee  MOV $0x2a, (AX)   // fn a(v)      { *v = 42 }
/// ```
///
/// The deck folds such addresses back into a single location with one line
/// per layer, by adding them one at a time from the leaf up. An address is
/// accepted while it lives in the same physical function as the previous
/// one. The deck is reset and reused for every location.
#[derive(Debug, Default)]
pub struct PcDeck {
    pub pcs: Vec<usize>,
    pub frames: Vec<Frame>,
    pub flag: SymbolizeFlag,
    /// Number of frames expanded from the first pc.
    pub first_pc_frames: usize,
    pub first_pc_flag: SymbolizeFlag,
}

impl PcDeck {
    pub fn reset(&mut self) {
        self.pcs.clear();
        self.frames.clear();
        self.flag = SymbolizeFlag::NONE;
        self.first_pc_frames = 0;
        self.first_pc_flag = SymbolizeFlag::NONE;
    }

    pub fn is_empty(&self) -> bool {
        self.pcs.is_empty()
    }

    /// Adds `pc` and its frames if they continue the inlined call chain held
    /// by the deck. An empty deck accepts anything but an empty expansion.
    pub fn try_add(&mut self, pc: usize, frames: &[Frame], flag: SymbolizeFlag) -> bool {
        let Some(new_frame) = frames.first() else {
            return false;
        };
        if let Some(last) = self.frames.last() {
            // A physical frame ends the chain.
            if !last.inlined {
                return false;
            }
            // Unknown entry points, possibly foreign code.
            if last.entry == 0 || new_frame.entry == 0 {
                return false;
            }
            if last.entry != new_frame.entry {
                return false;
            }
            // Inlined functions cannot call themselves, so this is recursion.
            if last.symbol_name == new_frame.symbol_name {
                return false;
            }
        }

        self.pcs.push(pc);
        self.frames.extend_from_slice(frames);
        self.flag |= flag;
        if self.pcs.len() == 1 {
            self.first_pc_frames = self.frames.len();
            self.first_pc_flag = flag;
        }
        true
    }
}
