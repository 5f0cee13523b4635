// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::mapping::SymbolizeFlag;
use crate::runtime::{Frame, Symbolizer};

/// Expands one return address into its frames, leaf first, and reports how
/// well it symbolized.
///
/// Returns no frames for the thread exit marker, so it never becomes a
/// location. An unresolvable address still gets one frame with a made up
/// call pc so it can be located.
pub fn all_frames(symbolizer: &dyn Symbolizer, addr: usize) -> (Vec<Frame>, SymbolizeFlag) {
    let mut frames = symbolizer.frames(addr);
    let Some(first) = frames.first_mut() else {
        let frame = Frame {
            pc: addr.wrapping_sub(1),
            ..Frame::default()
        };
        return (vec![frame], SymbolizeFlag::LOOKUP_TRIED | SymbolizeFlag::LOOKUP_FAILED);
    };
    if symbolizer.is_thread_exit(first) {
        return (Vec::new(), SymbolizeFlag::NONE);
    }

    let mut flag = SymbolizeFlag::LOOKUP_TRIED;
    if first.pc == 0 || first.function.is_empty() || first.file.is_empty() || first.line == 0 {
        flag |= SymbolizeFlag::LOOKUP_FAILED;
    }
    if first.pc == 0 {
        first.pc = addr.wrapping_sub(1);
    }

    if let Some(exit) = frames
        .iter()
        .skip(1)
        .position(|frame| symbolizer.is_thread_exit(frame))
    {
        // Keep the marker itself, as the runtime does, but nothing past it.
        frames.truncate(exit + 2);
    }
    (frames, flag)
}
