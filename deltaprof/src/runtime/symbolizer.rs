// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{collapse_type_parameters, Frame, Symbolizer};
use crate::SetHasher;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::c_void;

/// A table-driven symbolizer, for replaying records symbolized elsewhere.
#[derive(Clone, Debug, Default)]
pub struct StaticSymbolizer {
    frames: HashMap<usize, Vec<Frame>, SetHasher>,
    final_inline_callers: HashMap<usize, Vec<usize>, SetHasher>,
    runtime_prefix: Cow<'static, str>,
    thread_exit: Cow<'static, str>,
}

impl StaticSymbolizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbols starting with `prefix` are runtime internals.
    pub fn with_runtime_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.runtime_prefix = prefix.into();
        self
    }

    /// Frames of the function named `name` mark the end of a thread's stack.
    pub fn with_thread_exit(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.thread_exit = name.into();
        self
    }

    /// Registers the full frame chain of `addr`, leaf first.
    pub fn insert(&mut self, addr: usize, frames: Vec<Frame>) {
        self.frames.insert(addr, frames);
    }

    /// Registers `addr` as a call site in a function that was not inlined.
    pub fn insert_function(&mut self, addr: usize, symbol_name: &str, file: &str, line: i64) {
        let frame = Frame {
            pc: addr.wrapping_sub(1),
            function: collapse_type_parameters(symbol_name).into_owned(),
            symbol_name: symbol_name.to_owned(),
            file: file.to_owned(),
            line,
            start_line: line,
            entry: addr,
            inlined: false,
        };
        self.frames.insert(addr, vec![frame]);
    }

    /// When a truncated stack ends with `addr`, `callers` are the addresses
    /// of its inlined callers that the truncation cut off.
    pub fn insert_final_inline_callers(&mut self, addr: usize, callers: Vec<usize>) {
        self.final_inline_callers.insert(addr, callers);
    }
}

impl Symbolizer for StaticSymbolizer {
    fn frames(&self, addr: usize) -> Vec<Frame> {
        self.frames.get(&addr).cloned().unwrap_or_default()
    }

    fn expand_final_inline_frame<'a>(&self, stack: &'a [usize]) -> Cow<'a, [usize]> {
        let Some(callers) = stack
            .last()
            .and_then(|last| self.final_inline_callers.get(last))
        else {
            return Cow::Borrowed(stack);
        };
        let mut expanded = Vec::with_capacity(stack.len() + callers.len());
        expanded.extend_from_slice(stack);
        expanded.extend_from_slice(callers);
        Cow::Owned(expanded)
    }

    fn is_runtime_function(&self, name: &str) -> bool {
        !self.runtime_prefix.is_empty() && name.starts_with(&*self.runtime_prefix)
    }

    fn is_thread_exit(&self, frame: &Frame) -> bool {
        !self.thread_exit.is_empty() && frame.symbol_name == self.thread_exit
    }
}

/// Resolves addresses of the current process with the `backtrace` crate.
#[derive(Clone, Debug)]
pub struct BacktraceSymbolizer {
    runtime_prefixes: Vec<Cow<'static, str>>,
}

impl Default for BacktraceSymbolizer {
    fn default() -> Self {
        Self {
            runtime_prefixes: vec![
                Cow::Borrowed("alloc::"),
                Cow::Borrowed("core::"),
                Cow::Borrowed("std::"),
                Cow::Borrowed("__rust"),
                Cow::Borrowed("backtrace::"),
            ],
        }
    }
}

impl BacktraceSymbolizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the symbol prefixes treated as runtime internals.
    pub fn with_runtime_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.runtime_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }
}

impl Symbolizer for BacktraceSymbolizer {
    fn frames(&self, addr: usize) -> Vec<Frame> {
        // Return addresses point after the call; look up the call itself.
        let pc = addr.wrapping_sub(1);
        let mut frames = Vec::new();
        backtrace::resolve(pc as *mut c_void, |symbol| {
            let symbol_name = symbol
                .name()
                .map(|name| format!("{name:#}"))
                .unwrap_or_default();
            let line = symbol.lineno().map_or(0, i64::from);
            frames.push(Frame {
                pc,
                function: collapse_type_parameters(&symbol_name).into_owned(),
                symbol_name,
                file: symbol
                    .filename()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default(),
                line,
                start_line: 0,
                entry: symbol.addr().map_or(0, |entry| entry as usize),
                inlined: true,
            });
        });
        // Inlined symbols come first; the last one is the physical function
        // and owns the entry point.
        let entry = match frames.last_mut() {
            Some(physical) => {
                physical.inlined = false;
                physical.entry
            }
            None => return frames,
        };
        for frame in &mut frames {
            frame.entry = entry;
        }
        frames
    }

    fn is_runtime_function(&self, name: &str) -> bool {
        self.runtime_prefixes
            .iter()
            .any(|prefix| name.starts_with(&**prefix))
    }

    fn is_thread_exit(&self, _frame: &Frame) -> bool {
        false
    }
}
