// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Executable memory mappings of the profiled process.

use crate::runtime::MappingSource;
use anyhow::Context;
use goblin::container::Ctx;
use goblin::elf::note::NT_GNU_BUILD_ID;
use goblin::elf::program_header::{ProgramHeader, PT_NOTE};
use goblin::elf::Elf;
use rustc_hash::FxHashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::{BitOr, BitOrAssign};
use std::path::Path;

/// Records what happened when the locations attributed to a mapping were
/// symbolized.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct SymbolizeFlag(u8);

impl SymbolizeFlag {
    /// No symbol lookup was performed.
    pub const NONE: Self = Self(0);
    /// A symbol lookup was performed.
    pub const LOOKUP_TRIED: Self = Self(1 << 0);
    /// A symbol lookup was performed but failed.
    pub const LOOKUP_FAILED: Self = Self(1 << 1);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SymbolizeFlag {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SymbolizeFlag {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One executable mapping.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemMap {
    /// Address at which the object is loaded.
    pub start: usize,
    /// End of the mapped range, exclusive.
    pub end: usize,
    /// Offset in the file of the first mapped byte.
    pub offset: u64,
    pub file: String,
    pub build_id: String,
    /// Symbolization results of the locations in this mapping, for the
    /// profile being built.
    pub funcs: SymbolizeFlag,
    /// Synthesized because no real mapping could be read. Every location is
    /// attributed to it.
    pub fake: bool,
}

impl MemMap {
    pub fn fake() -> Self {
        Self {
            fake: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.start <= addr && addr < self.end
    }

    /// Every location was symbolized and none failed.
    pub fn has_functions(&self) -> bool {
        self.funcs == SymbolizeFlag::LOOKUP_TRIED
    }
}

const PROC_SELF_MAPS: &str = "/proc/self/maps";

/// Reads the executable mappings of the current process with their build
/// IDs. Falls back to a single fake mapping when none can be read, as profile
/// consumers expect at least one.
pub fn read_mapping() -> Vec<MemMap> {
    let mut mem = read_mapping_table();
    let mut build_ids = BuildIds::default();
    for m in &mut mem {
        m.build_id = build_ids.resolve(&m.file);
    }
    with_fake_fallback(mem)
}

fn read_mapping_table() -> Vec<MemMap> {
    let data = match std::fs::read(PROC_SELF_MAPS) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(%err, path = PROC_SELF_MAPS, "cannot read memory mappings, using a fake mapping");
            Vec::new()
        }
    };
    let mut mem = Vec::new();
    parse_proc_self_maps(&data, |lo, hi, offset, file| {
        mem.push(MemMap {
            start: lo as usize,
            end: hi as usize,
            offset,
            file: file.to_owned(),
            ..MemMap::default()
        });
    });
    mem
}

fn with_fake_fallback(mut mem: Vec<MemMap>) -> Vec<MemMap> {
    if mem.is_empty() {
        mem.push(MemMap::fake());
    }
    mem
}

/// Parses the `/proc/self/maps` format, calling `add` with
/// (start, end, offset, path) for every executable row:
///
/// ```text
/// 00400000-0040b000 r-xp 00000000 fc:01 787766    /bin/cat
/// 7ffc34343000-7ffc34345000 r-xp 00000000 00:00 0 [vdso]
/// ```
pub fn parse_proc_self_maps(data: &[u8], mut add: impl FnMut(u64, u64, u64, &str)) {
    for line in data.split(|&b| b == b'\n') {
        let Ok(line) = std::str::from_utf8(line) else {
            continue;
        };
        let mut rest = line;
        let mut next = || {
            let (field, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            rest = tail.trim_start_matches(' ');
            field
        };

        let Some((lo, hi)) = next().split_once('-') else {
            continue;
        };
        let (Ok(lo), Ok(hi)) = (u64::from_str_radix(lo, 16), u64::from_str_radix(hi, 16)) else {
            continue;
        };
        let perms = next().as_bytes();
        if perms.len() < 4 || perms[2] != b'x' {
            continue;
        }
        let Ok(offset) = u64::from_str_radix(next(), 16) else {
            continue;
        };
        let _dev = next();
        let _inode = next();

        let file = rest.strip_suffix(" (deleted)").unwrap_or(rest);
        if file.is_empty() {
            // No path field. Named inode-0 rows such as [vdso] are kept.
            continue;
        }
        add(lo, hi, offset, file);
    }
}

/// Upper bound for the program header table and for each note segment read
/// while looking for a build ID.
const MAX_ELF_READ: u64 = 64 * 1024;

/// Hex-encoded GNU build ID note of the ELF file at `path`. Only the ELF
/// header, the program headers and the note segments are read.
pub fn elf_build_id(path: &str) -> Option<String> {
    if path.is_empty() || path.starts_with('[') {
        return None;
    }
    match read_build_id(Path::new(path)) {
        Ok(Some(id)) => {
            let mut hex = String::with_capacity(id.len() * 2);
            for byte in id {
                let _ = write!(hex, "{byte:02x}");
            }
            Some(hex)
        }
        Ok(None) => None,
        Err(err) => {
            tracing::debug!(%err, path, "cannot read build id");
            None
        }
    }
}

fn read_build_id(path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 64];
    file.read_exact(&mut header).context("short ELF header")?;
    let header = Elf::parse_header(&header)?;
    let ctx = Ctx::new(header.container()?, header.endianness()?);

    let count = usize::from(header.e_phnum);
    let table_len = u64::from(header.e_phnum) * u64::from(header.e_phentsize);
    anyhow::ensure!(table_len <= MAX_ELF_READ, "program header table too large");
    let table = read_at(&mut file, header.e_phoff, table_len)?;
    let program_headers = ProgramHeader::parse(&table, 0, count, ctx)?;

    for ph in program_headers.iter().filter(|ph| ph.p_type == PT_NOTE) {
        if ph.p_filesz > MAX_ELF_READ {
            continue;
        }
        let notes = read_at(&mut file, ph.p_offset, ph.p_filesz)?;
        if let Some(id) = gnu_build_id(&notes, ph.p_align, ctx.le.is_little()) {
            return Ok(Some(id.to_vec()));
        }
    }
    Ok(None)
}

fn read_at(file: &mut File, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    file.by_ref().take(len).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Finds the descriptor of the `NT_GNU_BUILD_ID` note owned by "GNU" in a
/// note segment.
fn gnu_build_id(mut notes: &[u8], align: u64, little_endian: bool) -> Option<&[u8]> {
    let align = if align == 8 { 8 } else { 4 };
    let word = |at: &[u8]| -> Option<u32> {
        let bytes: [u8; 4] = at.get(..4)?.try_into().ok()?;
        Some(if little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    };
    while notes.len() >= 12 {
        let name_len = word(notes)? as usize;
        let desc_len = word(&notes[4..])? as usize;
        let n_type = word(&notes[8..])?;
        let name_end = 12usize.checked_add(name_len)?;
        let desc_start = name_end.checked_next_multiple_of(align)?;
        let desc_end = desc_start.checked_add(desc_len)?;
        let name = notes.get(12..name_end)?;
        let desc = notes.get(desc_start..desc_end)?;
        if n_type == NT_GNU_BUILD_ID && name == b"GNU\0" {
            return Some(desc);
        }
        notes = notes.get(desc_end.checked_next_multiple_of(align)?..)?;
    }
    None
}

/// Build IDs by file path. Mapped files are not expected to change under a
/// running process.
#[derive(Debug, Default)]
struct BuildIds(FxHashMap<String, String>);

impl BuildIds {
    fn resolve(&mut self, path: &str) -> String {
        if let Some(id) = self.0.get(path) {
            return id.clone();
        }
        let id = elf_build_id(path).unwrap_or_default();
        self.0.insert(path.to_owned(), id.clone());
        id
    }
}

/// Mappings of the current process, read from `/proc/self/maps`. Build IDs
/// are left empty; [`MappingCache`] fills them in.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcSelfMaps;

impl MappingSource for ProcSelfMaps {
    fn read_mappings(&self) -> Vec<MemMap> {
        read_mapping_table()
    }
}

/// A fixed mapping table.
#[derive(Clone, Debug, Default)]
pub struct StaticMappings(pub Vec<MemMap>);

impl MappingSource for StaticMappings {
    fn read_mappings(&self) -> Vec<MemMap> {
        self.0.clone()
    }
}

/// Decides when mappings are re-read. In lazy mode the first read is kept
/// for the life of the profiler. Symbolization flags always start fresh for
/// each profile.
///
/// Missing build IDs are read from the mapped files, once per path.
#[derive(Debug, Default)]
pub struct MappingCache {
    lazy: bool,
    cached: Option<Vec<MemMap>>,
    build_ids: BuildIds,
}

impl MappingCache {
    pub fn new(lazy: bool) -> Self {
        Self {
            lazy,
            ..Self::default()
        }
    }

    pub fn mappings(&mut self, source: &dyn MappingSource) -> Vec<MemMap> {
        let mem = match &self.cached {
            Some(mem) if self.lazy => mem.clone(),
            _ => {
                let mut mem = with_fake_fallback(source.read_mappings());
                for m in mem.iter_mut().filter(|m| m.build_id.is_empty()) {
                    m.build_id = self.build_ids.resolve(&m.file);
                }
                if self.lazy {
                    self.cached = Some(mem.clone());
                }
                mem
            }
        };
        mem.into_iter()
            .map(|m| MemMap {
                funcs: SymbolizeFlag::NONE,
                ..m
            })
            .collect()
    }
}
