use anyhow::{Context, Result};
use byteorder::{WriteBytesExt, LE};
use std::io::{self, Read, Write};

use crate::header::Class;

pub const DT_NULL: i64 = 0;
pub const DT_NEEDED: i64 = 1;
pub const DT_PLTRELSZ: i64 = 2;
pub const DT_PLTGOT: i64 = 3;
pub const DT_HASH: i64 = 4;
pub const DT_STRTAB: i64 = 5;
pub const DT_SYMTAB: i64 = 6;
pub const DT_RELA: i64 = 7;
pub const DT_RELASZ: i64 = 8;
pub const DT_RELAENT: i64 = 9;
pub const DT_STRSZ: i64 = 10;
pub const DT_SYMENT: i64 = 11;
pub const DT_INIT: i64 = 12;
pub const DT_FINI: i64 = 13;
pub const DT_SONAME: i64 = 14;
pub const DT_RPATH: i64 = 15;
pub const DT_SYMBOLIC: i64 = 16;
pub const DT_REL: i64 = 17;
pub const DT_RELSZ: i64 = 18;
pub const DT_RELENT: i64 = 19;
pub const DT_PLTREL: i64 = 20;
pub const DT_DEBUG: i64 = 21;
pub const DT_TEXTREL: i64 = 22;
pub const DT_JMPREL: i64 = 23;
pub const DT_BIND_NOW: i64 = 24;
pub const DT_INIT_ARRAY: i64 = 25;
pub const DT_FINI_ARRAY: i64 = 26;
pub const DT_INIT_ARRAYSZ: i64 = 27;
pub const DT_FINI_ARRAYSZ: i64 = 28;
pub const DT_RUNPATH: i64 = 29;
pub const DT_FLAGS: i64 = 30;
pub const DT_GNU_HASH: i64 = 0x6ffffef5;
pub const DT_VERSYM: i64 = 0x6ffffff0;
pub const DT_RELACOUNT: i64 = 0x6ffffff9;
pub const DT_RELCOUNT: i64 = 0x6ffffffa;
pub const DT_FLAGS_1: i64 = 0x6ffffffb;
pub const DT_VERDEF: i64 = 0x6ffffffc;
pub const DT_VERDEFNUM: i64 = 0x6ffffffd;
pub const DT_VERNEED: i64 = 0x6ffffffe;
pub const DT_VERNEEDNUM: i64 = 0x6fffffff;

/// Human-readable name of a dynamic tag, for trace output.
pub fn tag_name(d_tag: i64) -> &'static str {
    match d_tag {
        DT_NULL => "DT_NULL",
        DT_NEEDED => "DT_NEEDED",
        DT_PLTRELSZ => "DT_PLTRELSZ",
        DT_PLTGOT => "DT_PLTGOT",
        DT_HASH => "DT_HASH",
        DT_STRTAB => "DT_STRTAB",
        DT_SYMTAB => "DT_SYMTAB",
        DT_RELA => "DT_RELA",
        DT_RELASZ => "DT_RELASZ",
        DT_RELAENT => "DT_RELAENT",
        DT_STRSZ => "DT_STRSZ",
        DT_SYMENT => "DT_SYMENT",
        DT_INIT => "DT_INIT",
        DT_FINI => "DT_FINI",
        DT_SONAME => "DT_SONAME",
        DT_RPATH => "DT_RPATH",
        DT_SYMBOLIC => "DT_SYMBOLIC",
        DT_REL => "DT_REL",
        DT_RELSZ => "DT_RELSZ",
        DT_RELENT => "DT_RELENT",
        DT_PLTREL => "DT_PLTREL",
        DT_DEBUG => "DT_DEBUG",
        DT_TEXTREL => "DT_TEXTREL",
        DT_JMPREL => "DT_JMPREL",
        DT_BIND_NOW => "DT_BIND_NOW",
        DT_INIT_ARRAY => "DT_INIT_ARRAY",
        DT_FINI_ARRAY => "DT_FINI_ARRAY",
        DT_INIT_ARRAYSZ => "DT_INIT_ARRAYSZ",
        DT_FINI_ARRAYSZ => "DT_FINI_ARRAYSZ",
        DT_RUNPATH => "DT_RUNPATH",
        DT_FLAGS => "DT_FLAGS",
        DT_GNU_HASH => "DT_GNU_HASH",
        DT_VERSYM => "DT_VERSYM",
        DT_RELACOUNT => "DT_RELACOUNT",
        DT_RELCOUNT => "DT_RELCOUNT",
        DT_FLAGS_1 => "DT_FLAGS_1",
        DT_VERDEF => "DT_VERDEF",
        DT_VERDEFNUM => "DT_VERDEFNUM",
        DT_VERNEED => "DT_VERNEED",
        DT_VERNEEDNUM => "DT_VERNEEDNUM",
        _ => "<unknown dynamic section tag>",
    }
}

/// One entry of the dynamic section: a signed tag plus the value/address
/// union, collapsed to `u64` since both arms are the same size on disk.
///
/// On disk an entry is 8 bytes in a 32-bit file and 16 in a 64-bit file;
/// 32-bit tags are sign-extended on decode and truncated back on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynEntry {
    pub d_tag: i64,
    pub d_un: u64,
}

impl DynEntry {
    /// The zero entry a stripped slot is overwritten with.
    pub const NULL: DynEntry = DynEntry {
        d_tag: DT_NULL,
        d_un: 0,
    };

    /// On-disk size of one entry at the given width.
    pub fn entry_size(class: Class) -> u64 {
        2 * class.word_size()
    }

    pub fn from_reader<R: Read>(r: &mut R, class: Class) -> io::Result<DynEntry> {
        Ok(DynEntry {
            d_tag: class.read_sword(r)?,
            d_un: class.read_word(r)?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W, class: Class) -> io::Result<()> {
        match class {
            Class::Elf32 => {
                w.write_i32::<LE>(self.d_tag as i32)?;
                w.write_u32::<LE>(self.d_un as u32)?;
            }
            Class::Elf64 => {
                w.write_i64::<LE>(self.d_tag)?;
                w.write_u64::<LE>(self.d_un)?;
            }
        }
        Ok(())
    }

    /// True for the tags that bind the binary to symbol-version
    /// definitions: `DT_VERSYM`, `DT_VERNEED`, `DT_VERNEEDNUM`.
    pub fn is_version_entry(&self) -> bool {
        matches!(self.d_tag, DT_VERSYM | DT_VERNEED | DT_VERNEEDNUM)
    }
}

/// Reads the dynamic entry sequence up to and including the `DT_NULL`
/// terminator. A short read anywhere is an error; no partial entry is
/// accepted.
pub fn read_dynamic_entries<R: Read>(r: &mut R, class: Class) -> Result<Vec<DynEntry>> {
    let mut entries = Vec::new();
    loop {
        let entry = DynEntry::from_reader(r, class).with_context(|| {
            format!(
                "ran out of bytes while reading dynamic section entry {}",
                entries.len()
            )
        })?;
        log::debug!("dynamic entry {}: tag = {}", entries.len(), tag_name(entry.d_tag));
        let done = entry.d_tag == DT_NULL;
        entries.push(entry);
        if done {
            return Ok(entries);
        }
    }
}

/// Zeroes every version entry in place and returns how many were hit.
///
/// Entries are never removed: a stripped slot becomes the zero entry at
/// the same position, so the sequence length and the byte offset of every
/// other entry are unchanged. The runtime linker treats a `DT_NULL` slot
/// before the terminator as empty and keeps scanning.
pub fn strip_version_entries(entries: &mut [DynEntry]) -> usize {
    let mut stripped = 0;
    for entry in entries.iter_mut() {
        if entry.is_version_entry() {
            *entry = DynEntry::NULL;
            stripped += 1;
        }
    }
    stripped
}
