use anyhow::{bail, Context, Result};
use byteorder::{ReadBytesExt, LE};
use std::io::{self, Read, Seek, SeekFrom};

use crate::header::{Class, ElfHeader};

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_HASH: u32 = 5;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOTE: u32 = 7;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_REL: u32 = 9;
pub const SHT_SHLIB: u32 = 10;
pub const SHT_DYNSYM: u32 = 11;
pub const SHT_INIT_ARRAY: u32 = 14;
pub const SHT_FINI_ARRAY: u32 = 15;
pub const SHT_GNU_HASH: u32 = 0x6ffffff6;
pub const SHT_GNU_VERNEED: u32 = 0x6ffffffe;
pub const SHT_GNU_VERSYM: u32 = 0x6fffffff;
pub const SHT_LOPROC: u32 = 0x70000000;
pub const SHT_HIPROC: u32 = 0x7fffffff;
pub const SHT_LOUSER: u32 = 0x80000000;
pub const SHT_HIUSER: u32 = 0xffffffff;

/// Human-readable name of a section type, for trace output.
pub fn section_type_name(sh_type: u32) -> &'static str {
    match sh_type {
        SHT_NULL => "SHT_NULL",
        SHT_PROGBITS => "SHT_PROGBITS",
        SHT_SYMTAB => "SHT_SYMTAB",
        SHT_STRTAB => "SHT_STRTAB",
        SHT_RELA => "SHT_RELA",
        SHT_HASH => "SHT_HASH",
        SHT_DYNAMIC => "SHT_DYNAMIC",
        SHT_NOTE => "SHT_NOTE",
        SHT_NOBITS => "SHT_NOBITS",
        SHT_REL => "SHT_REL",
        SHT_SHLIB => "SHT_SHLIB",
        SHT_DYNSYM => "SHT_DYNSYM",
        SHT_INIT_ARRAY => "SHT_INIT_ARRAY",
        SHT_FINI_ARRAY => "SHT_FINI_ARRAY",
        SHT_GNU_HASH => "SHT_GNU_HASH",
        SHT_GNU_VERNEED => "SHT_GNU_VERNEED",
        SHT_GNU_VERSYM => "SHT_GNU_VERSYM",
        _ => "<unknown section header type>",
    }
}

/// One entry of the section header table, `Elf32_Shdr`/`Elf64_Shdr` with
/// address-sized fields widened to `u64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    /// Virtual address of the section when loaded.
    pub sh_addr: u64,
    /// File offset of the section's bytes.
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl SectionHeader {
    /// On-disk size of the structurally defined fields: 40 bytes for
    /// 32-bit files, 64 for 64-bit. `e_shentsize` may declare more;
    /// it must never declare less.
    pub fn prefix_size(class: Class) -> u64 {
        // sh_name + sh_type + sh_link + sh_info are 4 bytes at either
        // width; the remaining six fields are address-sized.
        16 + 6 * class.word_size()
    }

    pub fn from_reader<R: Read>(r: &mut R, class: Class) -> io::Result<SectionHeader> {
        Ok(SectionHeader {
            sh_name: r.read_u32::<LE>()?,
            sh_type: r.read_u32::<LE>()?,
            sh_flags: class.read_word(r)?,
            sh_addr: class.read_word(r)?,
            sh_offset: class.read_word(r)?,
            sh_size: class.read_word(r)?,
            sh_link: r.read_u32::<LE>()?,
            sh_info: r.read_u32::<LE>()?,
            sh_addralign: class.read_word(r)?,
            sh_entsize: class.read_word(r)?,
        })
    }
}

/// Walks the section header table and returns the first `SHT_DYNAMIC`
/// entry.
///
/// Entries are read at the stride the header declares: the structural
/// prefix is decoded, then `e_shentsize - prefix` trailing bytes are
/// skipped with a relative seek so forward-compatible files with oversized
/// entries still scan correctly. A stride smaller than the prefix cannot
/// hold the required fields and is rejected up front.
///
/// Standard files carry at most one dynamic section, so any later match is
/// ignored.
pub fn find_dynamic_section<S: Read + Seek>(
    stream: &mut S,
    header: &ElfHeader,
) -> Result<SectionHeader> {
    stream
        .seek(SeekFrom::Start(header.e_shoff))
        .with_context(|| {
            format!(
                "failed to seek to offset {}; this is e_shoff in the ELF header",
                header.e_shoff
            )
        })?;

    let stride = u64::from(header.e_shentsize);
    let prefix = SectionHeader::prefix_size(header.class);
    if stride < prefix {
        bail!("e_shentsize is {stride} but a section header needs at least {prefix} bytes");
    }
    let surplus = stride - prefix;

    for index in 0..header.e_shnum {
        let shdr = SectionHeader::from_reader(stream, header.class)
            .with_context(|| format!("ran out of bytes while reading section header {index}"))?;
        if surplus > 0 {
            stream
                .seek(SeekFrom::Current(surplus as i64))
                .with_context(|| {
                    format!("ran out of bytes while skipping to the end of section header {index}")
                })?;
        }
        log::debug!(
            "section {index}: type = {}, offset = {:#x}, size = {:#x}",
            section_type_name(shdr.sh_type),
            shdr.sh_offset,
            shdr.sh_size
        );
        if shdr.sh_type == SHT_DYNAMIC {
            return Ok(shdr);
        }
    }
    bail!("no dynamic section found");
}
