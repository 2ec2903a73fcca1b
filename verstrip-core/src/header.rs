use anyhow::{bail, Context, Result};
use byteorder::{ReadBytesExt, LE};
use std::io::{self, Read};

/// Size of the ELF identification block, `e_ident`.
pub const EI_NIDENT: usize = 16;

/// First four bytes of every ELF file: `0x7f` followed by `"ELF"`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

// Byte indices into `e_ident`.
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const EI_VERSION: usize = 6;
const EI_OSABI: usize = 7;

const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ELFOSABI_NONE: u8 = 0;

/// Address width of an ELF file, from `e_ident[EI_CLASS]`.
///
/// Every structure past the identification block exists in a 32-bit and a
/// 64-bit layout that differ only in the size of address-typed fields, so
/// the class is threaded through every decode and encode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    /// Address width in bits, for diagnostics.
    pub fn bits(self) -> u32 {
        match self {
            Class::Elf32 => 32,
            Class::Elf64 => 64,
        }
    }

    /// Size in bytes of one address-typed field at this width.
    pub fn word_size(self) -> u64 {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }

    /// Reads one little-endian address-typed field, widened to `u64`.
    pub fn read_word<R: Read>(self, r: &mut R) -> io::Result<u64> {
        match self {
            Class::Elf32 => Ok(u64::from(r.read_u32::<LE>()?)),
            Class::Elf64 => r.read_u64::<LE>(),
        }
    }

    /// Reads one little-endian signed address-typed field, sign-extended
    /// to `i64`. Dynamic-entry tags are the only signed field decoded.
    pub fn read_sword<R: Read>(self, r: &mut R) -> io::Result<i64> {
        match self {
            Class::Elf32 => Ok(i64::from(r.read_i32::<LE>()?)),
            Class::Elf64 => r.read_i64::<LE>(),
        }
    }
}

/// The ELF file header, `Elf32_Ehdr`/`Elf64_Ehdr` folded into one struct.
///
/// Address-sized fields are widened to `u64` so the section scan and the
/// dynamic patch run a single code path for both classes; the decoded
/// [`Class`] records which on-disk layout the file actually uses.
///
/// Reference: [ELF Specification v1.2](https://refspecs.linuxfoundation.org/elf/elf.pdf)
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    /// ELF identification bytes (magic number and other information).
    pub e_ident: [u8; EI_NIDENT],

    /// Address width decoded from `e_ident[EI_CLASS]`.
    pub class: Class,

    /// Object file type (e.g. relocatable, executable, shared, core).
    pub e_type: u16,

    /// Target architecture (e.g. x86_64, ARM).
    pub e_machine: u16,

    /// ELF version (usually set to `EV_CURRENT` = 1).
    pub e_version: u32,

    /// Virtual address of the program entry point.
    pub e_entry: u64,

    /// File offset of the program header table.
    pub e_phoff: u64,

    /// File offset of the section header table.
    pub e_shoff: u64,

    /// Processor-specific flags.
    pub e_flags: u32,

    /// Size of this ELF header (52 bytes for ELF32, 64 for ELF64).
    pub e_ehsize: u16,

    /// Size of one entry in the program header table.
    pub e_phentsize: u16,

    /// Number of entries in the program header table.
    pub e_phnum: u16,

    /// Size of one entry in the section header table.
    ///
    /// May exceed the defined structure size in forward-compatible files;
    /// the scanner skips the surplus bytes of every entry.
    pub e_shentsize: u16,

    /// Number of entries in the section header table.
    pub e_shnum: u16,

    /// Index of the section header string table.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Decodes the header from a stream positioned at the start of the file.
    ///
    /// Two-phase: the fixed 16-byte identification block is read and
    /// validated first, then the width-dependent remainder. Either the
    /// whole header decodes or an error describes the first field that
    /// failed; the stream is left wherever the failing read stopped.
    pub fn from_reader<R: Read>(r: &mut R) -> Result<ElfHeader> {
        let mut e_ident = [0u8; EI_NIDENT];
        r.read_exact(&mut e_ident)
            .context("ran out of bytes while reading e_ident")?;
        let class = validate_ident(&e_ident)?;

        Self::read_after_ident(r, e_ident, class).with_context(|| {
            format!(
                "ran out of bytes while reading the rest of the {}-bit ELF header",
                class.bits()
            )
        })
    }

    fn read_after_ident<R: Read>(
        r: &mut R,
        e_ident: [u8; EI_NIDENT],
        class: Class,
    ) -> io::Result<ElfHeader> {
        Ok(ElfHeader {
            e_ident,
            class,
            e_type: r.read_u16::<LE>()?,
            e_machine: r.read_u16::<LE>()?,
            e_version: r.read_u32::<LE>()?,
            e_entry: class.read_word(r)?,
            e_phoff: class.read_word(r)?,
            e_shoff: class.read_word(r)?,
            e_flags: r.read_u32::<LE>()?,
            e_ehsize: r.read_u16::<LE>()?,
            e_phentsize: r.read_u16::<LE>()?,
            e_phnum: r.read_u16::<LE>()?,
            e_shentsize: r.read_u16::<LE>()?,
            e_shnum: r.read_u16::<LE>()?,
            e_shstrndx: r.read_u16::<LE>()?,
        })
    }
}

/// Validates the identification block and extracts the address width.
///
/// Checked in order: magic, class, data encoding, version, OS/ABI. Only
/// little-endian `EV_CURRENT` files with OS/ABI `NONE` are accepted;
/// anything else fails with a reason naming the offending field.
fn validate_ident(e_ident: &[u8; EI_NIDENT]) -> Result<Class> {
    if e_ident[..4] != ELF_MAGIC {
        bail!("magic bytes mismatch; expected 0x7f ELF");
    }
    let class = match e_ident[EI_CLASS] {
        ELFCLASS32 => Class::Elf32,
        ELFCLASS64 => Class::Elf64,
        other => bail!("EI_CLASS is neither ELFCLASS32 nor ELFCLASS64 (got {other})"),
    };
    if e_ident[EI_DATA] != ELFDATA2LSB {
        bail!("EI_DATA is not ELFDATA2LSB; only little-endian files are supported");
    }
    if e_ident[EI_VERSION] != EV_CURRENT {
        bail!("EI_VERSION is not EV_CURRENT");
    }
    if e_ident[EI_OSABI] != ELFOSABI_NONE {
        bail!("EI_OSABI is not ELFOSABI_NONE");
    }
    Ok(class)
}
