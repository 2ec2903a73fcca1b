use std::io::Cursor;

use byteorder::{WriteBytesExt, LE};
use verstrip_core::{
    patch_file, strip_version_info, Class, DynEntry, StripReport, DT_NEEDED, DT_NULL, DT_STRTAB,
    DT_VERNEED, DT_VERNEEDNUM, DT_VERSYM, SHT_DYNAMIC, SHT_PROGBITS, SHT_STRTAB,
};

/// One section of a synthesized ELF image: its type, its payload bytes,
/// and the `sh_entsize` its header advertises.
struct SectionSpec {
    sh_type: u32,
    data: Vec<u8>,
    sh_entsize: u64,
}

fn word(buf: &mut Vec<u8>, class: Class, value: u64) {
    match class {
        Class::Elf32 => buf.write_u32::<LE>(value as u32).unwrap(),
        Class::Elf64 => buf.write_u64::<LE>(value).unwrap(),
    }
}

/// Builds a minimal ELF image: header, then the section header table, then
/// the section payloads in order. `pad` widens every section header entry
/// past its structural size, the way forward-compatible producers do.
fn build_elf(class: Class, pad: u16, sections: &[SectionSpec]) -> Vec<u8> {
    let (class_byte, machine, ehsize, prefix) = match class {
        Class::Elf32 => (1u8, 3u16, 52u16, 40u16),
        Class::Elf64 => (2u8, 62u16, 64u16, 64u16),
    };
    let stride = prefix + pad;
    let shoff = u64::from(ehsize);
    let mut payload_off = shoff + u64::from(stride) * sections.len() as u64;

    let mut buf = vec![0x7f, b'E', b'L', b'F', class_byte, 1, 1, 0];
    buf.resize(16, 0);
    buf.write_u16::<LE>(2).unwrap(); // e_type = ET_EXEC
    buf.write_u16::<LE>(machine).unwrap();
    buf.write_u32::<LE>(1).unwrap(); // e_version
    word(&mut buf, class, 0x1000); // e_entry
    word(&mut buf, class, 0); // e_phoff
    word(&mut buf, class, shoff);
    buf.write_u32::<LE>(0).unwrap(); // e_flags
    buf.write_u16::<LE>(ehsize).unwrap();
    buf.write_u16::<LE>(0).unwrap(); // e_phentsize
    buf.write_u16::<LE>(0).unwrap(); // e_phnum
    buf.write_u16::<LE>(stride).unwrap();
    buf.write_u16::<LE>(sections.len() as u16).unwrap();
    buf.write_u16::<LE>(0).unwrap(); // e_shstrndx
    assert_eq!(buf.len() as u64, shoff);

    for spec in sections {
        buf.write_u32::<LE>(0).unwrap(); // sh_name
        buf.write_u32::<LE>(spec.sh_type).unwrap();
        word(&mut buf, class, 0); // sh_flags
        word(&mut buf, class, 0); // sh_addr
        word(&mut buf, class, payload_off);
        word(&mut buf, class, spec.data.len() as u64);
        buf.write_u32::<LE>(0).unwrap(); // sh_link
        buf.write_u32::<LE>(0).unwrap(); // sh_info
        word(&mut buf, class, 0); // sh_addralign
        word(&mut buf, class, spec.sh_entsize);
        buf.extend(std::iter::repeat(0u8).take(pad as usize));
        payload_off += spec.data.len() as u64;
    }
    for spec in sections {
        buf.extend_from_slice(&spec.data);
    }
    buf
}

fn dynamic_section(entries: &[(i64, u64)], class: Class) -> SectionSpec {
    let mut data = Vec::new();
    for &(d_tag, d_un) in entries {
        DynEntry { d_tag, d_un }.write_to(&mut data, class).unwrap();
    }
    SectionSpec {
        sh_type: SHT_DYNAMIC,
        data,
        sh_entsize: DynEntry::entry_size(class),
    }
}

fn progbits(len: usize) -> SectionSpec {
    SectionSpec {
        sh_type: SHT_PROGBITS,
        data: vec![0xaa; len],
        sh_entsize: 0,
    }
}

fn strtab(data: &[u8]) -> SectionSpec {
    SectionSpec {
        sh_type: SHT_STRTAB,
        data: data.to_vec(),
        sh_entsize: 0,
    }
}

fn patch(bytes: Vec<u8>) -> (anyhow::Result<StripReport>, Vec<u8>) {
    let mut cursor = Cursor::new(bytes);
    let result = strip_version_info(&mut cursor);
    (result, cursor.into_inner())
}

#[test]
fn strips_version_entries_from_a_64_bit_file() {
    let before = [
        (DT_NEEDED, 1),
        (DT_VERNEED, 0x600),
        (DT_VERNEEDNUM, 2),
        (DT_VERSYM, 0x500),
        (DT_STRTAB, 0x400),
        (DT_NULL, 0),
    ];
    let after = [
        (DT_NEEDED, 1),
        (DT_NULL, 0),
        (DT_NULL, 0),
        (DT_NULL, 0),
        (DT_STRTAB, 0x400),
        (DT_NULL, 0),
    ];
    let sections = |entries: &[(i64, u64)]| {
        vec![
            progbits(0x30),
            dynamic_section(entries, Class::Elf64),
            strtab(b"\0libm.so.6\0"),
        ]
    };
    let input = build_elf(Class::Elf64, 0, &sections(&before));
    let expected = build_elf(Class::Elf64, 0, &sections(&after));

    let (result, output) = patch(input.clone());
    let report = result.unwrap();
    assert_eq!(report.class, Class::Elf64);
    assert_eq!(report.entries, 6);
    assert_eq!(report.stripped, 3);
    assert_eq!(output.len(), input.len());
    assert_eq!(output, expected);
}

#[test]
fn a_file_without_version_entries_is_left_byte_identical() {
    let input = build_elf(
        Class::Elf64,
        0,
        &[
            progbits(0x10),
            dynamic_section(&[(DT_NEEDED, 1), (DT_STRTAB, 0x400), (DT_NULL, 0)], Class::Elf64),
        ],
    );
    let (result, output) = patch(input.clone());
    let report = result.unwrap();
    assert!(report.was_noop());
    assert_eq!(output, input);
}

#[test]
fn patching_twice_is_patching_once() {
    let input = build_elf(
        Class::Elf64,
        0,
        &[dynamic_section(
            &[(DT_VERSYM, 0x500), (DT_NEEDED, 1), (DT_NULL, 0)],
            Class::Elf64,
        )],
    );
    let (first, once) = patch(input);
    assert_eq!(first.unwrap().stripped, 1);
    let (second, twice) = patch(once.clone());
    assert!(second.unwrap().was_noop());
    assert_eq!(twice, once);
}

#[test]
fn strips_a_32_bit_file_with_oversized_section_headers() {
    let before = [(DT_VERNEED, 0x600), (DT_NEEDED, 3), (DT_NULL, 0)];
    let after = [(DT_NULL, 0), (DT_NEEDED, 3), (DT_NULL, 0)];
    let input = build_elf(
        Class::Elf32,
        24,
        &[progbits(0x20), dynamic_section(&before, Class::Elf32)],
    );
    let expected = build_elf(
        Class::Elf32,
        24,
        &[progbits(0x20), dynamic_section(&after, Class::Elf32)],
    );

    let (result, output) = patch(input.clone());
    let report = result.unwrap();
    assert_eq!(report.class, Class::Elf32);
    assert_eq!(report.stripped, 1);
    assert_eq!(output.len(), input.len());
    assert_eq!(output, expected);
}

#[test]
fn only_the_first_dynamic_section_is_patched() {
    let first = [(DT_VERSYM, 0x500), (DT_NULL, 0)];
    let second = [(DT_VERNEED, 0x600), (DT_NULL, 0)];
    let input = build_elf(
        Class::Elf64,
        0,
        &[
            dynamic_section(&first, Class::Elf64),
            dynamic_section(&second, Class::Elf64),
        ],
    );
    let expected = build_elf(
        Class::Elf64,
        0,
        &[
            dynamic_section(&[(DT_NULL, 0), (DT_NULL, 0)], Class::Elf64),
            dynamic_section(&second, Class::Elf64),
        ],
    );
    let (result, output) = patch(input);
    assert_eq!(result.unwrap().stripped, 1);
    assert_eq!(output, expected);
}

#[test]
fn an_unterminated_dynamic_section_is_fatal() {
    // The dynamic payload is last in the file and never reaches DT_NULL.
    let input = build_elf(
        Class::Elf64,
        0,
        &[
            progbits(0x10),
            dynamic_section(&[(DT_NEEDED, 1), (DT_VERSYM, 0x500)], Class::Elf64),
        ],
    );
    let (result, output) = patch(input.clone());
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("could not read the dynamic section"));
    assert_eq!(output, input);
}

#[test]
fn an_e_shoff_past_the_end_of_file_is_fatal() {
    let mut input = build_elf(
        Class::Elf64,
        0,
        &[dynamic_section(&[(DT_NULL, 0)], Class::Elf64)],
    );
    let far = input.len() as u64 + 0x1000;
    input[40..48].copy_from_slice(&far.to_le_bytes()); // e_shoff
    let (result, output) = patch(input.clone());
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("could not locate the dynamic section"));
    assert_eq!(output, input);
}

#[test]
fn a_truncated_identification_block_is_fatal() {
    let input = vec![0x7f, b'E', b'L', b'F', 2, 1];
    let (result, output) = patch(input.clone());
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("could not parse the ELF header"));
    assert_eq!(output, input);
}

#[test]
fn patches_a_real_file_in_place() {
    let dir = std::env::temp_dir().join("verstrip_tests");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("strip_{}.elf", std::process::id()));

    let before = [(DT_NEEDED, 1), (DT_VERNEEDNUM, 2), (DT_NULL, 0)];
    let after = [(DT_NEEDED, 1), (DT_NULL, 0), (DT_NULL, 0)];
    let input = build_elf(Class::Elf64, 0, &[dynamic_section(&before, Class::Elf64)]);
    let expected = build_elf(Class::Elf64, 0, &[dynamic_section(&after, Class::Elf64)]);
    std::fs::write(&path, &input).unwrap();

    let report = patch_file(&path).unwrap();
    assert_eq!(report.stripped, 1);
    let written = std::fs::read(&path).unwrap();
    assert_eq!(written.len(), input.len());
    assert_eq!(written, expected);

    // A second in-place run finds only the already-zeroed slots.
    let report = patch_file(&path).unwrap();
    assert!(report.was_noop());
    assert_eq!(std::fs::read(&path).unwrap(), expected);

    std::fs::remove_file(&path).unwrap();
}
