use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::SeekFrom;
use std::path::Path;

use crate::dynamic::{read_dynamic_entries, strip_version_entries};
use crate::header::{Class, ElfHeader};
use crate::sections::find_dynamic_section;
use crate::stream::Stream;

/// What one patch pass did.
#[derive(Debug, Clone, Copy)]
pub struct StripReport {
    /// Address width of the patched file.
    pub class: Class,
    /// Dynamic entries read, terminator included.
    pub entries: usize,
    /// Entries zeroed. Zero means the file was left untouched.
    pub stripped: usize,
}

impl StripReport {
    /// True when the pass wrote nothing back.
    pub fn was_noop(&self) -> bool {
        self.stripped == 0
    }
}

/// Runs one strip pass over a stream positioned at the start of an ELF
/// file.
///
/// Decodes the header, locates the first dynamic section, reads its entry
/// sequence through the `DT_NULL` terminator, zeroes every
/// symbol-versioning entry in place, and rewrites the whole captured
/// sequence at its original offset if anything changed. When nothing
/// matched, no write and no flush happen, so running the pass again on its
/// own output is a no-op.
///
/// Any failure leaves the file unwritten; the single write-back at the end
/// is the only mutation.
pub fn strip_version_info<S: Stream>(stream: &mut S) -> Result<StripReport> {
    let header = ElfHeader::from_reader(stream).context("could not parse the ELF header")?;
    log::info!("found {}-bit ELF executable", header.class.bits());

    let dynamic =
        find_dynamic_section(stream, &header).context("could not locate the dynamic section")?;

    stream
        .seek(SeekFrom::Start(dynamic.sh_offset))
        .with_context(|| {
            format!(
                "failed to seek to offset {}; this is sh_offset in the SHT_DYNAMIC section header",
                dynamic.sh_offset
            )
        })?;
    let mut entries = read_dynamic_entries(stream, header.class)
        .context("could not read the dynamic section")?;

    let stripped = strip_version_entries(&mut entries);
    if stripped > 0 {
        log::info!(
            "zeroing {stripped} of {} dynamic entries",
            entries.len()
        );
        stream
            .seek(SeekFrom::Start(dynamic.sh_offset))
            .with_context(|| {
                format!(
                    "while preparing to write: failed to seek to offset {}",
                    dynamic.sh_offset
                )
            })?;
        for entry in &entries {
            entry
                .write_to(stream, header.class)
                .context("failure while writing the updated dynamic section")?;
        }
        stream
            .flush()
            .context("failure while flushing I/O output buffers")?;
    } else {
        log::info!("no symbol-versioning entries present; file left untouched");
    }

    Ok(StripReport {
        class: header.class,
        entries: entries.len(),
        stripped,
    })
}

/// Opens `path` read-write and runs [`strip_version_info`] over it.
///
/// The handle lives for exactly one pass and is released on every exit
/// path.
pub fn patch_file<P: AsRef<Path>>(path: P) -> Result<StripReport> {
    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("couldn't open file: {}", path.display()))?;
    strip_version_info(&mut file)
}
