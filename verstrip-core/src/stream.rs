use std::io::{Read, Seek, Write};

/// Random-access byte stream the patch pass runs over.
///
/// The pass needs sequential reads, absolute and relative seeks, position
/// queries, writes, and a flush; `std::fs::File` provides all of that for
/// real binaries and `std::io::Cursor<Vec<u8>>` provides it for in-memory
/// tests, so the trait is a bound alias rather than a new surface.
pub trait Stream: Read + Write + Seek {}

impl<T: Read + Write + Seek> Stream for T {}
