//! STAR archive: many named, independently encoded blobs behind one header.
//!
//! ## Binary Layout
//!
//! | Field   | Size     | Notes                                                  |
//! |---------|----------|--------------------------------------------------------|
//! | Magic   | 4        | `"STAR"`                                               |
//! | Version | 1        | currently 1                                            |
//! | Entries | variable | name length, name bytes, payload length (u32 BE)       |
//! | End     | 1        | `0xFF`                                                 |
//! | Body    | variable | payloads concatenated in header order                  |
//!
//! A name length byte of `0xFE` is followed by a 4-byte big-endian length;
//! `0xFF` ends the header. The archive does not interpret payloads.

use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};

use crate::error::ArchiveError;
use crate::reader::TagReader;
use crate::tag::Compound;

/// Magic bytes identifying an archive.
pub const ARCHIVE_MAGIC: [u8; 4] = *b"STAR";

/// Current (and newest readable) archive version.
pub const ARCHIVE_VERSION: u8 = 1;

/// Name length byte escaping to a 4-byte big-endian length.
const NAME_LEN_ESCAPE: u8 = 0xFE;

/// Name length byte terminating the header.
const END_OF_HEADER: u8 = 0xFF;

/// One header record: entry name and payload length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: String,
    pub len: u32,
}

/// In-memory archive of named payloads, kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagArchive {
    entries: Vec<(String, Vec<u8>)>,
}

impl TagArchive {
    /// Creates an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `payload` under `name`.
    ///
    /// Replacing an existing entry keeps its position in the header and
    /// returns the old payload.
    pub fn put(&mut self, name: impl Into<String>, payload: Vec<u8>) -> Option<Vec<u8>> {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, payload)),
            None => {
                self.entries.push((name, payload));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.as_slice())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Entry names in header order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterates over `(name, payload)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, p)| (n.as_str(), p.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the whole archive (header then payloads) to `sink`.
    ///
    /// All lengths are validated before the first byte is written.
    pub fn write_all<W: Write>(&self, mut sink: W) -> Result<(), ArchiveError> {
        for (name, payload) in &self.entries {
            if u32::try_from(name.len()).is_err() {
                return Err(ArchiveError::NameTooLong(name.len()));
            }
            if u32::try_from(payload.len()).is_err() {
                return Err(ArchiveError::PayloadTooLarge {
                    name: name.clone(),
                    len: payload.len(),
                });
            }
        }

        sink.write_all(&ARCHIVE_MAGIC)?;
        sink.write_all(&[ARCHIVE_VERSION])?;
        for (name, payload) in &self.entries {
            let name_bytes = name.as_bytes();
            if name_bytes.len() < NAME_LEN_ESCAPE as usize {
                sink.write_all(&[name_bytes.len() as u8])?;
            } else {
                sink.write_all(&[NAME_LEN_ESCAPE])?;
                sink.write_all(&(name_bytes.len() as u32).to_be_bytes())?;
            }
            sink.write_all(name_bytes)?;
            sink.write_all(&(payload.len() as u32).to_be_bytes())?;
        }
        sink.write_all(&[END_OF_HEADER])?;

        for (_, payload) in &self.entries {
            sink.write_all(payload)?;
        }
        sink.flush()?;

        tracing::debug!(entries = self.entries.len(), "wrote tag archive");
        Ok(())
    }

    /// Reads a whole archive from `source`.
    pub fn read_all<R: Read>(mut source: R) -> Result<Self, ArchiveError> {
        let header = read_header(&mut source)?;
        let mut archive = TagArchive::new();
        for entry in header {
            let payload = read_exact_vec(&mut source, entry.len as usize)?;
            archive.put(entry.name, payload);
        }
        tracing::debug!(entries = archive.len(), "read tag archive");
        Ok(archive)
    }

    /// Reads only the payload of `name`, seeking past every other entry.
    ///
    /// Returns `Ok(None)` if the archive has no such entry.
    pub fn extract_one<R: Read + Seek>(name: &str, mut source: R) -> Result<Option<Vec<u8>>, ArchiveError> {
        let Some(len) = seek_to_entry(name, &mut source)? else {
            return Ok(None);
        };
        Ok(Some(read_exact_vec(&mut source, len as usize)?))
    }

    /// Decodes the document stored under `name` directly from `source`,
    /// without materialising the rest of the archive.
    pub fn extract_document<R: Read + Seek>(
        name: &str,
        mut source: R,
    ) -> Result<Option<Compound>, ArchiveError> {
        let Some(len) = seek_to_entry(name, &mut source)? else {
            return Ok(None);
        };
        let entry = BufReader::new((&mut source).take(u64::from(len)));
        let mut reader = TagReader::new(entry)?;
        Ok(Some(reader.read_document()?))
    }
}

/// Reads the archive magic, version and header records from `source`.
pub fn read_header<R: Read>(source: &mut R) -> Result<Vec<HeaderEntry>, ArchiveError> {
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic)?;
    if magic != ARCHIVE_MAGIC {
        return Err(ArchiveError::BadMagic(magic));
    }
    let version = read_u8(source)?;
    if version == 0 || version > ARCHIVE_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }

    let mut entries = Vec::new();
    loop {
        let name_len = match read_u8(source)? {
            END_OF_HEADER => break,
            NAME_LEN_ESCAPE => read_u32(source)? as usize,
            short => short as usize,
        };
        let name = String::from_utf8(read_exact_vec(source, name_len)?)?;
        let len = read_u32(source)?;
        entries.push(HeaderEntry { name, len });
    }
    Ok(entries)
}

/// Positions `source` at the start of `name`'s payload and returns its length.
fn seek_to_entry<R: Read + Seek>(name: &str, source: &mut R) -> Result<Option<u32>, ArchiveError> {
    let header = read_header(source)?;
    let mut skip: u64 = 0;
    for entry in header {
        if entry.name == name {
            if skip > 0 {
                source.seek(SeekFrom::Current(skip as i64))?;
            }
            return Ok(Some(entry.len));
        }
        skip += u64::from(entry.len);
    }
    Ok(None)
}

fn read_u8<R: Read>(source: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    source.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(source: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_exact_vec<R: Read>(source: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(1 << 20));
    source.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::decode;
    use crate::writer::{EncodeOptions, encode};

    #[test]
    fn test_two_entry_header_layout() {
        let mut archive = TagArchive::new();
        archive.put("A", vec![1, 2, 3]);
        archive.put("BB", vec![9]);

        let mut bytes = Vec::new();
        archive.write_all(&mut bytes).unwrap();

        let mut expected = b"STAR\x01".to_vec();
        expected.extend_from_slice(&[1, b'A', 0, 0, 0, 3]);
        expected.extend_from_slice(&[2, b'B', b'B', 0, 0, 0, 1]);
        expected.push(0xFF);
        expected.extend_from_slice(&[1, 2, 3, 9]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_read_all_restores_entries_in_order() {
        let mut archive = TagArchive::new();
        archive.put("world", b"meta".to_vec());
        archive.put("chunk.0.0", vec![0; 10]);
        archive.put("empty", Vec::new());

        let mut bytes = Vec::new();
        archive.write_all(&mut bytes).unwrap();
        let restored = TagArchive::read_all(bytes.as_slice()).unwrap();

        assert_eq!(restored, archive);
        assert_eq!(
            restored.keys().collect::<Vec<_>>(),
            vec!["world", "chunk.0.0", "empty"]
        );
    }

    #[test]
    fn test_put_replaces_in_place() {
        let mut archive = TagArchive::new();
        archive.put("a", vec![1]);
        archive.put("b", vec![2]);
        assert_eq!(archive.put("a", vec![3]), Some(vec![1]));
        assert_eq!(archive.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(archive.get("a"), Some(&[3u8][..]));
        assert!(archive.has("b"));
        assert_eq!(archive.remove("b"), Some(vec![2]));
        assert!(!archive.has("b"));
    }

    #[test]
    fn test_long_name_uses_escape() {
        let name = "n".repeat(300);
        let mut archive = TagArchive::new();
        archive.put(name.clone(), vec![5]);

        let mut bytes = Vec::new();
        archive.write_all(&mut bytes).unwrap();
        assert_eq!(bytes[5], NAME_LEN_ESCAPE);
        assert_eq!(&bytes[6..10], &300u32.to_be_bytes());

        let restored = TagArchive::read_all(bytes.as_slice()).unwrap();
        assert_eq!(restored.get(&name), Some(&[5u8][..]));
    }

    #[test]
    fn test_extract_matches_direct_decode_for_every_entry() {
        let mut archive = TagArchive::new();
        for i in 0..5i32 {
            let doc = Compound::new().with("Index", i).with("Name", format!("entry{i}"));
            let options = EncodeOptions::default().with_compression((i % 2 == 0).then_some(6));
            archive.put(format!("e{i}"), encode(&doc, options).unwrap());
        }
        let mut bytes = Vec::new();
        archive.write_all(&mut bytes).unwrap();

        for name in archive.keys() {
            let direct = decode(archive.get(name).unwrap()).unwrap();
            let extracted = TagArchive::extract_document(name, Cursor::new(&bytes))
                .unwrap()
                .unwrap();
            assert_eq!(extracted, direct, "entry {name}");

            let raw = TagArchive::extract_one(name, Cursor::new(&bytes))
                .unwrap()
                .unwrap();
            assert_eq!(raw, archive.get(name).unwrap());
        }
    }

    #[test]
    fn test_extract_missing_entry_is_none() {
        let mut archive = TagArchive::new();
        archive.put("present", vec![1]);
        let mut bytes = Vec::new();
        archive.write_all(&mut bytes).unwrap();

        let result = TagArchive::extract_one("absent", Cursor::new(&bytes)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let result = TagArchive::read_all(&b"STAG\x01\xFF"[..]);
        assert!(matches!(result, Err(ArchiveError::BadMagic(_))));
    }

    #[test]
    fn test_future_version_rejected() {
        let result = TagArchive::read_all(&b"STAR\x07\xFF"[..]);
        assert!(matches!(result, Err(ArchiveError::UnsupportedVersion(7))));
    }

    #[test]
    fn test_truncated_body_is_io_error() {
        let mut archive = TagArchive::new();
        archive.put("a", vec![1, 2, 3, 4]);
        let mut bytes = Vec::new();
        archive.write_all(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 2);

        let result = TagArchive::read_all(bytes.as_slice());
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }
}
