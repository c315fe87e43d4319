//! Streaming encoder for STAG documents.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::dictionary::KeyDictionary;
use crate::error::TagError;
use crate::tag::{Compound, Tag};
use crate::token::{
    BOOLEAN, BYTE, BYTE_ARRAY, BYTE_ARRAY_LEN_ESCAPE, FLOAT32, FLOAT64, FORMAT_VERSION, INT16,
    INT32, INT64, LIST_BEGIN, LIST_EMPTY, LIST_TERMINATE, LITERAL_KEY, MAGIC,
    MAX_COMPRESSION_LEVEL, NO_COMPRESSION, SHORT_LEN_ESCAPE, STRING, STRUCTURE_BEGIN,
    STRUCTURE_EMPTY, STRUCTURE_TERMINATE,
};

/// Controls how a document is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeOptions {
    /// zlib level (`0..=9`) applied to everything after the compression
    /// marker, or `None` for a plain stream. Default: `None`.
    pub compression: Option<u32>,
    /// Whether to build and emit a key dictionary. Default: `true`.
    pub use_dictionary: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            compression: None,
            use_dictionary: true,
        }
    }
}

impl EncodeOptions {
    /// Plain stream, no dictionary: every key written literally.
    pub fn plain() -> Self {
        Self {
            compression: None,
            use_dictionary: false,
        }
    }

    /// Returns a copy with the given compression level.
    pub fn with_compression(mut self, level: Option<u32>) -> Self {
        self.compression = level;
        self
    }

    /// Returns a copy with the dictionary enabled or disabled.
    pub fn with_dictionary(mut self, use_dictionary: bool) -> Self {
        self.use_dictionary = use_dictionary;
        self
    }
}

/// Encodes `doc` into a new byte vector.
pub fn encode(doc: &Compound, options: EncodeOptions) -> Result<Vec<u8>, TagError> {
    let bytes = encode_to(Vec::new(), doc, options)?;
    tracing::debug!(
        bytes = bytes.len(),
        compression = ?options.compression,
        dictionary = options.use_dictionary,
        "encoded tag document"
    );
    Ok(bytes)
}

/// Encodes `doc` into `writer` and hands the writer back.
///
/// When compression is enabled the compressor is flushed and finished before
/// returning, so the caller may keep writing unrelated data to the same sink
/// and a reader can resume right after the document.
pub fn encode_to<W: Write>(mut writer: W, doc: &Compound, options: EncodeOptions) -> Result<W, TagError> {
    let marker = match options.compression {
        None => NO_COMPRESSION,
        Some(level) if level <= MAX_COMPRESSION_LEVEL => level as i8,
        Some(level) => {
            return Err(TagError::InvalidCompression(
                i32::try_from(level).unwrap_or(i32::MAX),
            ));
        }
    };

    writer.write_all(&MAGIC)?;
    writer.write_all(&[FORMAT_VERSION, marker as u8])?;

    let dictionary = if options.use_dictionary {
        KeyDictionary::build(doc)
    } else {
        KeyDictionary::empty()
    };

    match options.compression {
        None => {
            let mut body = TagWriter::new(writer, &dictionary);
            body.write_dictionary()?;
            body.write_structure_body(doc)?;
            body.out.flush()?;
            Ok(body.out)
        }
        Some(level) => {
            let encoder = ZlibEncoder::new(writer, Compression::new(level));
            let mut body = TagWriter::new(encoder, &dictionary);
            body.write_dictionary()?;
            body.write_structure_body(doc)?;
            body.out.flush()?;
            Ok(body.out.finish()?)
        }
    }
}

/// Writes tokens for one document against a fixed dictionary.
struct TagWriter<'d, W: Write> {
    out: W,
    dictionary: &'d KeyDictionary,
}

impl<'d, W: Write> TagWriter<'d, W> {
    fn new(out: W, dictionary: &'d KeyDictionary) -> Self {
        Self { out, dictionary }
    }

    fn write_dictionary(&mut self) -> Result<(), TagError> {
        self.write_u8(self.dictionary.len() as u8)?;
        for key in self.dictionary.keys() {
            write_short_string(&mut self.out, key)?;
        }
        Ok(())
    }

    /// Writes the children of `compound` followed by its terminator.
    fn write_structure_body(&mut self, compound: &Compound) -> Result<(), TagError> {
        for (key, value) in compound.iter() {
            self.write_entry(key, value)?;
        }
        self.write_u8(STRUCTURE_TERMINATE)
    }

    fn write_entry(&mut self, key: &str, value: &Tag) -> Result<(), TagError> {
        match value {
            Tag::Compound(child) if child.is_empty() => {
                self.write_u8(STRUCTURE_EMPTY)?;
                self.write_key(key)
            }
            Tag::Compound(child) => {
                self.write_u8(STRUCTURE_BEGIN)?;
                self.write_key(key)?;
                self.write_structure_body(child)
            }
            Tag::List(items) if items.is_empty() => {
                self.write_u8(LIST_EMPTY)?;
                self.write_key(key)
            }
            Tag::List(items) => {
                self.write_u8(LIST_BEGIN)?;
                self.write_key(key)?;
                for item in items {
                    self.write_structure_body(item)?;
                }
                self.write_u8(LIST_TERMINATE)
            }
            Tag::Bool(v) => {
                self.write_leaf_head(BOOLEAN, key)?;
                self.write_u8(u8::from(*v))
            }
            Tag::Byte(v) => {
                self.write_leaf_head(BYTE, key)?;
                self.write_u8(*v as u8)
            }
            Tag::ByteArray(bytes) => {
                self.write_leaf_head(BYTE_ARRAY, key)?;
                if bytes.len() < BYTE_ARRAY_LEN_ESCAPE as usize {
                    self.out.write_all(&(bytes.len() as u16).to_be_bytes())?;
                } else {
                    self.out.write_all(&BYTE_ARRAY_LEN_ESCAPE.to_be_bytes())?;
                    self.out.write_all(&long_len(bytes.len())?.to_be_bytes())?;
                }
                self.out.write_all(bytes)?;
                Ok(())
            }
            Tag::Short(v) => {
                self.write_leaf_head(INT16, key)?;
                Ok(self.out.write_all(&v.to_be_bytes())?)
            }
            Tag::Int(v) => {
                self.write_leaf_head(INT32, key)?;
                Ok(self.out.write_all(&v.to_be_bytes())?)
            }
            Tag::Long(v) => {
                self.write_leaf_head(INT64, key)?;
                Ok(self.out.write_all(&v.to_be_bytes())?)
            }
            Tag::Float(v) => {
                self.write_leaf_head(FLOAT32, key)?;
                Ok(self.out.write_all(&v.to_be_bytes())?)
            }
            Tag::Double(v) => {
                self.write_leaf_head(FLOAT64, key)?;
                Ok(self.out.write_all(&v.to_be_bytes())?)
            }
            Tag::String(s) => {
                self.write_leaf_head(STRING, key)?;
                write_short_string(&mut self.out, s)
            }
        }
    }

    /// Component id followed by the key.
    fn write_leaf_head(&mut self, id: u8, key: &str) -> Result<(), TagError> {
        self.write_u8(id)?;
        self.write_key(key)
    }

    fn write_key(&mut self, key: &str) -> Result<(), TagError> {
        match self.dictionary.alias(key) {
            Some(alias) => self.write_u8(alias),
            None => {
                self.write_u8(LITERAL_KEY)?;
                write_short_string(&mut self.out, key)
            }
        }
    }

    fn write_u8(&mut self, byte: u8) -> Result<(), TagError> {
        self.out.write_all(&[byte])?;
        Ok(())
    }
}

/// Writes `s` with a 1-byte length, escaping to a 4-byte length at `0xFF`.
fn write_short_string<W: Write>(out: &mut W, s: &str) -> Result<(), TagError> {
    let bytes = s.as_bytes();
    if bytes.len() < SHORT_LEN_ESCAPE as usize {
        out.write_all(&[bytes.len() as u8])?;
    } else {
        out.write_all(&[SHORT_LEN_ESCAPE])?;
        out.write_all(&long_len(bytes.len())?.to_be_bytes())?;
    }
    out.write_all(bytes)?;
    Ok(())
}

fn long_len(len: usize) -> Result<u32, TagError> {
    u32::try_from(len).map_err(|_| TagError::LengthOverflow(len))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_plain() {
        let bytes = encode(&Compound::new(), EncodeOptions::plain()).unwrap();
        // magic, version, marker, empty dictionary, root terminate
        assert_eq!(bytes, b"STAG\x01\xFF\x00\x11");
    }

    #[test]
    fn test_single_long_leaf_bytes() {
        let doc = Compound::new().with("Seed", 42i64);
        let bytes = encode(&doc, EncodeOptions::plain()).unwrap();

        let mut expected = b"STAG\x01\xFF\x00".to_vec();
        expected.extend_from_slice(&[0x52, LITERAL_KEY, 4]);
        expected.extend_from_slice(b"Seed");
        expected.extend_from_slice(&42i64.to_be_bytes());
        expected.push(STRUCTURE_TERMINATE);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_every_leaf_kind_gets_its_component_id() {
        let cases: [(Tag, u8); 9] = [
            (true.into(), BOOLEAN),
            ((-3i8).into(), BYTE),
            (vec![1u8, 2].into(), BYTE_ARRAY),
            (7i16.into(), INT16),
            (7i32.into(), INT32),
            (7i64.into(), INT64),
            (1.5f32.into(), FLOAT32),
            (1.5f64.into(), FLOAT64),
            ("v".into(), STRING),
        ];
        for (value, id) in cases {
            let doc = Compound::new().with("k", value.clone());
            let bytes = encode(&doc, EncodeOptions::plain()).unwrap();
            assert_eq!(bytes[7], id, "{value:?}");
            assert_eq!(&bytes[8..11], &[LITERAL_KEY, 1, b'k']);
            assert_eq!(bytes.last(), Some(&STRUCTURE_TERMINATE));
        }
    }

    #[test]
    fn test_dictionary_replaces_literal_keys() {
        let doc = Compound::new().with("Seed", 42i64);
        let bytes = encode(&doc, EncodeOptions::default()).unwrap();

        // dictionary: one entry "Seed"
        assert_eq!(&bytes[6..12], b"\x01\x04Seed");
        // leaf uses alias 0
        assert_eq!(&bytes[12..14], &[0x52, 0x00]);
    }

    #[test]
    fn test_empty_containers_use_single_token() {
        let doc = Compound::new()
            .with("a", Compound::new())
            .with("b", Vec::<Compound>::new());
        let bytes = encode(&doc, EncodeOptions::plain()).unwrap();
        let body = &bytes[7..];
        assert_eq!(
            body,
            &[STRUCTURE_EMPTY, LITERAL_KEY, 1, b'a', LIST_EMPTY, LITERAL_KEY, 1, b'b', STRUCTURE_TERMINATE]
        );
    }

    #[test]
    fn test_long_string_uses_escape() {
        let long = "x".repeat(300);
        let doc = Compound::new().with("s", long.as_str());
        let bytes = encode(&doc, EncodeOptions::plain()).unwrap();
        // STRING, literal key "s", then escape + 4-byte length
        let payload = &bytes[7 + 4..];
        assert_eq!(payload[0], SHORT_LEN_ESCAPE);
        assert_eq!(&payload[1..5], &300u32.to_be_bytes());
    }

    #[test]
    fn test_compression_marker_and_level_check() {
        let doc = Compound::new().with("k", 1i32);
        let bytes = encode(&doc, EncodeOptions::plain().with_compression(Some(6))).unwrap();
        assert_eq!(bytes[5], 6);

        let result = encode(&doc, EncodeOptions::plain().with_compression(Some(12)));
        assert!(matches!(result, Err(TagError::InvalidCompression(12))));
    }
}
