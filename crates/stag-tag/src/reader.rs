//! Streaming decoder for STAG documents.
//!
//! [`TagReader`] yields one [`Token`] at a time and never reads past the
//! root terminator, so a document can be decoded from the middle of a larger
//! framed message and the caller can keep reading the same source afterwards.

use std::io::{self, BufRead, Read};

use flate2::bufread::ZlibDecoder;

use crate::dictionary::KeyDictionary;
use crate::error::TagError;
use crate::tag::{Compound, Tag};
use crate::token::{
    BOOLEAN, BYTE, BYTE_ARRAY, BYTE_ARRAY_LEN_ESCAPE, FLOAT32, FLOAT64, FORMAT_VERSION, INT16,
    INT32, INT64, LIST_BEGIN, LIST_EMPTY, LIST_TERMINATE, LITERAL_KEY, MAGIC,
    MAX_COMPRESSION_LEVEL, SHORT_LEN_ESCAPE, STRING, STRUCTURE_BEGIN, STRUCTURE_EMPTY,
    STRUCTURE_TERMINATE, Token,
};

/// Decodes a complete document from a byte slice.
pub fn decode(bytes: &[u8]) -> Result<Compound, TagError> {
    let mut reader = TagReader::new(bytes)?;
    let doc = reader.read_document()?;
    tracing::debug!(bytes = bytes.len(), entries = doc.len(), "decoded tag document");
    Ok(doc)
}

/// Decodes one document from `source` and returns the source positioned
/// directly after it.
pub fn decode_from<R: BufRead>(source: R) -> Result<(Compound, R), TagError> {
    let mut reader = TagReader::new(source)?;
    let doc = reader.read_document()?;
    Ok((doc, reader.into_inner()))
}

/// Byte source for the post-header part of the stream.
enum Source<R: BufRead> {
    Plain(R),
    Zlib(ZlibDecoder<R>),
}

impl<R: BufRead> Read for Source<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(r) => r.read(buf),
            Source::Zlib(r) => r.read(buf),
        }
    }
}

/// Open construct on the reader's nesting stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Frame {
    Structure,
    List,
}

/// Incremental token reader over a [`BufRead`] source.
pub struct TagReader<R: BufRead> {
    source: Source<R>,
    dictionary: KeyDictionary,
    stack: Vec<Frame>,
    body_started: bool,
    finished: bool,
}

impl<R: BufRead> TagReader<R> {
    /// Reads the header, compression marker and dictionary from `inner`.
    ///
    /// Fails with a format error on a bad magic, an unsupported version or a
    /// malformed dictionary.
    pub fn new(mut inner: R) -> Result<Self, TagError> {
        let mut magic = [0u8; 4];
        inner.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(TagError::BadMagic(magic));
        }

        let mut header = [0u8; 2];
        inner.read_exact(&mut header)?;
        let version = header[0];
        if version == 0 || version > FORMAT_VERSION {
            return Err(TagError::UnsupportedVersion(version));
        }

        let marker = header[1] as i8;
        if i32::from(marker) > MAX_COMPRESSION_LEVEL as i32 {
            return Err(TagError::InvalidCompression(i32::from(marker)));
        }
        let source = if marker < 0 {
            Source::Plain(inner)
        } else {
            Source::Zlib(ZlibDecoder::new(inner))
        };

        let mut reader = Self {
            source,
            dictionary: KeyDictionary::empty(),
            stack: vec![Frame::Structure],
            body_started: false,
            finished: false,
        };
        reader.dictionary = reader.read_dictionary()?;
        Ok(reader)
    }

    /// The dictionary declared by this stream.
    pub fn dictionary(&self) -> &KeyDictionary {
        &self.dictionary
    }

    /// Whether the stream body is zlib-compressed.
    pub fn is_compressed(&self) -> bool {
        matches!(self.source, Source::Zlib(_))
    }

    /// `true` once the root terminator has been read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current nesting depth; the root structure counts as 1.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns the underlying source.
    ///
    /// After the document is finished the source is positioned right after
    /// it; otherwise the position is undefined.
    pub fn into_inner(self) -> R {
        match self.source {
            Source::Plain(r) => r,
            Source::Zlib(r) => r.into_inner(),
        }
    }

    /// Reads the next structural event.
    ///
    /// Returns `Ok(None)` once the root [`Token::StructureEnd`] has been
    /// returned.
    pub fn next_token(&mut self) -> Result<Option<Token>, TagError> {
        if self.finished {
            return Ok(None);
        }

        let id = self.read_u8()?;
        self.body_started = true;

        match self.stack.last() {
            Some(Frame::List) if id == LIST_TERMINATE => {
                self.stack.pop();
                return Ok(Some(Token::ListEnd));
            }
            // Any other token inside a list opens the next element.
            Some(Frame::List) => self.stack.push(Frame::Structure),
            _ => {}
        }

        let token = match id {
            STRUCTURE_TERMINATE => {
                self.stack.pop();
                if self.stack.is_empty() {
                    self.finish()?;
                }
                Token::StructureEnd
            }
            STRUCTURE_BEGIN => {
                let key = self.read_key()?;
                self.stack.push(Frame::Structure);
                Token::StructureBegin(key)
            }
            STRUCTURE_EMPTY => Token::StructureEmpty(self.read_key()?),
            LIST_BEGIN => {
                let key = self.read_key()?;
                self.stack.push(Frame::List);
                Token::ListBegin(key)
            }
            LIST_EMPTY => Token::ListEmpty(self.read_key()?),
            LIST_TERMINATE => {
                return Err(TagError::UnexpectedToken {
                    id,
                    context: "structure",
                });
            }
            BOOLEAN | BYTE | BYTE_ARRAY | INT16 | INT32 | INT64 | FLOAT32 | FLOAT64 | STRING => {
                let key = self.read_key()?;
                let value = self.read_payload(id)?;
                Token::Value(key, value)
            }
            other => return Err(TagError::UnknownComponent(other)),
        };
        Ok(Some(token))
    }

    /// Builds the document tree from the remaining tokens.
    ///
    /// Fails with [`TagError::BodyStarted`] once [`next_token`](Self::next_token)
    /// has consumed part of the body.
    pub fn read_document(&mut self) -> Result<Compound, TagError> {
        if self.finished {
            return Err(TagError::Finished);
        }
        if self.body_started {
            return Err(TagError::BodyStarted);
        }

        let mut builder = TreeBuilder::default();
        while let Some(token) = self.next_token()? {
            if let Some(root) = builder.push(token) {
                return Ok(root);
            }
        }
        Err(TagError::Finished)
    }

    /// Drains the compressor to its end marker so the inner source sits
    /// exactly after the document.
    fn finish(&mut self) -> Result<(), TagError> {
        self.finished = true;
        if let Source::Zlib(decoder) = &mut self.source {
            io::copy(decoder, &mut io::sink())?;
        }
        Ok(())
    }

    fn read_dictionary(&mut self) -> Result<KeyDictionary, TagError> {
        let count = self.read_u8()? as usize;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(self.read_short_string()?);
        }
        Ok(KeyDictionary::from_ordered(keys))
    }

    fn read_key(&mut self) -> Result<String, TagError> {
        let byte = self.read_u8()?;
        if byte == LITERAL_KEY {
            return self.read_short_string();
        }
        self.dictionary
            .resolve(byte)
            .map(str::to_string)
            .ok_or(TagError::UnknownAlias {
                alias: byte,
                size: self.dictionary.len(),
            })
    }

    fn read_payload(&mut self, id: u8) -> Result<Tag, TagError> {
        let tag = match id {
            BOOLEAN => Tag::Bool(self.read_u8()? != 0),
            BYTE => Tag::Byte(self.read_u8()? as i8),
            BYTE_ARRAY => {
                let short = u16::from_be_bytes(self.read_array()?);
                let len = if short == BYTE_ARRAY_LEN_ESCAPE {
                    u32::from_be_bytes(self.read_array()?) as usize
                } else {
                    short as usize
                };
                Tag::ByteArray(self.read_bytes(len)?)
            }
            INT16 => Tag::Short(i16::from_be_bytes(self.read_array()?)),
            INT32 => Tag::Int(i32::from_be_bytes(self.read_array()?)),
            INT64 => Tag::Long(i64::from_be_bytes(self.read_array()?)),
            FLOAT32 => Tag::Float(f32::from_be_bytes(self.read_array()?)),
            FLOAT64 => Tag::Double(f64::from_be_bytes(self.read_array()?)),
            STRING => Tag::String(self.read_short_string()?),
            other => return Err(TagError::UnknownComponent(other)),
        };
        Ok(tag)
    }

    fn read_short_string(&mut self) -> Result<String, TagError> {
        let short = self.read_u8()?;
        let len = if short == SHORT_LEN_ESCAPE {
            u32::from_be_bytes(self.read_array()?) as usize
        } else {
            short as usize
        };
        Ok(String::from_utf8(self.read_bytes(len)?)?)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, TagError> {
        // Grow as data arrives instead of trusting the length field up front.
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        (&mut self.source).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(buf)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TagError> {
        let mut buf = [0u8; N];
        self.source.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, TagError> {
        let [byte] = self.read_array::<1>()?;
        Ok(byte)
    }
}

/// Reassembles a [`Compound`] tree from a token stream.
#[derive(Default)]
struct TreeBuilder {
    frames: Vec<BuildFrame>,
}

enum BuildFrame {
    /// `key` is `None` for the root and for list elements.
    Structure { key: Option<String>, compound: Compound },
    List { key: String, items: Vec<Compound> },
}

impl TreeBuilder {
    /// Feeds one token; returns the root once it is closed.
    fn push(&mut self, token: Token) -> Option<Compound> {
        if self.frames.is_empty() {
            self.frames.push(BuildFrame::Structure {
                key: None,
                compound: Compound::new(),
            });
        }
        if matches!(self.frames.last(), Some(BuildFrame::List { .. })) && token != Token::ListEnd {
            self.frames.push(BuildFrame::Structure {
                key: None,
                compound: Compound::new(),
            });
        }

        match token {
            Token::StructureBegin(key) => self.frames.push(BuildFrame::Structure {
                key: Some(key),
                compound: Compound::new(),
            }),
            Token::ListBegin(key) => self.frames.push(BuildFrame::List {
                key,
                items: Vec::new(),
            }),
            Token::StructureEmpty(key) => self.insert(key, Tag::Compound(Compound::new())),
            Token::ListEmpty(key) => self.insert(key, Tag::List(Vec::new())),
            Token::Value(key, value) => self.insert(key, value),
            Token::StructureEnd => {
                if let Some(BuildFrame::Structure { key, compound }) = self.frames.pop() {
                    match key {
                        Some(key) => self.insert(key, Tag::Compound(compound)),
                        None => match self.frames.last_mut() {
                            None => return Some(compound),
                            Some(BuildFrame::List { items, .. }) => items.push(compound),
                            Some(BuildFrame::Structure { .. }) => {}
                        },
                    }
                }
            }
            Token::ListEnd => {
                if let Some(BuildFrame::List { key, items }) = self.frames.pop() {
                    self.insert(key, Tag::List(items));
                }
            }
        }
        None
    }

    fn insert(&mut self, key: String, value: Tag) {
        if let Some(BuildFrame::Structure { compound, .. }) = self.frames.last_mut() {
            compound.insert(key, value);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
