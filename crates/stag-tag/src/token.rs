//! Wire constants of the STAG format and the [`Token`] event type.
//!
//! ## Stream layout
//!
//! | Field        | Size     | Notes                                              |
//! |--------------|----------|----------------------------------------------------|
//! | Magic        | 4        | `"STAG"`                                           |
//! | Version      | 1        | currently 1                                        |
//! | Compression  | 1 (i8)   | `< 0` plain, `0..=9` zlib level for the remainder  |
//! | Dictionary   | 1 + N    | count, then `count` key strings                    |
//! | Body         | variable | tokens until the root `STRUCTURE_TERMINATE`        |
//!
//! Inside a list each element is the element's child tokens closed by a
//! `STRUCTURE_TERMINATE`; the list itself is closed by `LIST_TERMINATE`.

use crate::tag::Tag;

/// Magic bytes identifying a tag stream.
pub const MAGIC: [u8; 4] = *b"STAG";

/// Current (and newest readable) stream version.
pub const FORMAT_VERSION: u8 = 1;

/// Compression marker written when the body is not compressed.
pub const NO_COMPRESSION: i8 = -1;

/// Highest zlib level accepted in the compression marker.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Maximum number of dictionary entries. `0xFF` is reserved for literal keys.
pub const MAX_DICTIONARY_SIZE: usize = 255;

/// Key byte announcing a literal key string.
pub const LITERAL_KEY: u8 = 0xFF;

/// One-byte length value escaping to a 4-byte big-endian length.
pub const SHORT_LEN_ESCAPE: u8 = 0xFF;

/// Two-byte byte-array length escaping to a 4-byte big-endian length.
pub const BYTE_ARRAY_LEN_ESCAPE: u16 = 0xFFFF;

pub const STRUCTURE_BEGIN: u8 = 0x10;
pub const STRUCTURE_TERMINATE: u8 = 0x11;
pub const STRUCTURE_EMPTY: u8 = 0x12;
pub const LIST_BEGIN: u8 = 0x20;
pub const LIST_TERMINATE: u8 = 0x21;
pub const LIST_EMPTY: u8 = 0x22;
pub const BOOLEAN: u8 = 0x30;
pub const BYTE: u8 = 0x40;
pub const BYTE_ARRAY: u8 = 0x41;
pub const INT16: u8 = 0x50;
pub const INT32: u8 = 0x51;
pub const INT64: u8 = 0x52;
pub const FLOAT32: u8 = 0x60;
pub const FLOAT64: u8 = 0x61;
pub const STRING: u8 = 0x71;

/// One structural event of a tag stream.
///
/// List elements carry no begin token: inside a list, any token other than
/// [`Token::ListEnd`] opens an element, which is closed by
/// [`Token::StructureEnd`].
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// A non-empty structure starts at `key`.
    StructureBegin(String),
    /// The innermost open structure (or list element, or the root) ends.
    StructureEnd,
    /// An empty structure at `key`.
    StructureEmpty(String),
    /// A non-empty list starts at `key`.
    ListBegin(String),
    /// The innermost open list ends.
    ListEnd,
    /// An empty list at `key`.
    ListEmpty(String),
    /// A scalar leaf. The tag is never a `Compound` or `List`.
    Value(String, Tag),
}
