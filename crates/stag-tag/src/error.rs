//! Error types for the tag codec and archive container.

/// Errors raised while encoding or decoding a tag stream.
///
/// Every variant other than [`TagError::Io`] is a format error: the stream is
/// not a valid document and the current decode cannot continue.
#[derive(Debug, thiserror::Error)]
pub enum TagError {
    /// The stream does not start with the `STAG` magic.
    #[error("invalid tag stream magic: {0:02X?}")]
    BadMagic([u8; 4]),

    /// The stream was written by a newer (or unknown) format version.
    #[error("unsupported tag stream version: {0}")]
    UnsupportedVersion(u8),

    /// The compression marker or requested level is above 9.
    #[error("invalid compression level: {0}")]
    InvalidCompression(i32),

    /// A key byte referenced a dictionary slot that was never declared.
    #[error("unknown dictionary alias: {alias} (dictionary has {size} entries)")]
    UnknownAlias {
        /// The alias byte read from the stream.
        alias: u8,
        /// Number of entries in the stream's dictionary.
        size: usize,
    },

    /// A token started with a component id outside the grammar.
    #[error("unknown component id: 0x{0:02X}")]
    UnknownComponent(u8),

    /// A valid token appeared where the grammar does not allow it.
    #[error("unexpected token 0x{id:02X} inside {context}")]
    UnexpectedToken {
        /// Component id of the offending token.
        id: u8,
        /// The enclosing construct (`"structure"` or `"list"`).
        context: &'static str,
    },

    /// A key or string payload is not valid UTF-8.
    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A string or byte array is longer than the 4-byte length field allows.
    #[error("payload of {0} bytes exceeds the 4-byte length field")]
    LengthOverflow(usize),

    /// `next_token` was called after the root structure was closed.
    #[error("tag stream already finished")]
    Finished,

    /// `read_document` was called after tokens of the body were consumed.
    #[error("document body already partially read")]
    BodyStarted,

    /// The underlying byte source or sink failed (including truncation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading or writing a [`TagArchive`](crate::TagArchive).
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The stream does not start with the `STAR` magic.
    #[error("invalid archive magic: {0:02X?}")]
    BadMagic([u8; 4]),

    /// The archive was written by a newer (or unknown) format version.
    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u8),

    /// An entry name does not fit the 4-byte name length field.
    #[error("entry name of {0} bytes is too long")]
    NameTooLong(usize),

    /// An entry payload does not fit the 4-byte payload length field.
    #[error("payload of entry {name:?} is too large ({len} bytes)")]
    PayloadTooLarge {
        /// Entry name.
        name: String,
        /// Payload length in bytes.
        len: usize,
    },

    /// An entry name in the header is not valid UTF-8.
    #[error("entry name is not valid UTF-8")]
    InvalidName(#[from] std::string::FromUtf8Error),

    /// Decoding an extracted entry failed.
    #[error("failed to decode entry: {0}")]
    Tag(#[from] TagError),

    /// The underlying byte source or sink failed (including truncation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
