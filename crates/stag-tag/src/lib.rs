//! Self-describing binary documents: the tag tree model, the STAG streaming
//! codec with per-document key dictionaries and optional zlib compression,
//! and the STAR multi-entry archive container.

pub mod archive;
pub mod dictionary;
pub mod error;
pub mod reader;
pub mod tag;
pub mod token;
pub mod writer;

pub use archive::{HeaderEntry, TagArchive};
pub use dictionary::KeyDictionary;
pub use error::{ArchiveError, TagError};
pub use reader::{TagReader, decode, decode_from};
pub use tag::{Compound, Tag, TagKind};
pub use token::Token;
pub use writer::{EncodeOptions, encode, encode_to};
