//! In-memory document tree: named [`Compound`] structures, lists of compounds,
//! and typed scalar leaves.
//!
//! A document is always rooted at a [`Compound`]. Lists hold compounds only,
//! matching how the wire grammar delimits list elements.

use std::fmt;

/// Discriminant of a [`Tag`], used in error messages and type checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// `bool`.
    Bool,
    /// Signed 8-bit integer.
    Byte,
    /// Raw bytes.
    ByteArray,
    /// Signed 16-bit integer.
    Short,
    /// Signed 32-bit integer.
    Int,
    /// Signed 64-bit integer.
    Long,
    /// IEEE-754 single precision.
    Float,
    /// IEEE-754 double precision.
    Double,
    /// UTF-8 string.
    String,
    /// Nested structure.
    Compound,
    /// Ordered list of structures.
    List,
}

/// A single node of a document tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    Bool(bool),
    Byte(i8),
    ByteArray(Vec<u8>),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Compound(Compound),
    List(Vec<Compound>),
}

impl Tag {
    /// Returns the kind of this tag.
    pub fn kind(&self) -> TagKind {
        match self {
            Tag::Bool(_) => TagKind::Bool,
            Tag::Byte(_) => TagKind::Byte,
            Tag::ByteArray(_) => TagKind::ByteArray,
            Tag::Short(_) => TagKind::Short,
            Tag::Int(_) => TagKind::Int,
            Tag::Long(_) => TagKind::Long,
            Tag::Float(_) => TagKind::Float,
            Tag::Double(_) => TagKind::Double,
            Tag::String(_) => TagKind::String,
            Tag::Compound(_) => TagKind::Compound,
            Tag::List(_) => TagKind::List,
        }
    }

    /// Widens any integer leaf (including `Bool`) to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Tag::Bool(v) => Some(i64::from(v)),
            Tag::Byte(v) => Some(i64::from(v)),
            Tag::Short(v) => Some(i64::from(v)),
            Tag::Int(v) => Some(i64::from(v)),
            Tag::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Widens any floating-point leaf to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Tag::Float(v) => Some(f64::from(v)),
            Tag::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Tag::ByteArray(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Compound]> {
        match self {
            Tag::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }
}

macro_rules! tag_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Tag {
                fn from(value: $ty) -> Self {
                    Tag::$variant(value)
                }
            }
        )*
    };
}

tag_from! {
    bool => Bool,
    i8 => Byte,
    Vec<u8> => ByteArray,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Compound => Compound,
    Vec<Compound> => List,
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::String(value.to_string())
    }
}

/// An ordered structure of uniquely named children.
///
/// Entries keep insertion order; inserting an existing key replaces its value
/// in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Compound {
    entries: Vec<(String, Tag)>,
}

impl Compound {
    /// Creates an empty compound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` at `key`, returning the previous value if the key was
    /// already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Tag>) -> Option<Tag> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Tag>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Tag> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Removes `key`, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Tag> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Tag::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i8(&self, key: &str) -> Option<i8> {
        match self.get(key)? {
            Tag::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i16(&self, key: &str) -> Option<i16> {
        match self.get(key)? {
            Tag::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            Tag::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Tag::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        match self.get(key)? {
            Tag::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Tag::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.get(key)?.as_bytes()
    }

    pub fn get_compound(&self, key: &str) -> Option<&Compound> {
        self.get(key)?.as_compound()
    }

    pub fn get_list(&self, key: &str) -> Option<&[Compound]> {
        self.get(key)?.as_list()
    }
}

impl<K: Into<String>, V: Into<Tag>> FromIterator<(K, V)> for Compound {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut compound = Compound::new();
        for (k, v) in iter {
            compound.insert(k, v);
        }
        compound
    }
}

// ---------------------------------------------------------------------------
// Text dump
// ---------------------------------------------------------------------------

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_compound(f, self, 0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tag(f, self, 0)
    }
}

fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("  ")?;
    }
    Ok(())
}

fn write_compound(f: &mut fmt::Formatter<'_>, compound: &Compound, depth: usize) -> fmt::Result {
    if compound.is_empty() {
        return f.write_str("{}");
    }
    f.write_str("{\n")?;
    for (key, value) in compound.iter() {
        write_indent(f, depth + 1)?;
        write!(f, "{key:?}: ")?;
        write_tag(f, value, depth + 1)?;
        f.write_str(",\n")?;
    }
    write_indent(f, depth)?;
    f.write_str("}")
}

fn write_tag(f: &mut fmt::Formatter<'_>, tag: &Tag, depth: usize) -> fmt::Result {
    match tag {
        Tag::Bool(v) => write!(f, "{v}"),
        Tag::Byte(v) => write!(f, "{v}b"),
        Tag::ByteArray(b) => write!(f, "[B; {} bytes]", b.len()),
        Tag::Short(v) => write!(f, "{v}s"),
        Tag::Int(v) => write!(f, "{v}"),
        Tag::Long(v) => write!(f, "{v}L"),
        Tag::Float(v) => write!(f, "{v}f"),
        Tag::Double(v) => write!(f, "{v}d"),
        Tag::String(s) => write!(f, "{s:?}"),
        Tag::Compound(c) => write_compound(f, c, depth),
        Tag::List(items) => {
            if items.is_empty() {
                return f.write_str("[]");
            }
            f.write_str("[\n")?;
            for item in items {
                write_indent(f, depth + 1)?;
                write_compound(f, item, depth + 1)?;
                f.write_str(",\n")?;
            }
            write_indent(f, depth)?;
            f.write_str("]")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
