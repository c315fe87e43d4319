//! Per-document key dictionary.
//!
//! The encoder scans the document once, ranks keys by how many times they
//! occur, and assigns single-byte aliases to the top
//! [`MAX_DICTIONARY_SIZE`] keys. The dictionary is written as an ordered
//! sequence; a key's position in that sequence *is* its alias, so encoder and
//! decoder never exchange explicit indices.

use rustc_hash::FxHashMap;

use crate::tag::{Compound, Tag};
use crate::token::MAX_DICTIONARY_SIZE;

/// Bijective mapping between up to 255 keys and their one-byte aliases.
#[derive(Clone, Debug, Default)]
pub struct KeyDictionary {
    /// Keys in alias order: `keys[a]` is the key for alias `a`.
    keys: Vec<String>,
    aliases: FxHashMap<String, u8>,
}

impl KeyDictionary {
    /// An empty dictionary; every key is written literally.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the dictionary for `doc` from a frequency scan of its keys.
    ///
    /// Keys used in more places rank first; ties keep first-seen (pre-order)
    /// order. Only the first [`MAX_DICTIONARY_SIZE`] keys receive aliases.
    pub fn build(doc: &Compound) -> Self {
        let mut counts: FxHashMap<&str, (u32, usize)> = FxHashMap::default();
        count_keys(doc, &mut counts);

        let mut ranked: Vec<(&str, u32, usize)> = counts
            .into_iter()
            .map(|(key, (count, first_seen))| (key, count, first_seen))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(MAX_DICTIONARY_SIZE);

        let dict = Self::from_ordered(ranked.into_iter().map(|(key, _, _)| key.to_string()));
        tracing::trace!(entries = dict.len(), "built key dictionary");
        dict
    }

    /// Rebuilds a dictionary from keys in alias order, as read from a stream.
    ///
    /// Keys past [`MAX_DICTIONARY_SIZE`] are ignored.
    pub fn from_ordered(keys: impl IntoIterator<Item = String>) -> Self {
        let mut dict = Self::default();
        for key in keys.into_iter().take(MAX_DICTIONARY_SIZE) {
            let alias = dict.keys.len() as u8;
            dict.aliases.entry(key.clone()).or_insert(alias);
            dict.keys.push(key);
        }
        dict
    }

    /// Alias assigned to `key`, if any.
    pub fn alias(&self, key: &str) -> Option<u8> {
        self.aliases.get(key).copied()
    }

    /// Key for `alias`, if the alias was declared.
    pub fn resolve(&self, alias: u8) -> Option<&str> {
        self.keys.get(alias as usize).map(String::as_str)
    }

    /// Keys in alias order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn count_keys<'a>(doc: &'a Compound, counts: &mut FxHashMap<&'a str, (u32, usize)>) {
    for (key, value) in doc.iter() {
        let next_index = counts.len();
        counts
            .entry(key)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, next_index));
        match value {
            Tag::Compound(child) => count_keys(child, counts),
            Tag::List(items) => {
                for item in items {
                    count_keys(item, counts);
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
