//! Associative container keyed by arbitrary byte strings.
//!
//! Keys are stored under their canonical lowercase hex encoding so that two
//! equal byte strings always land on the same entry, and iteration order is
//! the lexicographic order of that hex form. The original key bytes are kept
//! next to each value so iteration can hand them back without re-decoding.

use std::collections::BTreeMap;

use crate::encoding::{parse_hex_bytes, to_hex_key};

/// A map keyed by byte strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteArrayMap<V> {
    entries: BTreeMap<String, (Vec<u8>, V)>,
}

impl<V> Default for ByteArrayMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> ByteArrayMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value stored under `key`, returning the old value.
    pub fn set(&mut self, key: &[u8], value: V) -> Option<V> {
        self.entries
            .insert(to_hex_key(key), (key.to_vec(), value))
            .map(|(_, old)| old)
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.entries.get(&to_hex_key(key)).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        self.entries.get_mut(&to_hex_key(key)).map(|(_, v)| v)
    }

    /// Look up an entry by a hex key, with or without `0x` and in either case.
    pub fn get_by_hex(&self, hex_key: &str) -> Option<&V> {
        let key = parse_hex_bytes(hex_key, "key").ok()?;
        self.get(&key)
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.entries.contains_key(&to_hex_key(key))
    }

    /// Remove `key`, returning its value if it was present.
    pub fn delete(&mut self, key: &[u8]) -> Option<V> {
        self.entries.remove(&to_hex_key(key)).map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, value)` pairs ordered by the key's hex form.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> + '_ {
        self.entries.values().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.entries.values().map(|(k, _)| k.as_slice())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.values().map(|(_, v)| v)
    }
}

impl<V: Clone> ByteArrayMap<V> {
    /// Owned `(key, value)` pairs ordered by the key's hex form.
    pub fn entries(&self) -> Vec<(Vec<u8>, V)> {
        self.entries.values().cloned().collect()
    }
}

impl<V> FromIterator<(Vec<u8>, V)> for ByteArrayMap<V> {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.set(&key, value);
        }
        map
    }
}
