use super::BencodeValue;
use std::collections::HashMap;

/// Dictionary that remembers the order its keys were inserted in.
///
/// Re-encoding must reproduce the exact bytes a dictionary was decoded
/// from, so only ordered iteration is exposed.
#[derive(Debug, Clone, Default)]
pub struct BencodeDict {
    entries: Vec<(Vec<u8>, BencodeValue)>,
    index: HashMap<Vec<u8>, usize>,
}

impl BencodeDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by key
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Insert a value. An existing key keeps its position and has its value
    /// replaced; the previous value is returned.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: BencodeValue) -> Option<BencodeValue> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &BencodeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|(k, _)| k.as_slice())
    }
}

// Order is part of a dictionary's identity.
impl PartialEq for BencodeDict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for BencodeDict {}

impl<K: Into<Vec<u8>>> FromIterator<(K, BencodeValue)> for BencodeDict {
    fn from_iter<I: IntoIterator<Item = (K, BencodeValue)>>(iter: I) -> Self {
        let mut dict = BencodeDict::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}
