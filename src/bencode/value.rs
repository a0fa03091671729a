use super::BencodeDict;
use crate::error::{BittorrentError, Result};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Represents a bencoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    /// Integer: i<number>e
    Integer(i64),
    /// Byte string: <length>:<contents>
    String(Vec<u8>),
    /// List: l<values>e
    List(Vec<BencodeValue>),
    /// Dictionary: d<key-value pairs>e (keys kept in the order they appeared)
    Dict(BencodeDict),
}

impl BencodeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            BencodeValue::Integer(_) => "integer",
            BencodeValue::String(_) => "byte string",
            BencodeValue::List(_) => "list",
            BencodeValue::Dict(_) => "dictionary",
        }
    }

    fn mismatch(&self, expected: &'static str) -> BittorrentError {
        BittorrentError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self {
            BencodeValue::Integer(i) => Ok(*i),
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            BencodeValue::String(s) => Ok(s),
            other => Err(other.mismatch("byte string")),
        }
    }

    /// Byte string that must also be valid UTF-8
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.as_bytes()?).map_err(|_| BittorrentError::TypeMismatch {
            expected: "UTF-8 string",
            found: "binary byte string",
        })
    }

    #[cfg(test)]
    pub fn as_list(&self) -> Result<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Ok(l),
            other => Err(other.mismatch("list")),
        }
    }

    pub fn as_dict(&self) -> Result<&BencodeDict> {
        match self {
            BencodeValue::Dict(d) => Ok(d),
            other => Err(other.mismatch("dictionary")),
        }
    }
}

impl From<&str> for BencodeValue {
    fn from(s: &str) -> Self {
        BencodeValue::String(s.as_bytes().to_vec())
    }
}

impl From<i64> for BencodeValue {
    fn from(i: i64) -> Self {
        BencodeValue::Integer(i)
    }
}

/// JSON-style rendering: byte strings become (lossy) text, dictionaries keep
/// their key order.
impl Serialize for BencodeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            BencodeValue::Integer(i) => serializer.serialize_i64(*i),
            BencodeValue::String(s) => serializer.serialize_str(&String::from_utf8_lossy(s)),
            BencodeValue::List(list) => {
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            BencodeValue::Dict(dict) => {
                let mut map = serializer.serialize_map(Some(dict.len()))?;
                for (key, value) in dict.iter() {
                    map.serialize_entry(&String::from_utf8_lossy(key), value)?;
                }
                map.end()
            }
        }
    }
}
