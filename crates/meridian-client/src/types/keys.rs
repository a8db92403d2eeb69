//! Primary keys and key sets.
//!
//! A [`KeySet`] names the rows a read or a row delete touches. The client
//! never reorders or deduplicates keys; they reach the server exactly as the
//! caller built them.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::value::Value;

/// A primary key.
///
/// Holds one value per key column, in key-column order. Single-column keys
/// hold one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Key(Vec<Value>);

impl Key {
    /// Creates a composite key from its column values.
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    /// Returns the key column values.
    pub fn parts(&self) -> &[Value] {
        &self.0
    }
}

impl From<Value> for Key {
    fn from(v: Value) -> Self {
        Self(vec![v])
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self(vec![Value::from(v)])
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Self(vec![Value::from(v)])
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self(vec![Value::from(v)])
    }
}

impl From<Vec<Value>> for Key {
    fn from(parts: Vec<Value>) -> Self {
        Self(parts)
    }
}

/// One end of a [`KeyRange`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyBound {
    /// The bound key is included.
    Closed(Key),
    /// The bound key is excluded.
    Open(Key),
}

/// A contiguous range of primary keys.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    /// Lower bound.
    pub start: KeyBound,
    /// Upper bound.
    pub end: KeyBound,
}

impl KeyRange {
    /// Creates a range from explicit bounds.
    pub fn new(start: KeyBound, end: KeyBound) -> Self {
        Self { start, end }
    }

    /// `[start, end]`
    pub fn closed(start: impl Into<Key>, end: impl Into<Key>) -> Self {
        Self::new(KeyBound::Closed(start.into()), KeyBound::Closed(end.into()))
    }

    /// `[start, end)`
    pub fn closed_open(start: impl Into<Key>, end: impl Into<Key>) -> Self {
        Self::new(KeyBound::Closed(start.into()), KeyBound::Open(end.into()))
    }
}

impl Serialize for KeyRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match &self.start {
            KeyBound::Closed(k) => map.serialize_entry("startClosed", k)?,
            KeyBound::Open(k) => map.serialize_entry("startOpen", k)?,
        }
        match &self.end {
            KeyBound::Closed(k) => map.serialize_entry("endClosed", k)?,
            KeyBound::Open(k) => map.serialize_entry("endOpen", k)?,
        }
        map.end()
    }
}

/// The set of rows an operation applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySet {
    /// A single row.
    Key(Key),
    /// An ordered list of rows.
    Keys(Vec<Key>),
    /// Rows inside the given ranges.
    Ranges(Vec<KeyRange>),
    /// Every row of the table.
    All,
}

impl Serialize for KeySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            KeySet::Key(key) => map.serialize_entry("keys", std::slice::from_ref(key))?,
            KeySet::Keys(keys) => map.serialize_entry("keys", keys)?,
            KeySet::Ranges(ranges) => map.serialize_entry("ranges", ranges)?,
            KeySet::All => map.serialize_entry("all", &true)?,
        }
        map.end()
    }
}

impl From<Key> for KeySet {
    fn from(key: Key) -> Self {
        KeySet::Key(key)
    }
}

impl From<Vec<Key>> for KeySet {
    fn from(keys: Vec<Key>) -> Self {
        KeySet::Keys(keys)
    }
}

impl From<KeyRange> for KeySet {
    fn from(range: KeyRange) -> Self {
        KeySet::Ranges(vec![range])
    }
}

impl From<&str> for KeySet {
    fn from(key: &str) -> Self {
        KeySet::Key(Key::from(key))
    }
}
