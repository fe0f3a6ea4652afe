//! Property dictionaries exchanged with elements.
//!
//! Reading goes through [`PropertyAccess`], which remembers every key an
//! element looked at. Keys nobody consumed are an error, so a misspelt
//! property never disappears silently.

use crate::PropertyError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    DoubleArray(Vec<f64>),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "a boolean",
            PropertyValue::Int(_) => "an integer",
            PropertyValue::Double(_) => "a double",
            PropertyValue::Str(_) => "a string",
            PropertyValue::DoubleArray(_) => "an array of doubles",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Str(v) => write!(f, "{v:?}"),
            PropertyValue::DoubleArray(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        PropertyValue::DoubleArray(v)
    }
}

/// Property dictionary, ordered by key.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Build a [`PropertyMap`] from `(key, value)` pairs.
pub fn properties<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Read access to a property dictionary that tracks consumed keys.
#[derive(Debug)]
pub struct PropertyAccess<'a> {
    map: &'a PropertyMap,
    consumed: BTreeSet<&'a str>,
}

impl<'a> PropertyAccess<'a> {
    pub fn new(map: &'a PropertyMap) -> Self {
        Self {
            map,
            consumed: BTreeSet::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Every key in the dictionary, consumed or not.
    pub fn keys(&self) -> impl Iterator<Item = &'a str> {
        self.map.keys().map(String::as_str)
    }

    /// Fetch a raw value and mark it consumed.
    pub fn take(&mut self, key: &str) -> Option<&'a PropertyValue> {
        let (key, value) = self.map.get_key_value(key)?;
        self.consumed.insert(key.as_str());
        Some(value)
    }

    /// Mark a key consumed without reading it.
    pub fn mark_consumed(&mut self, key: &str) {
        if let Some((key, _)) = self.map.get_key_value(key) {
            self.consumed.insert(key.as_str());
        }
    }

    pub fn bool(&mut self, key: &str) -> Result<Option<bool>, PropertyError> {
        match self.take(key) {
            None => Ok(None),
            Some(PropertyValue::Bool(v)) => Ok(Some(*v)),
            Some(_) => Err(mismatch(key, "a boolean")),
        }
    }

    pub fn int(&mut self, key: &str) -> Result<Option<i64>, PropertyError> {
        match self.take(key) {
            None => Ok(None),
            Some(PropertyValue::Int(v)) => Ok(Some(*v)),
            Some(_) => Err(mismatch(key, "an integer")),
        }
    }

    /// Doubles also accept integer values.
    pub fn double(&mut self, key: &str) -> Result<Option<f64>, PropertyError> {
        match self.take(key) {
            None => Ok(None),
            Some(PropertyValue::Double(v)) => Ok(Some(*v)),
            Some(PropertyValue::Int(v)) => Ok(Some(*v as f64)),
            Some(_) => Err(mismatch(key, "a double")),
        }
    }

    pub fn string(&mut self, key: &str) -> Result<Option<&'a str>, PropertyError> {
        match self.take(key) {
            None => Ok(None),
            Some(PropertyValue::Str(v)) => Ok(Some(v.as_str())),
            Some(_) => Err(mismatch(key, "a string")),
        }
    }

    pub fn double_array(&mut self, key: &str) -> Result<Option<&'a [f64]>, PropertyError> {
        match self.take(key) {
            None => Ok(None),
            Some(PropertyValue::DoubleArray(v)) => Ok(Some(v.as_slice())),
            Some(_) => Err(mismatch(key, "an array of doubles")),
        }
    }

    /// Keys present in the dictionary that nobody read, in key order.
    pub fn unconsumed(&self) -> Vec<String> {
        self.map
            .keys()
            .filter(|k| !self.consumed.contains(k.as_str()))
            .cloned()
            .collect()
    }

    /// Fail with [`PropertyError::UnknownProperty`] if any key was left unread.
    pub fn finish(&self) -> Result<(), PropertyError> {
        let unconsumed = self.unconsumed();
        if unconsumed.is_empty() {
            Ok(())
        } else {
            Err(PropertyError::UnknownProperty(unconsumed))
        }
    }
}

fn mismatch(key: &str, expected: &'static str) -> PropertyError {
    PropertyError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}
