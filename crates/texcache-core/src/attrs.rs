//! Typed attribute storage for image metadata.
//!
//! Image files carry a bag of named metadata (descriptions, wrap modes,
//! camera matrices, ...). [`Attrs`] maps attribute names to typed
//! [`AttrValue`]s and provides the lookups the rest of the system needs.
//!
//! # Example
//!
//! ```rust
//! use texcache_core::{Attrs, AttrValue};
//!
//! let mut attrs = Attrs::new();
//! attrs.set("ImageDescription", "SHA-1=0123456789abcdef0123456789abcdef01234567");
//! attrs.set("ColorSpace", "linear");
//! attrs.set("FramesPerSecond", 24);
//!
//! assert_eq!(attrs.get_int("FramesPerSecond"), Some(24));
//! // Integer attributes widen to float on request.
//! assert_eq!(attrs.get_float("FramesPerSecond"), Some(24.0));
//! ```

use std::collections::HashMap;

/// A single typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer value.
    Int(i32),
    /// Floating-point value.
    Float(f32),
    /// String value.
    Str(String),
    /// Integer array.
    IntList(Vec<i32>),
    /// Float array.
    FloatList(Vec<f32>),
    /// 4x4 matrix, row-major.
    Matrix([f32; 16]),
}

impl AttrValue {
    /// This value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// This value as a float. Integer values widen implicitly.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Int(v) => Some(*v as f32),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// This value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// This value as a float array. Integer arrays widen element-wise.
    pub fn as_float_list(&self) -> Option<Vec<f32>> {
        match self {
            Self::FloatList(v) => Some(v.clone()),
            Self::IntList(v) => Some(v.iter().map(|&i| i as f32).collect()),
            Self::Matrix(m) => Some(m.to_vec()),
            _ => None,
        }
    }

    /// This value as a 4x4 matrix. A 16-element float list qualifies.
    pub fn as_matrix(&self) -> Option<[f32; 16]> {
        match self {
            Self::Matrix(m) => Some(*m),
            Self::FloatList(v) if v.len() == 16 => {
                let mut m = [0.0f32; 16];
                m.copy_from_slice(v);
                Some(m)
            }
            _ => None,
        }
    }

    /// Number of scalar elements carried by this value.
    pub fn len(&self) -> usize {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Str(_) => 1,
            Self::IntList(v) => v.len(),
            Self::FloatList(v) => v.len(),
            Self::Matrix(_) => 16,
        }
    }

    /// Whether the value carries no elements (empty array).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<i32>> for AttrValue {
    fn from(v: Vec<i32>) -> Self {
        Self::IntList(v)
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(v: Vec<f32>) -> Self {
        Self::FloatList(v)
    }
}

impl From<[f32; 16]> for AttrValue {
    fn from(v: [f32; 16]) -> Self {
        Self::Matrix(v)
    }
}

/// Attribute container: name -> typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    map: HashMap<String, AttrValue>,
}

impl Attrs {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.map.insert(name.into(), value.into());
    }

    /// Looks up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.map.get(name)
    }

    /// Removes an attribute, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.map.remove(name)
    }

    /// Whether an attribute with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// String attribute lookup.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_str)
    }

    /// Integer attribute lookup.
    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(AttrValue::as_int)
    }

    /// Float attribute lookup (integers widen).
    pub fn get_float(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(AttrValue::as_float)
    }

    /// Matrix attribute lookup (16-float lists qualify).
    pub fn get_matrix(&self, name: &str) -> Option<[f32; 16]> {
        self.get(name).and_then(AttrValue::as_matrix)
    }

    /// Iterates over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes stored.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the container is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
