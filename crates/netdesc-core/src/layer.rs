use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{PortRef, Shape};

/// Scalar or list attribute attached to a layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Ints(_) => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            AttrValue::Int(_) => None,
            AttrValue::Ints(v) => Some(v),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Ints(v)
    }
}

/// A named constant buffer attached to a layer (weights, biases).
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pub shape: Shape,
    pub data: Bytes,
}

impl Blob {
    pub fn new(shape: impl Into<Shape>, data: Bytes) -> Self {
        Self {
            shape: shape.into(),
            data,
        }
    }
}

/// A named computational node. Connectivity is expressed through
/// `inputs`: each entry names the producing layer output port.
#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub kind: String,
    pub attrs: BTreeMap<String, AttrValue>,
    pub inputs: Vec<PortRef>,
    pub blobs: BTreeMap<String, Blob>,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            attrs: BTreeMap::new(),
            inputs: Vec::new(),
            blobs: BTreeMap::new(),
        }
    }

    pub fn int_attr(&self, key: &str) -> Option<i64> {
        self.attrs.get(key).and_then(AttrValue::as_int)
    }

    pub fn ints_attr(&self, key: &str) -> Option<&[i64]> {
        self.attrs.get(key).and_then(AttrValue::as_ints)
    }
}
