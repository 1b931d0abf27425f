//! Programmatic topology construction. The builder assembles layers
//! and declared outputs, then runs shape inference to produce a live
//! [`NetworkDescriptor`]. Also the fixture generator for tests: build,
//! serialize, reload.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use netdesc_core::{
    AttrValue, Blob, Layer, LoadError, NetworkDescriptor, PortRef, Shape,
};

use crate::ReferenceEngine;

/// Fluent wrapper over [`Layer`] for builder use.
pub struct LayerSpec {
    inner: Layer,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            inner: Layer::new(name, kind),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.inner.attrs.insert(key.into(), value.into());
        self
    }

    /// Connect to the given producer's port 0.
    pub fn from(self, layer: impl Into<String>) -> Self {
        self.from_port(layer, 0)
    }

    pub fn from_port(mut self, layer: impl Into<String>, port: usize) -> Self {
        self.inner.inputs.push(PortRef::new(layer, port));
        self
    }

    pub fn blob(mut self, name: impl Into<String>, blob: Blob) -> Self {
        self.inner.blobs.insert(name.into(), blob);
        self
    }
}

#[derive(Default)]
pub struct NetworkBuilder {
    name: String,
    layers: BTreeMap<String, Layer>,
    outputs: Vec<PortRef>,
}

impl NetworkBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declare one network input with its initial shape.
    pub fn parameter(self, name: &str, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let dims: Vec<i64> = shape.dims().iter().map(|&d| d as i64).collect();
        self.layer(LayerSpec::new(name, "Parameter").attr("shape", dims))
    }

    pub fn layer(mut self, spec: LayerSpec) -> Self {
        self.layers.insert(spec.inner.name.clone(), spec.inner);
        self
    }

    /// Declare a network output at the named layer's port 0.
    pub fn output(mut self, layer: &str) -> Self {
        self.outputs.push(PortRef::new(layer, 0));
        self
    }

    /// Resolve shapes and produce a live descriptor backed by the
    /// reference engine.
    pub fn build(self) -> Result<NetworkDescriptor, LoadError> {
        let input_shapes = parameter_shapes(&self.layers)?;
        NetworkDescriptor::from_parts(
            self.name,
            self.layers,
            input_shapes,
            &self.outputs,
            Arc::new(ReferenceEngine),
        )
    }
}

/// Collect the stored shape of every Parameter layer.
pub(crate) fn parameter_shapes(
    layers: &BTreeMap<String, Layer>,
) -> Result<HashMap<String, Shape>, LoadError> {
    let mut shapes = HashMap::new();
    for layer in layers.values() {
        if layer.kind != "Parameter" {
            continue;
        }
        let dims = layer.ints_attr("shape").ok_or_else(|| {
            LoadError::MalformedTopology(format!(
                "input layer {:?} carries no shape attribute",
                layer.name
            ))
        })?;
        if dims.is_empty() || dims.iter().any(|&d| d < 1) {
            return Err(LoadError::MalformedTopology(format!(
                "input layer {:?} has invalid shape {dims:?}",
                layer.name
            )));
        }
        let shape = Shape::from(dims.iter().map(|&d| d as usize).collect::<Vec<_>>());
        shapes.insert(layer.name.clone(), shape);
    }
    Ok(shapes)
}
