use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Once};

use tracing::{debug, warn};

use crate::{
    AddOutputsError, DataEndpoint, GraphOps, Layer, LayerStats, LoadError, OutputTarget, PortRef,
    Precision, ReshapeError, SerializeError, Shape, ValidationError,
};

static STATS_DEPRECATION: Once = Once::new();

fn warn_stats_deprecated() {
    STATS_DEPRECATION.call_once(|| {
        warn!(
            api = "stats",
            "per-layer calibration statistics are deprecated and kept for backward \
             compatibility only"
        );
    });
}

/// In-memory representation of a loaded network: named layers, named
/// input/output endpoints, and the resolved shape of every layer
/// output port.
///
/// All mutating operations are all-or-nothing: on error the descriptor
/// is left in its prior state. Not designed for concurrent mutation;
/// callers serialize writers externally.
pub struct NetworkDescriptor {
    name: String,
    inputs: BTreeMap<String, DataEndpoint>,
    outputs: BTreeMap<String, DataEndpoint>,
    layers: BTreeMap<String, Layer>,
    stats: BTreeMap<String, LayerStats>,
    /// Resolved shape of every layer output port, recomputed wholesale
    /// on every successful reshape.
    shapes: HashMap<PortRef, Shape>,
    batch: usize,
    ops: Arc<dyn GraphOps>,
}

impl std::fmt::Debug for NetworkDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkDescriptor")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("layers", &self.layers.keys())
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

impl NetworkDescriptor {
    /// Assemble a descriptor from loaded parts. Runs shape inference
    /// once to resolve every port and populate endpoint metadata.
    /// Intended for engine (loader) implementations.
    pub fn from_parts(
        name: impl Into<String>,
        layers: BTreeMap<String, Layer>,
        input_shapes: HashMap<String, Shape>,
        declared_outputs: &[PortRef],
        ops: Arc<dyn GraphOps>,
    ) -> Result<Self, LoadError> {
        let shapes = ops.infer_shapes(&layers, &input_shapes)?;

        let mut inputs = BTreeMap::new();
        for (layer, shape) in &input_shapes {
            if !shape.is_valid() {
                return Err(LoadError::MalformedTopology(format!(
                    "input layer {layer:?} has invalid shape {shape}"
                )));
            }
            let origin = PortRef::new(layer.clone(), 0);
            inputs.insert(
                layer.clone(),
                DataEndpoint::new(origin, shape.clone(), Precision::Fp32),
            );
        }

        let batch = shared_batch(&inputs).map_err(LoadError::MalformedTopology)?;

        let mut outputs = BTreeMap::new();
        for port in declared_outputs {
            let shape = shapes.get(port).ok_or_else(|| {
                LoadError::MalformedTopology(format!("declared output {port} does not exist"))
            })?;
            outputs.insert(
                port.endpoint_name(),
                DataEndpoint::new(port.clone(), shape.clone(), Precision::Fp32),
            );
        }

        Ok(Self {
            name: name.into(),
            inputs,
            outputs,
            layers,
            stats: BTreeMap::new(),
            shapes,
            batch,
            ops,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn batch_size(&self) -> usize {
        self.batch
    }

    pub fn inputs(&self) -> &BTreeMap<String, DataEndpoint> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, DataEndpoint> {
        &self.outputs
    }

    pub fn layers(&self) -> &BTreeMap<String, Layer> {
        &self.layers
    }

    /// Mutable access to one input endpoint. Endpoints are owned by
    /// value, so mutating one never affects another.
    pub fn input_mut(&mut self, name: &str) -> Option<&mut DataEndpoint> {
        self.inputs.get_mut(name)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut DataEndpoint> {
        self.outputs.get_mut(name)
    }

    /// Resolved shape of an arbitrary layer output port.
    pub fn port_shape(&self, port: &PortRef) -> Option<&Shape> {
        self.shapes.get(port)
    }

    pub fn set_input_precision(
        &mut self,
        name: &str,
        precision: &str,
    ) -> Result<(), ValidationError> {
        let parsed: Precision = precision.parse()?;
        let ep = self
            .inputs
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownInput(name.to_string()))?;
        ep.precision = parsed;
        Ok(())
    }

    pub fn set_output_precision(
        &mut self,
        name: &str,
        precision: &str,
    ) -> Result<(), ValidationError> {
        let parsed: Precision = precision.parse()?;
        let ep = self
            .outputs
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownOutput(name.to_string()))?;
        ep.precision = parsed;
        Ok(())
    }

    pub fn set_input_layout(&mut self, name: &str, layout: &str) -> Result<(), ValidationError> {
        let parsed: crate::Layout = layout.parse()?;
        let ep = self
            .inputs
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownInput(name.to_string()))?;
        ep.layout = parsed;
        Ok(())
    }

    /// Replace the shapes of the named inputs and re-run shape
    /// inference so every dependent shape stays consistent. Each call
    /// fully overwrites prior shape state; unnamed inputs keep their
    /// current shape. Commits nothing on failure.
    pub fn reshape(&mut self, requests: &HashMap<String, Shape>) -> Result<(), ReshapeError> {
        let mut input_shapes: HashMap<String, Shape> = self
            .inputs
            .iter()
            .map(|(n, e)| (n.clone(), e.shape.clone()))
            .collect();

        for (name, shape) in requests {
            if !input_shapes.contains_key(name) {
                return Err(ReshapeError::UnknownInput(name.clone()));
            }
            if !shape.is_valid() {
                return Err(ReshapeError::InvalidShape {
                    input: name.clone(),
                    shape: shape.clone(),
                });
            }
            input_shapes.insert(name.clone(), shape.clone());
        }

        let batch = match input_shapes.values().next() {
            Some(first) => first.batch(),
            None => self.batch,
        };
        if let Some(odd) = input_shapes.values().find(|s| s.batch() != batch) {
            return Err(ReshapeError::BatchMismatch(format!(
                "saw leading dimensions {batch} and {}",
                odd.batch()
            )));
        }

        let shapes = self.ops.infer_shapes(&self.layers, &input_shapes)?;
        debug!(network = %self.name, batch, "reshape resolved {} ports", shapes.len());

        // Point of no return: everything below is infallible.
        for (name, ep) in self.inputs.iter_mut() {
            ep.shape = input_shapes
                .remove(name)
                .unwrap_or_else(|| ep.shape.clone());
        }
        for ep in self.outputs.values_mut() {
            if let Some(shape) = shapes.get(&ep.origin) {
                ep.shape = shape.clone();
            }
        }
        self.shapes = shapes;
        self.batch = batch;
        Ok(())
    }

    /// Reshape that only changes the leading dimension of every input,
    /// holding all other dimensions fixed.
    pub fn set_batch_size(&mut self, n: usize) -> Result<(), ReshapeError> {
        if n == 0 {
            return Err(ReshapeError::InvalidBatchSize(0));
        }
        let requests: HashMap<String, Shape> = self
            .inputs
            .iter()
            .map(|(name, ep)| {
                let mut dims = ep.shape.0.clone();
                dims[0] = n;
                (name.clone(), Shape(dims))
            })
            .collect();
        self.reshape(&requests)
    }

    /// Expose one more graph point as a network output. Adding an
    /// already-present output is a no-op.
    pub fn add_output(&mut self, target: impl Into<OutputTarget>) -> Result<(), AddOutputsError> {
        let OutputTarget(port) = target.into();
        let shape = self.resolve_target(&port)?;
        let name = port.endpoint_name();
        if self.outputs.contains_key(&name) {
            return Ok(());
        }
        self.outputs
            .insert(name, DataEndpoint::new(port, shape, Precision::Fp32));
        Ok(())
    }

    /// [`add_output`](Self::add_output) over a sequence of targets,
    /// mixing bare names and `(name, port)` pairs. Validates every
    /// target before inserting any.
    pub fn add_outputs<T: Into<OutputTarget>>(
        &mut self,
        targets: impl IntoIterator<Item = T>,
    ) -> Result<(), AddOutputsError> {
        let mut resolved = Vec::new();
        for target in targets {
            let OutputTarget(port) = target.into();
            let shape = self.resolve_target(&port)?;
            resolved.push((port, shape));
        }
        for (port, shape) in resolved {
            let name = port.endpoint_name();
            if !self.outputs.contains_key(&name) {
                self.outputs
                    .insert(name, DataEndpoint::new(port, shape, Precision::Fp32));
            }
        }
        Ok(())
    }

    fn resolve_target(&self, port: &PortRef) -> Result<Shape, AddOutputsError> {
        if !self.layers.contains_key(&port.layer) {
            return Err(AddOutputsError::UnknownLayer(port.layer.clone()));
        }
        self.shapes
            .get(port)
            .cloned()
            .ok_or_else(|| AddOutputsError::UnknownPort {
                layer: port.layer.clone(),
                port: port.port,
            })
    }

    /// Write the current (possibly reshaped and output-extended)
    /// network back out through the engine collaborator.
    pub fn serialize(&self, topology: &Path, weights: &Path) -> Result<(), SerializeError> {
        self.ops.write(self, topology, weights)
    }

    /// Deprecated calibration side channel; see [`LayerStats`].
    pub fn stats(&self) -> &BTreeMap<String, LayerStats> {
        warn_stats_deprecated();
        &self.stats
    }

    /// Merge per-layer statistics, last write per key wins.
    pub fn update_stats(&mut self, update: impl IntoIterator<Item = (String, LayerStats)>) {
        warn_stats_deprecated();
        self.stats.extend(update);
    }
}

fn shared_batch(inputs: &BTreeMap<String, DataEndpoint>) -> Result<usize, String> {
    let mut iter = inputs.values().map(|e| e.shape.batch());
    let Some(batch) = iter.next() else {
        return Ok(1);
    };
    if let Some(odd) = iter.find(|&b| b != batch) {
        return Err(format!(
            "inputs disagree on the batch dimension: {batch} vs {odd}"
        ));
    }
    Ok(batch)
}
