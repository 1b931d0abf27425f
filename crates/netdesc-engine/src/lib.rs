pub mod builder;
pub mod format;
pub mod infer;

pub use builder::*;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Once};

use bytes::Bytes;
use netdesc_core::{
    GraphOps, Layer, LoadError, ModelSource, NetworkDescriptor, PortRef, SerializeError, Shape,
    ShapeError,
};
use tracing::{debug, warn};

/// Concrete engine collaborator: reads and writes the private binary
/// network format and provides shape inference over the supported op
/// set.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    /// Load a network from a topology and a weights source, each given
    /// by path or by in-memory buffer.
    pub fn read_network(
        &self,
        model: &ModelSource,
        weights: &ModelSource,
    ) -> Result<NetworkDescriptor, LoadError> {
        let topo_bytes = read_source(model, SourceKind::Model)?;
        let weight_bytes = read_source(weights, SourceKind::Weights)?;

        let topology = format::read_topology(&topo_bytes)?;
        let records = format::read_weights(&weight_bytes)?;

        let format::Topology {
            name,
            mut layers,
            outputs,
        } = topology;
        format::attach_blobs(&mut layers, records)?;

        let input_shapes = builder::parameter_shapes(&layers)?;
        debug!(
            network = %name,
            layers = layers.len(),
            inputs = input_shapes.len(),
            "network loaded"
        );
        NetworkDescriptor::from_parts(name, layers, input_shapes, &outputs, Arc::new(*self))
    }
}

impl GraphOps for ReferenceEngine {
    fn infer_shapes(
        &self,
        layers: &BTreeMap<String, Layer>,
        input_shapes: &HashMap<String, Shape>,
    ) -> Result<HashMap<PortRef, Shape>, ShapeError> {
        infer::infer_shapes(layers, input_shapes)
    }

    fn write(
        &self,
        net: &NetworkDescriptor,
        topology: &Path,
        weights: &Path,
    ) -> Result<(), SerializeError> {
        std::fs::write(topology, format::write_topology(net)).map_err(|source| {
            SerializeError::Topology {
                path: topology.to_path_buf(),
                source,
            }
        })?;
        std::fs::write(weights, format::write_weights(net)).map_err(|source| {
            SerializeError::Weights {
                path: weights.to_path_buf(),
                source,
            }
        })
    }
}

enum SourceKind {
    Model,
    Weights,
}

fn read_source(source: &ModelSource, kind: SourceKind) -> Result<Bytes, LoadError> {
    match source {
        ModelSource::Path(path) => {
            if !path.is_file() {
                return Err(match kind {
                    SourceKind::Model => LoadError::ModelPath(path.clone()),
                    SourceKind::Weights => LoadError::WeightsPath(path.clone()),
                });
            }
            Ok(std::fs::read(path)?.into())
        }
        ModelSource::Buffer(buf) => Ok(buf.clone()),
    }
}

/// Convenience constructor kept for callers of the old eager-loading
/// API. Forwards to [`ReferenceEngine::read_network`].
#[deprecated(note = "use ReferenceEngine::read_network instead")]
pub fn load_network(
    model: impl Into<ModelSource>,
    weights: impl Into<ModelSource>,
) -> Result<NetworkDescriptor, LoadError> {
    static NOTICE: Once = Once::new();
    NOTICE.call_once(|| {
        warn!(
            api = "load_network",
            "loading a network through the convenience constructor is deprecated; \
             use ReferenceEngine::read_network"
        );
    });
    ReferenceEngine.read_network(&model.into(), &weights.into())
}
