use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::{Layer, NetworkDescriptor, PortRef, SerializeError, Shape, ShapeError};

/// The engine collaborator behind a [`NetworkDescriptor`]: shape
/// inference and serialization. Loading lives on the engine itself
/// since it produces the descriptor in the first place.
pub trait GraphOps: Send + Sync {
    /// Resolve the shape of every layer output port, given the shapes
    /// of all input (Parameter) layers. Returns the complete map or
    /// rejects the request; it must not observe partial state.
    fn infer_shapes(
        &self,
        layers: &BTreeMap<String, Layer>,
        input_shapes: &HashMap<String, Shape>,
    ) -> Result<HashMap<PortRef, Shape>, ShapeError>;

    /// Write the current network (topology and weights) back out.
    fn write(
        &self,
        net: &NetworkDescriptor,
        topology: &Path,
        weights: &Path,
    ) -> Result<(), SerializeError>;
}
