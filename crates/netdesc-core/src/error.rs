use std::path::PathBuf;

use thiserror::Error;

fn join(list: &Vec<&'static str>) -> String {
    list.join(", ")
}

/// Reading a serialized network failed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Path to the model {0} doesn't exist or it's a directory")]
    ModelPath(PathBuf),
    #[error("Path to the weights {0} doesn't exist or it's a directory")]
    WeightsPath(PathBuf),
    #[error("malformed topology: {0}")]
    MalformedTopology(String),
    #[error("malformed weights: {0}")]
    MalformedWeights(String),
    #[error("topology is inconsistent: {0}")]
    Inconsistent(#[from] ShapeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An endpoint setter was given a value outside the supported set, or
/// an endpoint name that does not exist.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Unsupported precision {value}! List of supported precisions: {}", join(.supported))]
    UnsupportedPrecision {
        value: String,
        supported: Vec<&'static str>,
    },
    #[error("Unsupported layout {value}! List of supported layouts: {}", join(.supported))]
    UnsupportedLayout {
        value: String,
        supported: Vec<&'static str>,
    },
    #[error("network has no input named {0:?}")]
    UnknownInput(String),
    #[error("network has no output named {0:?}")]
    UnknownOutput(String),
}

/// The shape-inference collaborator rejected a shape request.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("layer {layer:?} has unsupported kind {kind:?}")]
    UnsupportedOp { layer: String, kind: String },
    #[error("layer {layer:?} is missing required attribute {attr:?}")]
    MissingAttr { layer: String, attr: &'static str },
    #[error("layer {layer:?} references unknown producer {producer}")]
    MissingProducer { layer: String, producer: crate::PortRef },
    #[error("layer {layer:?} expects {expected} input(s), has {actual}")]
    ArityMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error("no shape requested or stored for input layer {0:?}")]
    UnresolvedInput(String),
    #[error("cycle detected at layer {0:?}")]
    Cycle(String),
    #[error("incompatible shape at layer {layer:?}: {reason}")]
    Incompatible { layer: String, reason: String },
}

/// A reshape request could not be applied. The descriptor is left in
/// its prior state.
#[derive(Debug, Error)]
pub enum ReshapeError {
    #[error("network has no input named {0:?}")]
    UnknownInput(String),
    #[error("requested shape {shape} for input {input:?} is invalid")]
    InvalidShape { input: String, shape: crate::Shape },
    #[error("batch size must be positive, got {0}")]
    InvalidBatchSize(usize),
    #[error("inputs disagree on the batch dimension: {0}")]
    BatchMismatch(String),
    #[error(transparent)]
    Inference(#[from] ShapeError),
}

/// Extending the output set failed.
#[derive(Debug, Error)]
pub enum AddOutputsError {
    #[error("network has no layer named {0:?}")]
    UnknownLayer(String),
    #[error("layer {layer:?} has no output port {port}")]
    UnknownPort { layer: String, port: usize },
}

/// Writing the network back out failed.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to write topology to {path}: {source}")]
    Topology {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write weights to {path}: {source}")]
    Weights {
        path: PathBuf,
        source: std::io::Error,
    },
}
