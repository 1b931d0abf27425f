use smallvec::SmallVec;

/// Dimensions of one tensor. Rank >= 1, every dim >= 1.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }

    /// Leading dimension, shared across all network inputs.
    pub fn batch(&self) -> usize {
        self.0.first().copied().unwrap_or(1)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// True when rank >= 1 and no dimension is zero.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|&d| d > 0)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims.into_iter().collect())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::from_slice(&dims)
    }
}

/// Names one output port of a layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub layer: String,
    pub port: usize,
}

impl PortRef {
    pub fn new(layer: impl Into<String>, port: usize) -> Self {
        Self {
            layer: layer.into(),
            port,
        }
    }

    /// Endpoint name for this port: the bare layer name for port 0,
    /// `layer.port` for the rest.
    pub fn endpoint_name(&self) -> String {
        if self.port == 0 {
            self.layer.clone()
        } else {
            format!("{}.{}", self.layer, self.port)
        }
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.layer, self.port)
    }
}
