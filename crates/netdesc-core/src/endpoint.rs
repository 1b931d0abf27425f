use std::str::FromStr;

use crate::{PortRef, Shape, ValidationError};

/// Element precision of an endpoint. Closed set; anything outside it is
/// rejected at the parsing boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    Fp32,
    Fp16,
    Bf16,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    Bool,
}

impl Precision {
    pub const ALL: &'static [Precision] = &[
        Precision::Fp32,
        Precision::Fp16,
        Precision::Bf16,
        Precision::I8,
        Precision::I16,
        Precision::I32,
        Precision::I64,
        Precision::U8,
        Precision::U16,
        Precision::Bool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp32 => "FP32",
            Precision::Fp16 => "FP16",
            Precision::Bf16 => "BF16",
            Precision::I8 => "I8",
            Precision::I16 => "I16",
            Precision::I32 => "I32",
            Precision::I64 => "I64",
            Precision::U8 => "U8",
            Precision::U16 => "U16",
            Precision::Bool => "BOOL",
        }
    }

    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.as_str()).collect()
    }
}

impl FromStr for Precision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ValidationError::UnsupportedPrecision {
                value: s.to_string(),
                supported: Self::supported_names(),
            })
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimension ordering of an endpoint. Closed set, same validation
/// pattern as [`Precision`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layout {
    Nchw,
    Nhwc,
    Ncdhw,
    Ndhwc,
    Chw,
    Nc,
    Cn,
    C,
}

impl Layout {
    pub const ALL: &'static [Layout] = &[
        Layout::Nchw,
        Layout::Nhwc,
        Layout::Ncdhw,
        Layout::Ndhwc,
        Layout::Chw,
        Layout::Nc,
        Layout::Cn,
        Layout::C,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Nchw => "NCHW",
            Layout::Nhwc => "NHWC",
            Layout::Ncdhw => "NCDHW",
            Layout::Ndhwc => "NDHWC",
            Layout::Chw => "CHW",
            Layout::Nc => "NC",
            Layout::Cn => "CN",
            Layout::C => "C",
        }
    }

    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|l| l.as_str()).collect()
    }

    /// Conventional layout for a freshly resolved shape of the given rank.
    pub fn for_rank(rank: usize) -> Layout {
        match rank {
            1 => Layout::C,
            3 => Layout::Chw,
            4 => Layout::Nchw,
            5 => Layout::Ncdhw,
            _ => Layout::Nc,
        }
    }
}

impl FromStr for Layout {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| ValidationError::UnsupportedLayout {
                value: s.to_string(),
                supported: Self::supported_names(),
            })
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named tensor attachment point (input or output) with its
/// metadata. Endpoints are owned by value inside the descriptor's input
/// or output map, so two entries never share storage.
#[derive(Clone, Debug, PartialEq)]
pub struct DataEndpoint {
    pub name: String,
    pub shape: Shape,
    pub layout: Layout,
    pub precision: Precision,
    /// The layer output port this endpoint is attached to.
    pub origin: PortRef,
}

impl DataEndpoint {
    pub fn new(origin: PortRef, shape: Shape, precision: Precision) -> Self {
        let layout = Layout::for_rank(shape.rank());
        Self {
            name: origin.endpoint_name(),
            shape,
            layout,
            precision,
            origin,
        }
    }
}

/// A graph point to expose as an extra network output. A bare layer
/// name means port 0.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutputTarget(pub PortRef);

impl From<&str> for OutputTarget {
    fn from(layer: &str) -> Self {
        Self(PortRef::new(layer, 0))
    }
}

impl From<String> for OutputTarget {
    fn from(layer: String) -> Self {
        Self(PortRef::new(layer, 0))
    }
}

impl From<(&str, usize)> for OutputTarget {
    fn from((layer, port): (&str, usize)) -> Self {
        Self(PortRef::new(layer, port))
    }
}

impl From<(String, usize)> for OutputTarget {
    fn from((layer, port): (String, usize)) -> Self {
        Self(PortRef::new(layer, port))
    }
}

impl From<PortRef> for OutputTarget {
    fn from(port: PortRef) -> Self {
        Self(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_round_trips_through_str() {
        for p in Precision::ALL {
            assert_eq!(p.as_str().parse::<Precision>().unwrap(), *p);
        }
    }

    #[test]
    fn unsupported_precision_lists_the_supported_set() {
        let err = "BLA".parse::<Precision>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unsupported precision BLA!"), "{msg}");
        assert!(msg.contains("FP32"), "{msg}");
        assert!(msg.contains("I8"), "{msg}");
    }

    #[test]
    fn unsupported_layout_lists_the_supported_set() {
        let err = "BLA".parse::<Layout>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unsupported layout BLA!"), "{msg}");
        assert!(msg.contains("NCHW"), "{msg}");
    }

    #[test]
    fn default_layout_tracks_rank() {
        assert_eq!(Layout::for_rank(4), Layout::Nchw);
        assert_eq!(Layout::for_rank(2), Layout::Nc);
        assert_eq!(Layout::for_rank(1), Layout::C);
    }

    #[test]
    fn output_target_forms() {
        let a: OutputTarget = "28/Reshape".into();
        let b: OutputTarget = ("28/Reshape", 0).into();
        assert_eq!(a, b);
        let c: OutputTarget = ("split", 2).into();
        assert_eq!(c.0.endpoint_name(), "split.2");
    }
}
