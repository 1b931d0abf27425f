/// Legacy per-layer calibration statistics: one min/max pair per
/// channel. Kept for backward compatibility only; has no bearing on
/// inference correctness.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerStats {
    min: Vec<f32>,
    max: Vec<f32>,
}

impl LayerStats {
    /// `min` and `max` must have the same length.
    pub fn new(min: Vec<f32>, max: Vec<f32>) -> Option<Self> {
        if min.len() != max.len() {
            return None;
        }
        Some(Self { min, max })
    }

    pub fn min(&self) -> &[f32] {
        &self.min
    }

    pub fn max(&self) -> &[f32] {
        &self.max
    }
}
