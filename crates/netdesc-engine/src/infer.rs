//! Shape inference over the layer graph: memoized recursive resolution
//! from each layer back through its producers.
//!
//! Supported kinds and their rules:
//! - `Parameter`: shape comes from the request map.
//! - `Convolution`: `out_channels` attr, spatial `(in + 2p - k)/s + 1`.
//! - `Pooling`: channels carried through, same spatial rule.
//! - `ReLU` / `SoftMax`: passthrough.
//! - `Reshape`: `dims` attr; `0` copies the input dim, one `-1` is
//!   inferred from the remaining element count.
//! - `FullyConnected`: `[batch, out_size]`.

use std::collections::{BTreeMap, HashMap, HashSet};

use netdesc_core::{Layer, PortRef, Shape, ShapeError};

pub fn infer_shapes(
    layers: &BTreeMap<String, Layer>,
    input_shapes: &HashMap<String, Shape>,
) -> Result<HashMap<PortRef, Shape>, ShapeError> {
    let mut resolver = Resolver {
        layers,
        input_shapes,
        resolved: HashMap::new(),
        visiting: HashSet::new(),
    };
    for name in layers.keys() {
        resolver.resolve(name)?;
    }
    Ok(resolver.resolved)
}

struct Resolver<'a> {
    layers: &'a BTreeMap<String, Layer>,
    input_shapes: &'a HashMap<String, Shape>,
    resolved: HashMap<PortRef, Shape>,
    visiting: HashSet<String>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, name: &str) -> Result<Shape, ShapeError> {
        let key = PortRef::new(name, 0);
        if let Some(shape) = self.resolved.get(&key) {
            return Ok(shape.clone());
        }
        if !self.visiting.insert(name.to_string()) {
            return Err(ShapeError::Cycle(name.to_string()));
        }

        let layers = self.layers;
        let layer = layers
            .get(name)
            .expect("resolve is only called with known layer names");

        let shape = match layer.kind.as_str() {
            "Parameter" => {
                expect_arity(layer, 0)?;
                self.input_shapes
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ShapeError::UnresolvedInput(name.to_string()))?
            }
            "ReLU" | "SoftMax" => self.sole_input(layer)?,
            "Convolution" => {
                let input = self.sole_input(layer)?;
                let out_channels = int_attr(layer, "out_channels")?;
                windowed(layer, &input, Some(out_channels as usize))?
            }
            "Pooling" => {
                let input = self.sole_input(layer)?;
                windowed(layer, &input, None)?
            }
            "Reshape" => {
                let input = self.sole_input(layer)?;
                reshape_dims(layer, &input)?
            }
            "FullyConnected" => {
                let input = self.sole_input(layer)?;
                let out_size = int_attr(layer, "out_size")?;
                if out_size < 1 {
                    return Err(incompatible(layer, format!("out_size {out_size} < 1")));
                }
                Shape::from_slice(&[input.batch(), out_size as usize])
            }
            kind => {
                return Err(ShapeError::UnsupportedOp {
                    layer: name.to_string(),
                    kind: kind.to_string(),
                })
            }
        };

        if !shape.is_valid() {
            return Err(incompatible(layer, format!("resolved to {shape}")));
        }

        self.visiting.remove(name);
        self.resolved.insert(key, shape.clone());
        Ok(shape)
    }

    fn sole_input(&mut self, layer: &Layer) -> Result<Shape, ShapeError> {
        expect_arity(layer, 1)?;
        let producer = layer.inputs[0].clone();
        if !self.layers.contains_key(&producer.layer) || producer.port != 0 {
            return Err(ShapeError::MissingProducer {
                layer: layer.name.clone(),
                producer,
            });
        }
        self.resolve(&producer.layer)
    }
}

fn expect_arity(layer: &Layer, expected: usize) -> Result<(), ShapeError> {
    if layer.inputs.len() != expected {
        return Err(ShapeError::ArityMismatch {
            layer: layer.name.clone(),
            expected,
            actual: layer.inputs.len(),
        });
    }
    Ok(())
}

fn int_attr(layer: &Layer, attr: &'static str) -> Result<i64, ShapeError> {
    layer.int_attr(attr).ok_or_else(|| ShapeError::MissingAttr {
        layer: layer.name.clone(),
        attr,
    })
}

fn ints_attr<'a>(layer: &'a Layer, attr: &'static str) -> Result<&'a [i64], ShapeError> {
    layer
        .ints_attr(attr)
        .ok_or_else(|| ShapeError::MissingAttr {
            layer: layer.name.clone(),
            attr,
        })
}

fn incompatible(layer: &Layer, reason: String) -> ShapeError {
    ShapeError::Incompatible {
        layer: layer.name.clone(),
        reason,
    }
}

/// Sliding-window output shape for Convolution and Pooling:
/// `[N, C_out, (in + 2p - k)/s + 1, ...]`.
fn windowed(layer: &Layer, input: &Shape, out_channels: Option<usize>) -> Result<Shape, ShapeError> {
    if input.rank() < 3 {
        return Err(incompatible(
            layer,
            format!("needs a [N,C,spatial...] input, got {input}"),
        ));
    }
    let spatial = &input.dims()[2..];

    let kernel = ints_attr(layer, "kernel")?;
    if kernel.len() != spatial.len() {
        return Err(incompatible(
            layer,
            format!("kernel rank {} vs {} spatial dims", kernel.len(), spatial.len()),
        ));
    }
    let strides = layer.ints_attr("strides").map(<[i64]>::to_vec);
    let strides = strides.unwrap_or_else(|| vec![1; spatial.len()]);
    let pads = layer.ints_attr("pads").map(<[i64]>::to_vec);
    let pads = pads.unwrap_or_else(|| vec![0; spatial.len()]);
    if strides.len() != spatial.len() || pads.len() != spatial.len() {
        return Err(incompatible(layer, "strides/pads rank mismatch".to_string()));
    }

    let mut dims = vec![
        input.batch(),
        out_channels.unwrap_or_else(|| input.dims()[1]),
    ];
    for (i, &axis) in spatial.iter().enumerate() {
        let (k, s, p) = (kernel[i], strides[i], pads[i]);
        if k < 1 || s < 1 || p < 0 {
            return Err(incompatible(layer, format!("bad window k={k} s={s} p={p}")));
        }
        let padded = axis as i64 + 2 * p;
        if k > padded {
            return Err(incompatible(
                layer,
                format!("kernel {k} exceeds padded extent {padded}"),
            ));
        }
        dims.push(((padded - k) / s + 1) as usize);
    }
    Ok(Shape::from(dims))
}

/// Target dims for a Reshape layer: `0` copies the matching input dim,
/// a single `-1` absorbs the remaining elements.
fn reshape_dims(layer: &Layer, input: &Shape) -> Result<Shape, ShapeError> {
    let targets = ints_attr(layer, "dims")?;
    let mut dims = Vec::with_capacity(targets.len());
    let mut infer_at = None;
    for (i, &t) in targets.iter().enumerate() {
        match t {
            0 => {
                let copied = input.dims().get(i).copied().ok_or_else(|| {
                    incompatible(layer, format!("dim {i} copies past input rank {}", input.rank()))
                })?;
                dims.push(copied);
            }
            -1 => {
                if infer_at.replace(i).is_some() {
                    return Err(incompatible(layer, "more than one -1 dim".to_string()));
                }
                dims.push(1);
            }
            t if t > 0 => dims.push(t as usize),
            t => return Err(incompatible(layer, format!("negative dim {t}"))),
        }
    }

    let total = input.numel();
    let known: usize = dims.iter().product();
    if let Some(i) = infer_at {
        if known == 0 || total % known != 0 {
            return Err(incompatible(
                layer,
                format!("{total} elements do not divide into {dims:?}"),
            ));
        }
        dims[i] = total / known;
    } else if known != total {
        return Err(incompatible(
            layer,
            format!("target holds {known} elements, input has {total}"),
        ));
    }
    Ok(Shape::from(dims))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str) -> Layer {
        Layer::new(name, "Parameter")
    }

    fn unary(name: &str, kind: &str, from: &str) -> Layer {
        let mut l = Layer::new(name, kind);
        l.inputs.push(PortRef::new(from, 0));
        l
    }

    fn shapes_for(
        layers: &BTreeMap<String, Layer>,
        data_shape: &[usize],
    ) -> Result<HashMap<PortRef, Shape>, ShapeError> {
        let mut inputs = HashMap::new();
        inputs.insert("data".to_string(), Shape::from_slice(data_shape));
        infer_shapes(layers, &inputs)
    }

    #[test]
    fn conv_pool_reshape_fc_chain() {
        let mut layers = BTreeMap::new();
        layers.insert("data".into(), param("data"));

        let mut conv = unary("conv", "Convolution", "data");
        conv.attrs.insert("out_channels".into(), 16.into());
        conv.attrs.insert("kernel".into(), vec![3, 3].into());
        conv.attrs.insert("pads".into(), vec![3, 3].into());
        layers.insert("conv".into(), conv);

        let mut pool = unary("pool", "Pooling", "conv");
        pool.attrs.insert("kernel".into(), vec![2, 2].into());
        pool.attrs.insert("strides".into(), vec![2, 2].into());
        layers.insert("pool".into(), pool);

        let mut flat = unary("flat", "Reshape", "pool");
        flat.attrs.insert("dims".into(), vec![0, -1].into());
        layers.insert("flat".into(), flat);

        let mut fc = unary("fc", "FullyConnected", "flat");
        fc.attrs.insert("out_size".into(), 10.into());
        layers.insert("fc".into(), fc);

        let shapes = shapes_for(&layers, &[1, 3, 32, 32]).unwrap();
        assert_eq!(shapes[&PortRef::new("conv", 0)], Shape::from([1, 16, 36, 36]));
        assert_eq!(shapes[&PortRef::new("pool", 0)], Shape::from([1, 16, 18, 18]));
        assert_eq!(shapes[&PortRef::new("flat", 0)], Shape::from([1, 5184]));
        assert_eq!(shapes[&PortRef::new("fc", 0)], Shape::from([1, 10]));

        // Batch flows through untouched.
        let shapes = shapes_for(&layers, &[8, 3, 32, 32]).unwrap();
        assert_eq!(shapes[&PortRef::new("fc", 0)], Shape::from([8, 10]));
    }

    #[test]
    fn kernel_larger_than_input_is_rejected() {
        let mut layers = BTreeMap::new();
        layers.insert("data".into(), param("data"));
        let mut conv = unary("conv", "Convolution", "data");
        conv.attrs.insert("out_channels".into(), 4.into());
        conv.attrs.insert("kernel".into(), vec![9, 9].into());
        layers.insert("conv".into(), conv);

        let err = shapes_for(&layers, &[1, 3, 4, 4]).unwrap_err();
        assert!(matches!(err, ShapeError::Incompatible { .. }), "{err}");
    }

    #[test]
    fn reshape_requires_matching_element_count() {
        let mut layers = BTreeMap::new();
        layers.insert("data".into(), param("data"));
        let mut flat = unary("flat", "Reshape", "data");
        flat.attrs.insert("dims".into(), vec![0, 7].into());
        layers.insert("flat".into(), flat);

        let err = shapes_for(&layers, &[1, 3, 4]).unwrap_err();
        assert!(matches!(err, ShapeError::Incompatible { .. }), "{err}");
    }

    #[test]
    fn unknown_kind_and_missing_attr() {
        let mut layers = BTreeMap::new();
        layers.insert("data".into(), param("data"));
        layers.insert("odd".into(), unary("odd", "Banana", "data"));
        let err = shapes_for(&layers, &[1, 3]).unwrap_err();
        assert!(matches!(err, ShapeError::UnsupportedOp { .. }), "{err}");

        let mut layers = BTreeMap::new();
        layers.insert("data".into(), param("data"));
        layers.insert("fc".into(), unary("fc", "FullyConnected", "data"));
        let err = shapes_for(&layers, &[1, 3]).unwrap_err();
        assert!(
            matches!(err, ShapeError::MissingAttr { attr: "out_size", .. }),
            "{err}"
        );
    }

    #[test]
    fn cycle_is_detected() {
        let mut layers = BTreeMap::new();
        layers.insert("a".into(), unary("a", "ReLU", "b"));
        layers.insert("b".into(), unary("b", "ReLU", "a"));
        let err = infer_shapes(&layers, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ShapeError::Cycle(_)), "{err}");
    }
}
