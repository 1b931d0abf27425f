//! End-to-end coverage against the reference engine: load, endpoint
//! metadata, reshape, output extension, serialization round trips.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use netdesc_core::{
    AddOutputsError, Blob, Layout, LoadError, ModelSource, NetworkDescriptor, Precision,
    ReshapeError, Shape,
};
use netdesc_engine::{LayerSpec, NetworkBuilder, ReferenceEngine};

fn patterned(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
}

/// The classic fixture: data [1,3,32,32] -> conv -> relu -> pool ->
/// 28/Reshape [1,5184] -> 29/WithoutBiases [1,10] -> fc_out.
fn fixture() -> NetworkDescriptor {
    NetworkBuilder::new("model")
        .parameter("data", [1, 3, 32, 32])
        .layer(
            LayerSpec::new("conv1", "Convolution")
                .attr("out_channels", 16)
                .attr("kernel", vec![3, 3])
                .attr("pads", vec![3, 3])
                .blob("weights", Blob::new([16, 3, 3, 3], patterned(16 * 3 * 3 * 3 * 4)))
                .from("data"),
        )
        .layer(LayerSpec::new("relu1", "ReLU").from("conv1"))
        .layer(
            LayerSpec::new("pool1", "Pooling")
                .attr("kernel", vec![2, 2])
                .attr("strides", vec![2, 2])
                .from("relu1"),
        )
        .layer(
            LayerSpec::new("28/Reshape", "Reshape")
                .attr("dims", vec![0, -1])
                .from("pool1"),
        )
        .layer(
            LayerSpec::new("29/WithoutBiases", "FullyConnected")
                .attr("out_size", 10)
                .blob("weights", Blob::new([10, 5184], patterned(10 * 5184 * 4)))
                .from("28/Reshape"),
        )
        .layer(LayerSpec::new("fc_out", "SoftMax").from("29/WithoutBiases"))
        .output("fc_out")
        .build()
        .expect("fixture network must build")
}

/// Serialize the fixture into a temp dir and return its file paths.
fn fixture_files(dir: &Path) -> (PathBuf, PathBuf) {
    let topology = dir.join("model.ntd");
    let weights = dir.join("model.nwb");
    fixture().serialize(&topology, &weights).unwrap();
    (topology, weights)
}

fn load(topology: &Path, weights: &Path) -> NetworkDescriptor {
    ReferenceEngine
        .read_network(&topology.into(), &weights.into())
        .unwrap()
}

#[test]
fn load_exposes_input_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let net = load(&topology, &weights);

    let data = &net.inputs()["data"];
    assert_eq!(data.name, "data");
    assert_eq!(data.layout, Layout::Nchw);
    assert_eq!(data.precision, Precision::Fp32);
    assert_eq!(data.shape, Shape::from([1, 3, 32, 32]));
}

#[test]
fn load_exposes_output_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let net = load(&topology, &weights);

    assert_eq!(net.outputs().len(), 1);
    let out = &net.outputs()["fc_out"];
    assert_eq!(out.name, "fc_out");
    assert_eq!(out.layout, Layout::Nc);
    assert_eq!(out.precision, Precision::Fp32);
    assert_eq!(out.shape, Shape::from([1, 10]));
}

#[test]
fn missing_model_path_names_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let (_, weights) = fixture_files(dir.path());

    let err = ReferenceEngine
        .read_network(
            &ModelSource::path("./model.ntd"),
            &ModelSource::Path(weights),
        )
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("Path to the model ./model.ntd doesn't exist or it's a directory"),
        "{err}"
    );
}

#[test]
fn missing_weights_path_names_the_weights() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, _) = fixture_files(dir.path());

    let err = ReferenceEngine
        .read_network(
            &ModelSource::Path(topology),
            &ModelSource::path("./model.nwb"),
        )
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("Path to the weights ./model.nwb doesn't exist or it's a directory"),
        "{err}"
    );
}

#[test]
fn garbage_buffer_is_a_load_error() {
    let err = ReferenceEngine
        .read_network(
            &ModelSource::buffer(&b"not a topology"[..]),
            &ModelSource::buffer(&b""[..]),
        )
        .unwrap_err();
    assert!(matches!(err, LoadError::MalformedTopology(_)), "{err}");
}

#[test]
fn buffers_load_like_paths() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());

    let from_paths = load(&topology, &weights);
    let from_buffers = ReferenceEngine
        .read_network(
            &std::fs::read(&topology).unwrap().into(),
            &std::fs::read(&weights).unwrap().into(),
        )
        .unwrap();

    let names: Vec<_> = from_paths.layers().keys().collect();
    assert_eq!(names, from_buffers.layers().keys().collect::<Vec<_>>());

    for (name, layer) in from_paths.layers() {
        let other = &from_buffers.layers()[name];
        for (blob_name, blob) in &layer.blobs {
            assert_eq!(
                blob.data, other.blobs[blob_name].data,
                "blob payload differs for {name}/{blob_name}"
            );
        }
    }
}

#[test]
fn precision_setters_validate_and_stick() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    net.set_input_precision("data", "I8").unwrap();
    assert_eq!(net.inputs()["data"].precision, Precision::I8);

    net.set_output_precision("fc_out", "I8").unwrap();
    assert_eq!(net.outputs()["fc_out"].precision, Precision::I8);

    let err = net.set_output_precision("fc_out", "BLA").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Unsupported precision BLA!"), "{msg}");
    assert!(msg.contains("List of supported precisions:"), "{msg}");
    assert_eq!(net.outputs()["fc_out"].precision, Precision::I8);
}

#[test]
fn layout_setter_validates_and_sticks() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    net.set_input_layout("data", "NHWC").unwrap();
    assert_eq!(net.inputs()["data"].layout, Layout::Nhwc);

    let err = net.set_input_layout("data", "BLA").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Unsupported layout BLA!"), "{msg}");
    assert!(msg.contains("List of supported layouts:"), "{msg}");
    assert_eq!(net.inputs()["data"].layout, Layout::Nhwc);
}

#[test]
fn add_outputs_accepts_every_form() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    net.add_output("28/Reshape").unwrap();
    net.add_outputs([("29/WithoutBiases", 0)]).unwrap();
    net.add_outputs(["28/Reshape"]).unwrap(); // idempotent

    let mut names: Vec<&str> = net.outputs().keys().map(String::as_str).collect();
    names.sort_unstable();
    assert_eq!(names, ["28/Reshape", "29/WithoutBiases", "fc_out"]);

    assert!(matches!(
        net.add_output("no_such_layer"),
        Err(AddOutputsError::UnknownLayer(_))
    ));
}

#[test]
fn added_outputs_do_not_alias() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    net.add_outputs(["28/Reshape"]).unwrap();
    assert_eq!(net.outputs()["28/Reshape"].name, "28/Reshape");
    assert_eq!(net.outputs()["28/Reshape"].shape, Shape::from([1, 5184]));
    assert_eq!(net.outputs()["fc_out"].name, "fc_out");
    assert_eq!(net.outputs()["fc_out"].shape, Shape::from([1, 10]));

    net.output_mut("28/Reshape").unwrap().precision = Precision::Fp16;
    assert_eq!(net.outputs()["fc_out"].precision, Precision::Fp32);
}

#[test]
fn batch_size_getter_and_setter() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    assert_eq!(net.batch_size(), 1);
    net.set_batch_size(4).unwrap();
    assert_eq!(net.batch_size(), 4);
    assert_eq!(net.inputs()["data"].shape, Shape::from([4, 3, 32, 32]));
    assert_eq!(net.outputs()["fc_out"].shape, Shape::from([4, 10]));
}

#[test]
fn repeated_reshape_fully_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    let mut req = HashMap::new();
    req.insert("data".to_string(), Shape::from([4, 3, 32, 32]));
    net.reshape(&req).unwrap();
    assert_eq!(net.batch_size(), 4);
    assert_eq!(net.inputs()["data"].shape, Shape::from([4, 3, 32, 32]));

    req.insert("data".to_string(), Shape::from([8, 3, 32, 32]));
    net.reshape(&req).unwrap();
    assert_eq!(net.batch_size(), 8);
    assert_eq!(net.inputs()["data"].shape, Shape::from([8, 3, 32, 32]));
    assert_eq!(net.outputs()["fc_out"].shape, Shape::from([8, 10]));
}

#[test]
fn rejected_reshape_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    // Rank 2 leaves the convolution without spatial dims.
    let mut req = HashMap::new();
    req.insert("data".to_string(), Shape::from([1, 3]));
    let err = net.reshape(&req).unwrap_err();
    assert!(matches!(err, ReshapeError::Inference(_)), "{err}");

    assert_eq!(net.batch_size(), 1);
    assert_eq!(net.inputs()["data"].shape, Shape::from([1, 3, 32, 32]));
    assert_eq!(net.outputs()["fc_out"].shape, Shape::from([1, 10]));

    let mut req = HashMap::new();
    req.insert("bogus".to_string(), Shape::from([1, 3, 32, 32]));
    assert!(matches!(
        net.reshape(&req),
        Err(ReshapeError::UnknownInput(_))
    ));
}

#[test]
fn serialize_round_trips_layer_names() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    // Mutate first so the round trip covers reshaped, output-extended
    // state rather than the pristine file.
    net.set_batch_size(4).unwrap();
    net.add_output("28/Reshape").unwrap();

    let out_topology = dir.path().join("serialized.ntd");
    let out_weights = dir.path().join("serialized.nwb");
    net.serialize(&out_topology, &out_weights).unwrap();

    let reloaded = load(&out_topology, &out_weights);
    assert_eq!(
        net.layers().keys().collect::<Vec<_>>(),
        reloaded.layers().keys().collect::<Vec<_>>()
    );
    assert_eq!(reloaded.batch_size(), 4);
    assert_eq!(reloaded.inputs()["data"].shape, Shape::from([4, 3, 32, 32]));
    assert!(reloaded.outputs().contains_key("28/Reshape"));
    assert_eq!(
        reloaded.layers()["conv1"].blobs["weights"].data,
        net.layers()["conv1"].blobs["weights"].data
    );
}

#[test]
fn serialize_to_unwritable_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let net = fixture();
    let err = net
        .serialize(
            &dir.path().join("no/such/dir/model.ntd"),
            &dir.path().join("model.nwb"),
        )
        .unwrap_err();
    assert!(err.to_string().contains("failed to write topology"), "{err}");
}

#[test]
#[allow(deprecated)]
fn deprecated_loader_forwards() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());

    let net = netdesc_engine::load_network(topology, weights).unwrap();
    assert_eq!(net.name(), "model");
    assert_eq!(net.inputs()["data"].shape, Shape::from([1, 3, 32, 32]));
}

#[test]
fn stats_side_channel_reads_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let (topology, weights) = fixture_files(dir.path());
    let mut net = load(&topology, &weights);

    assert!(net.stats().is_empty());
    let stats = netdesc_core::LayerStats::new(
        (1..=10).map(|v| v as f32).collect(),
        (1..=10).map(|v| v as f32 * 10.0).collect(),
    )
    .unwrap();
    net.update_stats([("fc_out".to_string(), stats.clone())]);
    assert_eq!(net.stats()["fc_out"], stats);
}
