mod cli;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use netdesc_core::{NetworkDescriptor, Shape};
use netdesc_engine::ReferenceEngine;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    std::env::set_var("RUST_LOG", &cli.log);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match cli.command {
        Command::Info { model, weights } => info(&model, &weights),
        Command::Reshape {
            model,
            weights,
            set,
            batch,
            out_model,
            out_weights,
        } => reshape(&model, &weights, &set, batch, &out_model, &out_weights),
    }
}

fn load(model: &Path, weights: &Path) -> Result<NetworkDescriptor> {
    ReferenceEngine
        .read_network(&model.into(), &weights.into())
        .context("failed to read network")
}

fn info(model: &Path, weights: &Path) -> Result<()> {
    let net = load(model, weights)?;

    println!("network: {} (batch {})", net.name(), net.batch_size());
    println!("inputs:");
    for ep in net.inputs().values() {
        println!(
            "  {} {} {} {}",
            ep.name, ep.shape, ep.layout, ep.precision
        );
    }
    println!("outputs:");
    for ep in net.outputs().values() {
        println!(
            "  {} {} {} {}",
            ep.name, ep.shape, ep.layout, ep.precision
        );
    }
    println!("layers:");
    for layer in net.layers().values() {
        println!("  {} ({})", layer.name, layer.kind);
        for (name, blob) in &layer.blobs {
            println!("    blob {} {} ({} bytes)", name, blob.shape, blob.data.len());
        }
    }
    Ok(())
}

fn reshape(
    model: &Path,
    weights: &Path,
    set: &[String],
    batch: Option<usize>,
    out_model: &Path,
    out_weights: &Path,
) -> Result<()> {
    let mut net = load(model, weights)?;

    if !set.is_empty() {
        let requests = parse_requests(set)?;
        net.reshape(&requests).context("reshape rejected")?;
    }
    if let Some(batch) = batch {
        net.set_batch_size(batch).context("batch change rejected")?;
    }

    net.serialize(out_model, out_weights)
        .context("failed to serialize network")?;
    tracing::info!(
        model = %out_model.display(),
        weights = %out_weights.display(),
        batch = net.batch_size(),
        "network written"
    );
    Ok(())
}

fn parse_requests(set: &[String]) -> Result<HashMap<String, Shape>> {
    let mut requests = HashMap::new();
    for entry in set {
        let (name, dims) = entry
            .split_once('=')
            .with_context(|| format!("expected NAME=DIMS, got {entry:?}"))?;
        let dims = dims
            .split(',')
            .map(|d| d.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid dims in {entry:?}"))?;
        requests.insert(name.to_string(), Shape::from(dims));
    }
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shape_requests() {
        let reqs = parse_requests(&["data=8,3,32,32".to_string()]).unwrap();
        assert_eq!(reqs["data"], Shape::from([8, 3, 32, 32]));

        assert!(parse_requests(&["data".to_string()]).is_err());
        assert!(parse_requests(&["data=1,x".to_string()]).is_err());
    }
}
