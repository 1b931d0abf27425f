//! Binary topology/weights codec owned by the reference engine.
//!
//! Topology file (`NTDF`): network name, layer records (name, kind,
//! attributes, producer ports), declared outputs. Weights file
//! (`NWBF`): blob records addressed by layer and blob name. All
//! integers little-endian; strings are u32-length-prefixed UTF-8.

use std::collections::BTreeMap;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use netdesc_core::{AttrValue, Blob, Layer, LoadError, NetworkDescriptor, PortRef, Shape};

const TOPOLOGY_MAGIC: &[u8; 4] = b"NTDF";
const WEIGHTS_MAGIC: &[u8; 4] = b"NWBF";
const VERSION: u32 = 1;

// Sanity caps so a corrupt length prefix cannot trigger a huge
// allocation.
const MAX_STRING: usize = 64 * 1024;
const MAX_COUNT: usize = 1 << 20;

/// Parsed topology, before weights are attached.
#[derive(Debug)]
pub struct Topology {
    pub name: String,
    pub layers: BTreeMap<String, Layer>,
    pub outputs: Vec<PortRef>,
}

/// One weights-file entry.
#[derive(Debug)]
pub struct BlobRecord {
    pub layer: String,
    pub blob: String,
    pub shape: Shape,
    pub data: Bytes,
}

pub fn read_topology(buf: &[u8]) -> Result<Topology, LoadError> {
    parse_topology(buf).map_err(LoadError::MalformedTopology)
}

pub fn read_weights(buf: &[u8]) -> Result<Vec<BlobRecord>, LoadError> {
    parse_weights(buf).map_err(LoadError::MalformedWeights)
}

fn parse_topology(buf: &[u8]) -> Result<Topology, String> {
    let mut r = buf;
    read_magic(&mut r, TOPOLOGY_MAGIC)?;

    let name = read_string(&mut r)?;
    let layer_count = read_count(&mut r)?;

    let mut layers = BTreeMap::new();
    for _ in 0..layer_count {
        let layer = read_layer(&mut r)?;
        if layers.insert(layer.name.clone(), layer).is_some() {
            return Err("duplicate layer name".to_string());
        }
    }

    let output_count = r.read_u16::<LittleEndian>().map_err(eof)? as usize;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        outputs.push(read_port(&mut r)?);
    }

    if !r.is_empty() {
        return Err(format!("{} trailing byte(s) after outputs", r.len()));
    }
    Ok(Topology {
        name,
        layers,
        outputs,
    })
}

fn read_layer(r: &mut &[u8]) -> Result<Layer, String> {
    let name = read_string(r)?;
    let kind = read_string(r)?;
    let mut layer = Layer::new(name, kind);

    let attr_count = r.read_u16::<LittleEndian>().map_err(eof)? as usize;
    for _ in 0..attr_count {
        let key = read_string(r)?;
        let value = match r.read_u8().map_err(eof)? {
            0 => AttrValue::Int(r.read_i64::<LittleEndian>().map_err(eof)?),
            1 => {
                let len = r.read_u16::<LittleEndian>().map_err(eof)? as usize;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(r.read_i64::<LittleEndian>().map_err(eof)?);
                }
                AttrValue::Ints(values)
            }
            tag => return Err(format!("unknown attribute tag {tag}")),
        };
        layer.attrs.insert(key, value);
    }

    let input_count = r.read_u16::<LittleEndian>().map_err(eof)? as usize;
    for _ in 0..input_count {
        layer.inputs.push(read_port(r)?);
    }
    Ok(layer)
}

fn parse_weights(buf: &[u8]) -> Result<Vec<BlobRecord>, String> {
    let mut r = buf;
    read_magic(&mut r, WEIGHTS_MAGIC)?;

    let blob_count = read_count(&mut r)?;
    let mut records = Vec::with_capacity(blob_count.min(MAX_COUNT));
    for _ in 0..blob_count {
        let layer = read_string(&mut r)?;
        let blob = read_string(&mut r)?;
        let rank = r.read_u16::<LittleEndian>().map_err(eof)? as usize;
        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            dims.push(r.read_u64::<LittleEndian>().map_err(eof)? as usize);
        }
        let byte_len = r.read_u64::<LittleEndian>().map_err(eof)? as usize;
        if byte_len > r.len() {
            return Err(format!(
                "blob {layer}/{blob} claims {byte_len} bytes, {} remain",
                r.len()
            ));
        }
        let mut data = vec![0u8; byte_len];
        r.read_exact(&mut data).map_err(eof)?;
        records.push(BlobRecord {
            layer,
            blob,
            shape: Shape::from(dims),
            data: data.into(),
        });
    }

    if !r.is_empty() {
        return Err(format!("{} trailing byte(s) after blobs", r.len()));
    }
    Ok(records)
}

fn read_magic(r: &mut &[u8], expected: &[u8; 4]) -> Result<(), String> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(eof)?;
    if &magic != expected {
        return Err(format!("bad magic {magic:?}"));
    }
    let version = r.read_u32::<LittleEndian>().map_err(eof)?;
    if version != VERSION {
        return Err(format!("unsupported version {version}"));
    }
    Ok(())
}

fn read_count(r: &mut &[u8]) -> Result<usize, String> {
    let count = r.read_u32::<LittleEndian>().map_err(eof)? as usize;
    if count > MAX_COUNT {
        return Err(format!("implausible record count {count}"));
    }
    Ok(count)
}

fn read_string(r: &mut &[u8]) -> Result<String, String> {
    let len = r.read_u32::<LittleEndian>().map_err(eof)? as usize;
    if len > MAX_STRING {
        return Err(format!("string length {len} exceeds cap"));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(eof)?;
    String::from_utf8(buf).map_err(|_| "string is not valid UTF-8".to_string())
}

fn read_port(r: &mut &[u8]) -> Result<PortRef, String> {
    let layer = read_string(r)?;
    let port = r.read_u16::<LittleEndian>().map_err(eof)? as usize;
    Ok(PortRef::new(layer, port))
}

fn eof(e: std::io::Error) -> String {
    format!("unexpected end of data: {e}")
}

/// Serialize the current topology. Parameter layers are written with
/// their current (possibly reshaped) input shapes; the output list is
/// the descriptor's current output set.
pub fn write_topology(net: &NetworkDescriptor) -> Vec<u8> {
    let mut w = Vec::new();
    w.extend_from_slice(TOPOLOGY_MAGIC);
    w.write_u32::<LittleEndian>(VERSION).unwrap();
    write_string(&mut w, net.name());
    w.write_u32::<LittleEndian>(net.layers().len() as u32)
        .unwrap();

    for layer in net.layers().values() {
        write_string(&mut w, &layer.name);
        write_string(&mut w, &layer.kind);

        let mut attrs = layer.attrs.clone();
        if let Some(ep) = net.inputs().get(&layer.name) {
            let dims: Vec<i64> = ep.shape.dims().iter().map(|&d| d as i64).collect();
            attrs.insert("shape".to_string(), AttrValue::Ints(dims));
        }

        w.write_u16::<LittleEndian>(attrs.len() as u16).unwrap();
        for (key, value) in &attrs {
            write_string(&mut w, key);
            match value {
                AttrValue::Int(v) => {
                    w.write_u8(0).unwrap();
                    w.write_i64::<LittleEndian>(*v).unwrap();
                }
                AttrValue::Ints(vs) => {
                    w.write_u8(1).unwrap();
                    w.write_u16::<LittleEndian>(vs.len() as u16).unwrap();
                    for v in vs {
                        w.write_i64::<LittleEndian>(*v).unwrap();
                    }
                }
            }
        }

        w.write_u16::<LittleEndian>(layer.inputs.len() as u16)
            .unwrap();
        for port in &layer.inputs {
            write_port(&mut w, port);
        }
    }

    w.write_u16::<LittleEndian>(net.outputs().len() as u16)
        .unwrap();
    for ep in net.outputs().values() {
        write_port(&mut w, &ep.origin);
    }
    w
}

pub fn write_weights(net: &NetworkDescriptor) -> Vec<u8> {
    let mut w = Vec::new();
    w.extend_from_slice(WEIGHTS_MAGIC);
    w.write_u32::<LittleEndian>(VERSION).unwrap();

    let blob_count: usize = net.layers().values().map(|l| l.blobs.len()).sum();
    w.write_u32::<LittleEndian>(blob_count as u32).unwrap();

    for layer in net.layers().values() {
        for (name, blob) in &layer.blobs {
            write_string(&mut w, &layer.name);
            write_string(&mut w, name);
            w.write_u16::<LittleEndian>(blob.shape.rank() as u16)
                .unwrap();
            for &d in blob.shape.dims() {
                w.write_u64::<LittleEndian>(d as u64).unwrap();
            }
            w.write_u64::<LittleEndian>(blob.data.len() as u64).unwrap();
            w.extend_from_slice(&blob.data);
        }
    }
    w
}

/// Attach weight records to their layers.
pub fn attach_blobs(
    layers: &mut BTreeMap<String, Layer>,
    records: Vec<BlobRecord>,
) -> Result<(), LoadError> {
    for record in records {
        let layer = layers.get_mut(&record.layer).ok_or_else(|| {
            LoadError::MalformedWeights(format!(
                "blob {}/{} references unknown layer",
                record.layer, record.blob
            ))
        })?;
        layer
            .blobs
            .insert(record.blob, Blob::new(record.shape, record.data));
    }
    Ok(())
}

fn write_string(w: &mut Vec<u8>, s: &str) {
    w.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    w.extend_from_slice(s.as_bytes());
}

fn write_port(w: &mut Vec<u8>, port: &PortRef) {
    write_string(w, &port.layer);
    w.write_u16::<LittleEndian>(port.port as u16).unwrap();
}
