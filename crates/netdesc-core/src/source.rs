use std::path::PathBuf;

use bytes::Bytes;

/// Where a serialized network component comes from: a file on disk or
/// an in-memory buffer.
#[derive(Clone, Debug)]
pub enum ModelSource {
    Path(PathBuf),
    Buffer(Bytes),
}

impl ModelSource {
    pub fn path(p: impl Into<PathBuf>) -> Self {
        ModelSource::Path(p.into())
    }

    pub fn buffer(b: impl Into<Bytes>) -> Self {
        ModelSource::Buffer(b.into())
    }
}

impl From<PathBuf> for ModelSource {
    fn from(p: PathBuf) -> Self {
        ModelSource::Path(p)
    }
}

impl From<&std::path::Path> for ModelSource {
    fn from(p: &std::path::Path) -> Self {
        ModelSource::Path(p.to_path_buf())
    }
}

impl From<Bytes> for ModelSource {
    fn from(b: Bytes) -> Self {
        ModelSource::Buffer(b)
    }
}

impl From<Vec<u8>> for ModelSource {
    fn from(b: Vec<u8>) -> Self {
        ModelSource::Buffer(b.into())
    }
}
