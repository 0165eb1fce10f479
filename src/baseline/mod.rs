//! On-disk persistence of a poller baseline, so that a restarted process keeps
//! diffing against the last state it saw.
//!
//! The file is a bincode-encoded [`StoredBaseline`] compressed with zstd.
//! Emitted events are never stored.

use std::io;
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};
use compio::fs;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info};

use crate::ext::PathDisplayExt;
use crate::snapshot::{InvalidSnapshotError, Node, Snapshot, name_from_bytes};

const FORMAT_VERSION: u32 = 1;
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Encode, Decode)]
struct StoredBaseline {
    version: u32,
    root: Vec<u8>,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored baseline. A missing file is not an error.
    pub async fn read(&self) -> Result<Option<Snapshot>, BaselineStoreError> {
        debug!("Reading baseline from {}", self.path.display_best_effort());
        let compressed = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!("No stored baseline found, starting fresh");
                return Ok(None);
            }
            Err(error) => {
                return Err(error).context(ReadSnafu {
                    path: self.path.clone(),
                });
            }
        };

        let snapshot = decode(&compressed)?;
        debug!(
            "Loaded baseline of {} with {} entries",
            snapshot.root_path().display(),
            snapshot.len() - 1
        );
        Ok(Some(snapshot))
    }

    /// Replaces the stored baseline. The new file is written next to the old
    /// one and renamed over it, so readers never see a half-written file.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<(), BaselineStoreError> {
        let bytes = encode(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.context(WriteSnafu {
                path: parent.to_path_buf(),
            })?;
        }

        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        let written = bytes.len();
        fs::write(&temporary, bytes).await.0.context(WriteSnafu {
            path: temporary.clone(),
        })?;
        fs::rename(&temporary, &self.path).await.context(WriteSnafu {
            path: self.path.clone(),
        })?;

        debug!(
            "Stored baseline ({} bytes) at {}",
            written,
            self.path.display_best_effort()
        );
        Ok(())
    }
}

fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, BaselineStoreError> {
    let (root, nodes) = snapshot.clone().into_parts();
    let stored = StoredBaseline {
        version: FORMAT_VERSION,
        root: root.into_os_string().into_encoded_bytes(),
        nodes,
    };

    let encoded =
        bincode::encode_to_vec(&stored, bincode::config::standard()).context(EncodeSnafu)?;
    zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL).context(CompressSnafu)
}

fn decode(compressed: &[u8]) -> Result<Snapshot, BaselineStoreError> {
    let encoded = zstd::decode_all(compressed).context(DecompressSnafu)?;
    let (stored, _): (StoredBaseline, usize) =
        bincode::decode_from_slice(&encoded, bincode::config::standard()).context(DecodeSnafu)?;

    ensure!(
        stored.version == FORMAT_VERSION,
        VersionMismatchSnafu {
            found: stored.version,
        }
    );

    let root = name_from_bytes(stored.root).context(DecodeSnafu)?;
    Snapshot::from_parts(PathBuf::from(root), stored.nodes).context(InvalidSnapshotSnafu)
}

#[derive(Debug, Snafu)]
pub enum BaselineStoreError {
    #[snafu(display("Failed to read stored baseline {}", path.display_best_effort()))]
    ReadError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to write baseline to {}", path.display_best_effort()))]
    WriteError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to encode baseline"))]
    EncodeError {
        source: bincode::error::EncodeError,
    },
    #[snafu(display("Failed to compress baseline"))]
    CompressError { source: io::Error },
    #[snafu(display("Stored baseline is not valid zstd data"))]
    DecompressError { source: io::Error },
    #[snafu(display("Stored baseline could not be decoded"))]
    DecodeError {
        source: bincode::error::DecodeError,
    },
    #[snafu(display(
        "Stored baseline has format version {}, expected {}",
        found,
        FORMAT_VERSION
    ))]
    VersionMismatch { found: u32 },
    #[snafu(display("Stored baseline does not describe a tree"))]
    InvalidSnapshotError { source: InvalidSnapshotError },
}
