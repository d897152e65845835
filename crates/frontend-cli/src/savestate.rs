//! Save states for the simulator.
//!
//! A save state is a core [`Snapshot`] serialized with bincode and deflate
//! compressed.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "M4SS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use mcs4_core::Snapshot;

/// Magic bytes identifying an mcs4-emu save state file.
const MAGIC: &[u8; 4] = b"M4SS";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// Encode a snapshot with header and deflate compression.
pub fn encode(snap: &Snapshot) -> Result<Vec<u8>> {
    let payload = bincode::serialize(snap).context("serializing snapshot")?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a save state, verifying magic and version.
pub fn decode(data: &[u8]) -> Result<Snapshot> {
    if data.len() < HEADER_LEN {
        bail!("save state too small ({} bytes)", data.len());
    }
    if &data[0..4] != MAGIC {
        bail!("invalid save state file (bad magic)");
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        bail!("unsupported save state version {} (expected {})", version, FORMAT_VERSION);
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| anyhow!("decompress error: {:?}", e))?;
    bincode::deserialize(&decompressed).context("deserializing snapshot")
}

pub fn save_to_file(snap: &Snapshot, path: &Path) -> Result<()> {
    let bytes = encode(snap)?;
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

pub fn load_from_file(path: &Path) -> Result<Snapshot> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    decode(&data).with_context(|| format!("loading {}", path.display()))
}
