//! Compression codecs for snapshot files, and a lossless string codec.
//!
//! Snapshot bytes are either plain JSON or a whole-file gzip/zstd stream.
//! The encoding is identified by magic bytes, so a loader does not have to
//! trust file names.

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use crate::{MerkleError, MerkleResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Identify the encoding of `bytes` from its magic number.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else if bytes.starts_with(&ZSTD_MAGIC) {
            Compression::Zstd
        } else {
            Compression::None
        }
    }

    /// Guess from a file extension (`.gz`, `.zst`). `None` if the extension
    /// says nothing about compression.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "gz" | "gzip" => Some(Compression::Gzip),
            "zst" | "zstd" => Some(Compression::Zstd),
            "json" => Some(Compression::None),
            _ => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zstd => Some("zst"),
        }
    }

    pub fn encode(&self, data: &[u8]) -> MerkleResult<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            // level 0 selects zstd's default
            Compression::Zstd => Ok(zstd::stream::encode_all(data, 0)?),
        }
    }

    pub fn decode(&self, data: &[u8]) -> MerkleResult<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| MerkleError::Decompression(format!("gzip: {}", e)))?;
                Ok(out)
            }
            Compression::Zstd => zstd::stream::decode_all(data)
                .map_err(|e| MerkleError::Decompression(format!("zstd: {}", e))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = MerkleError;

    fn from_str(s: &str) -> MerkleResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" | "false" => Ok(Compression::None),
            "gzip" | "gz" | "true" => Ok(Compression::Gzip),
            "zstd" | "zst" => Ok(Compression::Zstd),
            other => Err(MerkleError::InvalidInput(format!(
                "Unknown compression: {}",
                other
            ))),
        }
    }
}

/// Compress a string to printable text (gzip, then standard base64).
pub fn compress_string(input: &str) -> MerkleResult<String> {
    let compressed = Compression::Gzip.encode(input.as_bytes())?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`compress_string`].
pub fn decompress_string(encoded: &str) -> MerkleResult<String> {
    let compressed = STANDARD
        .decode(encoded.trim())
        .map_err(|e| MerkleError::Decompression(format!("base64: {}", e)))?;
    let bytes = Compression::Gzip.decode(&compressed)?;
    String::from_utf8(bytes).map_err(|e| MerkleError::Decompression(format!("utf-8: {}", e)))
}
