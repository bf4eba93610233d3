//! Payload codec
//!
//! Every value that leaves the process (disk file, remote hash field,
//! hybrid snapshot) passes through one codec: bincode serialization behind
//! optional compression. The first byte of every payload is an algorithm
//! tag so reads are self-describing regardless of the writer's settings.

use super::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

const TAG_NONE: u8 = 0;
const TAG_LZ4: u8 = 1;
const TAG_ZSTD: u8 = 2;

/// Compression algorithm selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression
    None,
    /// LZ4 - fast compression/decompression (default)
    #[default]
    Lz4,
    /// Zstandard - better compression ratio
    Zstd,
}

/// Serialization + compression codec for persisted payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codec {
    /// Algorithm used on the write path
    pub algorithm: Compression,
    /// Payloads smaller than this are stored uncompressed
    pub min_payload_size: usize,
    /// Zstd compression level (1-22)
    pub zstd_level: i32,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            algorithm: Compression::Lz4,
            min_payload_size: 1024,
            zstd_level: 3,
        }
    }
}

impl Codec {
    /// Codec that never compresses
    pub fn plain() -> Self {
        Self {
            algorithm: Compression::None,
            ..Self::default()
        }
    }

    /// Serialize and compress a value into a tagged payload
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let raw = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let (tag, body) = if raw.len() < self.min_payload_size {
            (TAG_NONE, raw)
        } else {
            match self.algorithm {
                Compression::None => (TAG_NONE, raw),
                Compression::Lz4 => (TAG_LZ4, self.compress_lz4(&raw)?),
                Compression::Zstd => (TAG_ZSTD, self.compress_zstd(&raw)?),
            }
        };

        let mut payload = Vec::with_capacity(body.len() + 1);
        payload.push(tag);
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Decompress and deserialize a tagged payload
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        let (tag, body) = payload
            .split_first()
            .ok_or_else(|| CacheError::Serialization("empty payload".to_string()))?;

        let raw = match *tag {
            TAG_NONE => body.to_vec(),
            TAG_LZ4 => self.decompress_lz4(body)?,
            TAG_ZSTD => self.decompress_zstd(body)?,
            other => {
                return Err(CacheError::Serialization(format!(
                    "unknown compression tag {other}"
                )));
            }
        };

        bincode::serde::decode_from_slice(&raw, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn compress_lz4(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = lz4::EncoderBuilder::new()
            .level(4)
            .build(Vec::new())
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        encoder
            .write_all(data)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let (compressed, result) = encoder.finish();
        result.map_err(|e| CacheError::Serialization(e.to_string()))?;

        debug!(
            "lz4 compressed: {} -> {} bytes",
            data.len(),
            compressed.len()
        );
        Ok(compressed)
    }

    fn decompress_lz4(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder =
            lz4::Decoder::new(data).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(decompressed)
    }

    fn compress_zstd(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = zstd::encode_all(data, self.zstd_level)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        debug!(
            "zstd compressed: {} -> {} bytes",
            data.len(),
            compressed.len()
        );
        Ok(compressed)
    }

    fn decompress_zstd(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}
