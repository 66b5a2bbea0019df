//! Tagged, versioned container for data derived from a world file.
//!
//! ```text
//! [u8; 8] tag  u32 version  u32 checksum length  checksum bytes
//! u64 payload length  zlib(bincode(payload))
//! ```
//! A file whose tag, version or world checksum does not match is treated as
//! absent: the caller recomputes and rewrites it.

use bevy::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::{NavError, Result};

pub type CacheTag = [u8; 8];

pub fn encode_cache_bytes<T: Serialize>(tag: &CacheTag, version: u32, checksum: &str, value: &T) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    bincode::serialize_into(&mut encoder, value)?;
    let payload = encoder.finish()?;

    let mut out = Vec::with_capacity(24 + checksum.len() + payload.len());
    out.extend_from_slice(tag);
    out.write_u32::<LittleEndian>(version)?;
    out.write_u32::<LittleEndian>(checksum.len() as u32)?;
    out.extend_from_slice(checksum.as_bytes());
    out.write_u64::<LittleEndian>(payload.len() as u64)?;
    out.extend_from_slice(&payload);
    Ok(out)
}

pub fn decode_cache_bytes<T: DeserializeOwned>(bytes: &[u8], tag: &CacheTag, version: u32, checksum: &str) -> Result<T> {
    let mut cursor = Cursor::new(bytes);

    let mut found_tag = [0u8; 8];
    cursor.read_exact(&mut found_tag)?;
    if &found_tag != tag {
        return Err(NavError::CacheFile(format!(
            "tag {:?} does not match {:?}",
            String::from_utf8_lossy(&found_tag),
            String::from_utf8_lossy(tag)
        )));
    }

    let found_version = cursor.read_u32::<LittleEndian>()?;
    if found_version != version {
        return Err(NavError::CacheFile(format!("version {found_version}, expected {version}")));
    }

    let checksum_len = cursor.read_u32::<LittleEndian>()? as usize;
    let remaining = bytes.len() - cursor.position() as usize;
    if checksum_len > remaining {
        return Err(NavError::CacheFile("truncated checksum".into()));
    }
    let mut found_checksum = vec![0u8; checksum_len];
    cursor.read_exact(&mut found_checksum)?;
    if found_checksum != checksum.as_bytes() {
        return Err(NavError::CacheFile(format!(
            "built for world {}, current world is {}",
            String::from_utf8_lossy(&found_checksum),
            checksum
        )));
    }

    let payload_len = cursor.read_u64::<LittleEndian>()?;
    let remaining = (bytes.len() - cursor.position() as usize) as u64;
    if payload_len != remaining {
        return Err(NavError::CacheFile(format!("payload is {remaining} bytes, header says {payload_len}")));
    }

    let mut decoder = ZlibDecoder::new(cursor);
    let value = bincode::deserialize_from(&mut decoder)?;
    Ok(value)
}

pub fn write_cache_file<T: Serialize>(
    path: impl AsRef<Path>,
    tag: &CacheTag,
    version: u32,
    checksum: &str,
    value: &T,
) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_cache_bytes(tag, version, checksum, value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &bytes)?;
    info!("[CACHE FILE] Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Read a cache file, returning `None` when it is missing or stale.
pub fn read_cache_file<T: DeserializeOwned>(path: impl AsRef<Path>, tag: &CacheTag, version: u32, checksum: &str) -> Option<T> {
    let path = path.as_ref();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("[CACHE FILE] {} not readable: {}", path.display(), e);
            return None;
        }
    };
    match decode_cache_bytes(&bytes, tag, version, checksum) {
        Ok(value) => {
            info!("[CACHE FILE] Loaded {}", path.display());
            Some(value)
        }
        Err(e) => {
            warn!("[CACHE FILE] Discarding {}: {}", path.display(), e);
            None
        }
    }
}
