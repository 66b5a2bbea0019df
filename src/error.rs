use thiserror::Error;

/// Errors raised while loading navigation data.
///
/// Queries never return these; an unreachable goal is reported as `None`.
#[derive(Error, Debug)]
pub enum NavError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad world file magic {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported world file version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("lump {lump} is malformed: {reason}")]
    BadLump { lump: &'static str, reason: String },

    #[error("{what} index {index} is out of range (count {count})")]
    InvalidIndex {
        what: &'static str,
        index: i64,
        count: usize,
    },

    #[error("cache file error: {0}")]
    CacheFile(String),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NavError>;
