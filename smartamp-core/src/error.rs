use thiserror::Error;

use crate::engine::EngineError;

/// All errors produced by smartamp-core.
#[derive(Debug, Error)]
pub enum SmartAmpError {
    #[error("ring region overflow: {requested} samples at cursor {cursor} exceed capacity {capacity}")]
    Overflow {
        requested: usize,
        cursor: usize,
        capacity: usize,
    },

    #[error("ready region underrun: {requested} samples requested, {ready} ready")]
    Underrun { requested: usize, ready: usize },

    #[error("unsupported frame format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannels(usize),

    #[error("invalid frame geometry: {0}")]
    InvalidGeometry(String),

    #[error("stream channel mismatch: {0}")]
    ChannelMismatch(String),

    #[error("buffer allocation failed: {0}")]
    Allocation(String),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("component is already running")]
    AlreadyRunning,

    #[error("component is not running")]
    NotRunning,

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SmartAmpError>;
