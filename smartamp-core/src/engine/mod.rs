//! Boundary to the speaker-protection engine.
//!
//! The engine is an opaque, vendor-supplied algorithm with adaptive internal
//! state. It accepts only fixed-size frames, 16-bit samples, one contiguous
//! block per channel. `ProtectionEngine` is the seam the session drives; any
//! backend (the vendor library behind an FFI shim, the in-crate
//! [`PassthroughEngine`], a test double) plugs in without touching the
//! reframers.
//!
//! Calls are synchronous and must be bounded-time: they run inside the
//! pipeline's real-time tick.

pub mod passthrough;

pub use passthrough::PassthroughEngine;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Status bits the engine reports alongside a failed call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EngineStatus: u32 {
        const NULL_MODULE_HANDLER = 1 << 1;
        const NULL_PARAM_POINTER = 1 << 2;
        const NULL_INPUT_BUFFER = 1 << 3;
        const NULL_OUTPUT_BUFFER = 1 << 4;
        const INVALID_CMD_ID = 1 << 5;
        const INVALID_PARAM = 1 << 6;
        const INVALID_PARAMS_NUM = 1 << 7;
        const INVALID_SAMPLING_RATE = 1 << 8;
        const NOT_IMPLEMENTED = 1 << 9;
        const INVALID_MEMORY = 1 << 10;
        const ZERO_I = 1 << 11;
        const ZERO_V = 1 << 12;
        const MIN_RDC_BEYOND_THRESHOLD = 1 << 13;
        const MAX_RDC_BEYOND_THRESHOLD = 1 << 14;
        const MISMATCHED_SETGET_CMD = 1 << 15;
        const IV_DATA_WARNING = 1 << 16;
        const COIL_TEMPERATURE_WARNING = 1 << 17;
        const EXCURSION_WARNING = 1 << 18;
        const WRONG_COMMAND_TYPE = 1 << 19;
        const COMMAND_OBSOLETE = 1 << 20;
        const INSUFFICIENT_INPUT_DATA = 1 << 21;
        const FF_NOT_START = 1 << 22;
    }
}

/// Errors reported by an engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine returned status {0:?}")]
    Status(EngineStatus),

    #[error("engine not initialised")]
    NotInitialized,

    #[error("engine requires {requested} bytes, limit is {limit}")]
    MemoryLimit { requested: usize, limit: usize },

    #[error("engine frame size {0} is not usable")]
    BadFrameSize(usize),
}

/// Input to the memory-size query.
#[derive(Debug, Clone)]
pub struct EngineMemoryParams {
    pub sample_rate: u32,
    pub channels: usize,
    /// Circular buffer sizes in samples, four entries per channel; zero = unused.
    pub circular_buffer_sizes: Vec<i32>,
    pub num_eq_filters: usize,
}

/// Input to (and delayed-sample output from) engine initialisation.
#[derive(Debug, Clone)]
pub struct EngineInitParams {
    pub sample_rate: u32,
    pub channels: usize,
    /// Bits per sample the engine should expect; always 16 here.
    pub sample_bit_width: u32,
    pub circular_buffer_sizes: Vec<i32>,
    /// Filled in by the engine when circular buffers are used.
    pub delayed_samples: Vec<i32>,
}

/// Fixed frame sizes returned once by `init`, in samples per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFrameSizes {
    pub forward: usize,
    pub feedback: usize,
}

/// Result of one forward call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessCounts {
    /// Input samples the engine did not consume (normally 0).
    pub unconsumed: usize,
    /// Output samples written, all channels together.
    pub produced: usize,
}

/// Contract for speaker-protection backends.
pub trait ProtectionEngine: Send + 'static {
    /// Bytes of state memory the engine needs for this configuration.
    fn required_memory(&self, params: &EngineMemoryParams) -> Result<usize, EngineError>;

    /// Take ownership of the zeroed state memory and initialise.
    ///
    /// Returns the engine's fixed forward/feedback frame sizes.
    fn init(
        &mut self,
        params: &mut EngineInitParams,
        memory: Vec<u8>,
    ) -> Result<EngineFrameSizes, EngineError>;

    /// Process one forward frame.
    ///
    /// `input` and `output` hold one block per channel. `channel_mask` selects
    /// the active channels; 0 means all default channels.
    fn forward_process(
        &mut self,
        channel_mask: u32,
        input: &[i16],
        output: &mut [i16],
    ) -> Result<ProcessCounts, EngineError>;

    /// Feed one frame of current/voltage sense into the adaptive state.
    ///
    /// Returns the number of samples consumed across both blocks.
    fn feedback_process(
        &mut self,
        channel_mask: u32,
        current: &[i16],
        voltage: &[i16],
    ) -> Result<usize, EngineError>;
}

impl std::fmt::Debug for dyn ProtectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectionEngine").finish_non_exhaustive()
    }
}
