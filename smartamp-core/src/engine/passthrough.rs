//! `PassthroughEngine`: stand-in backend that copies forward frames through
//! unchanged.
//!
//! Used where the vendor library is unavailable: tests, the bench binary,
//! bring-up on a new host. It honours the same contract as the real engine
//! (must be initialised, fixed frame sizes, block layout) so reframing bugs
//! still surface against it.

use tracing::debug;

use super::{
    EngineError, EngineFrameSizes, EngineInitParams, EngineMemoryParams, EngineStatus,
    ProcessCounts, ProtectionEngine,
};

/// Fixed state size requested per channel, in bytes.
const STATE_BYTES_PER_CHANNEL: usize = 4096;
const REPORT_EVERY: u64 = 200;

/// Identity engine with configurable frame sizes.
#[derive(Debug)]
pub struct PassthroughEngine {
    frame_sizes: EngineFrameSizes,
    memory: Vec<u8>,
    initialized: bool,
    forward_frames: u64,
    feedback_frames: u64,
}

impl PassthroughEngine {
    /// Engine reporting `forward` / `feedback` samples per channel per frame.
    pub fn new(forward: usize, feedback: usize) -> Self {
        Self {
            frame_sizes: EngineFrameSizes { forward, feedback },
            memory: Vec::new(),
            initialized: false,
            forward_frames: 0,
            feedback_frames: 0,
        }
    }
}

impl Default for PassthroughEngine {
    /// 240 samples per channel on both paths (5 ms at 48 kHz).
    fn default() -> Self {
        Self::new(240, 240)
    }
}

impl ProtectionEngine for PassthroughEngine {
    fn required_memory(&self, params: &EngineMemoryParams) -> Result<usize, EngineError> {
        if params.channels == 0 {
            return Err(EngineError::Status(EngineStatus::INVALID_PARAM));
        }
        let circ: usize = params
            .circular_buffer_sizes
            .iter()
            .map(|&s| s.max(0) as usize * std::mem::size_of::<i16>())
            .sum();
        Ok(params.channels * STATE_BYTES_PER_CHANNEL + circ)
    }

    fn init(
        &mut self,
        params: &mut EngineInitParams,
        memory: Vec<u8>,
    ) -> Result<EngineFrameSizes, EngineError> {
        if params.sample_bit_width != 16 {
            return Err(EngineError::Status(EngineStatus::INVALID_PARAM));
        }
        if params.sample_rate == 0 {
            return Err(EngineError::Status(EngineStatus::INVALID_SAMPLING_RATE));
        }
        // No internal delay line: nothing is held back.
        params.delayed_samples.iter_mut().for_each(|d| *d = 0);
        debug!(
            memory_bytes = memory.len(),
            forward = self.frame_sizes.forward,
            feedback = self.frame_sizes.feedback,
            "PassthroughEngine::init"
        );
        self.memory = memory;
        self.initialized = true;
        self.forward_frames = 0;
        self.feedback_frames = 0;
        Ok(self.frame_sizes)
    }

    fn forward_process(
        &mut self,
        _channel_mask: u32,
        input: &[i16],
        output: &mut [i16],
    ) -> Result<ProcessCounts, EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        if output.len() < input.len() {
            return Err(EngineError::Status(EngineStatus::NULL_OUTPUT_BUFFER));
        }
        output[..input.len()].copy_from_slice(input);
        self.forward_frames += 1;
        if self.forward_frames % REPORT_EVERY == 0 {
            debug!(
                frames = self.forward_frames,
                memory_bytes = self.memory.len(),
                "passthrough forward"
            );
        }
        Ok(ProcessCounts {
            unconsumed: 0,
            produced: input.len(),
        })
    }

    fn feedback_process(
        &mut self,
        _channel_mask: u32,
        current: &[i16],
        voltage: &[i16],
    ) -> Result<usize, EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        if current.len() != voltage.len() {
            return Err(EngineError::Status(EngineStatus::IV_DATA_WARNING));
        }
        self.feedback_frames += 1;
        if self.feedback_frames % REPORT_EVERY == 0 {
            debug!(frames = self.feedback_frames, "passthrough feedback");
        }
        Ok(current.len() + voltage.len())
    }
}
