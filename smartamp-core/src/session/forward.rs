//! Forward (loudspeaker) path: host periods in, engine frames through, host
//! periods out.
//!
//! ```text
//! push(n) ─► input region ──(engine frame)──► engine ──► ready region ─► pull(m)
//!               ▲   │                                         │
//!               └───┴── residue shifted via staging ──────────┘
//! ```
//!
//! A host period may be at most two engine frames. The input region keeps
//! one frame of headroom on top of that for residue, and the ready region
//! holds five frames so that lockstep push/pull at any admissible period
//! never leaves a complete frame stranded. `push` rejects anything larger,
//! and `pull` zero-fills when the ready region is short.

use tracing::{debug, warn};

use super::{diagnostics::ReframeDiagnostics, should_report, FrameReport, StartupPolicy};
use crate::{
    buffering::{
        alloc_zeroed,
        layout::{blocks_to_interleaved, interleaved_to_blocks},
        RingRegion, Staging,
    },
    engine::ProtectionEngine,
    error::{Result, SmartAmpError},
    format::SampleWidth,
};

#[derive(Debug)]
pub struct ForwardReframer {
    input: RingRegion,
    ready: RingRegion,
    stage: Staging,
    block_in: Vec<i16>,
    block_out: Vec<i16>,
    /// Samples per channel in one engine frame.
    engine_frame: usize,
    channels: usize,
    width: SampleWidth,
    channel_mask: u32,
    /// Largest period accepted by one push, in samples.
    double: usize,
    seq: u64,
}

impl ForwardReframer {
    pub fn new(
        engine_frame: usize,
        channels: usize,
        width: SampleWidth,
        channel_mask: u32,
    ) -> Result<Self> {
        let frame_samples = engine_frame * channels;
        Ok(Self {
            input: RingRegion::with_capacity(frame_samples * 3)?,
            ready: RingRegion::with_capacity(frame_samples * 5)?,
            stage: Staging::with_capacity(frame_samples * 5)?,
            block_in: alloc_zeroed(frame_samples, "forward input block")?,
            block_out: alloc_zeroed(frame_samples, "forward output block")?,
            engine_frame,
            channels,
            width,
            channel_mask,
            double: frame_samples * 2,
            seq: 0,
        })
    }

    /// Samples (all channels) in one engine frame.
    pub fn frame_samples(&self) -> usize {
        self.engine_frame * self.channels
    }

    /// Largest period one push accepts, in samples.
    pub fn double_capacity(&self) -> usize {
        self.double
    }

    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    pub fn ready(&self) -> usize {
        self.ready.len()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Zero both regions and the counter, then prime per `policy`.
    pub fn reset(&mut self, policy: StartupPolicy) -> Result<()> {
        self.input.clear();
        self.ready.clear();
        self.block_in.fill(0);
        self.block_out.fill(0);
        self.seq = 0;
        let frame = self.frame_samples();
        match policy {
            StartupPolicy::Cold => Ok(()),
            StartupPolicy::PrefillReady => self.ready.prefill_silence(frame),
            StartupPolicy::PrefillInput => self.input.prefill_silence(frame),
        }
    }

    /// Append one host period of interleaved samples and run the engine on
    /// every complete frame.
    ///
    /// Frames held back by an earlier push (ready region full at the time)
    /// are processed first. Rejects the whole period with
    /// [`SmartAmpError::Overflow`] when it does not fit; nothing is copied in
    /// that case.
    pub fn push(
        &mut self,
        engine: &mut dyn ProtectionEngine,
        samples: &[i32],
        diag: &ReframeDiagnostics,
    ) -> Result<FrameReport> {
        if samples.len() > self.double {
            return Err(SmartAmpError::Overflow {
                requested: samples.len(),
                cursor: self.input.len(),
                capacity: self.double,
            });
        }

        let mut report = FrameReport::default();
        self.process(engine, diag, &mut report)?;
        self.input.append(samples)?;
        self.process(engine, diag, &mut report)?;
        Ok(report)
    }

    /// Run the engine on complete frames while the ready region has room.
    fn process(
        &mut self,
        engine: &mut dyn ProtectionEngine,
        diag: &ReframeDiagnostics,
        report: &mut FrameReport,
    ) -> Result<()> {
        let frame = self.frame_samples();
        while self.input.len() >= frame {
            if self.ready.free() < frame {
                warn!(
                    ready = self.ready.len(),
                    buffered = self.input.len(),
                    "forward ready region full, holding input"
                );
                break;
            }

            interleaved_to_blocks(
                self.input.head(frame),
                self.engine_frame,
                self.channels,
                self.width,
                &mut self.block_in,
            );
            self.block_out.fill(0);

            ReframeDiagnostics::bump(&diag.forward_engine_calls, 1);
            report.engine_calls += 1;
            match engine.forward_process(self.channel_mask, &self.block_in, &mut self.block_out) {
                Ok(counts) => {
                    if counts.unconsumed > 0 && should_report(self.seq) {
                        warn!(
                            seq = self.seq,
                            unconsumed = counts.unconsumed,
                            "engine left input unconsumed, dropping it with the frame"
                        );
                    }
                    if counts.produced != frame && should_report(self.seq) {
                        debug!(
                            seq = self.seq,
                            produced = counts.produced,
                            expected = frame,
                            "engine produced a short frame"
                        );
                    }
                    let (engine_frame, channels, width) =
                        (self.engine_frame, self.channels, self.width);
                    let block_out = &self.block_out;
                    self.ready.append_with(frame, |dst| {
                        blocks_to_interleaved(block_out, engine_frame, channels, width, dst)
                    })?;
                }
                Err(e) => {
                    ReframeDiagnostics::bump(&diag.engine_errors, 1);
                    report.engine_errors += 1;
                    warn!(
                        seq = self.seq,
                        error = %e,
                        "forward engine call failed, emitting silence"
                    );
                    self.ready.prefill_silence(frame)?;
                }
            }

            self.input.consume_front(frame, &mut self.stage);
            if should_report(self.seq) {
                debug!(
                    seq = self.seq,
                    buffered = self.input.len(),
                    ready = self.ready.len(),
                    "forward frame"
                );
            }
            self.seq += 1;
        }
        Ok(())
    }

    /// Fill `out` with the oldest ready samples.
    ///
    /// When fewer than `out.len()` samples are ready the whole of `out` is
    /// zeroed, the ready region is left alone and `Underrun` is returned.
    pub fn pull(&mut self, out: &mut [i32]) -> Result<()> {
        let requested = out.len();
        let ready = self.ready.len();
        if ready < requested {
            out.fill(0);
            return Err(SmartAmpError::Underrun { requested, ready });
        }
        out.copy_from_slice(self.ready.head(requested));
        self.ready.consume_front(requested, &mut self.stage);
        Ok(())
    }
}
