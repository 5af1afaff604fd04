//! Feedback (current/voltage sense) path.
//!
//! Same accumulation as the forward path, but nothing comes back out: each
//! full frame is split into current and voltage blocks and handed to the
//! engine's adaptive state. A frame carries two sense slots per speaker
//! channel, so every call moves twice the forward sample count.

use tracing::{debug, warn};

use super::{diagnostics::ReframeDiagnostics, should_report, FrameReport};
use crate::{
    buffering::{
        alloc_zeroed,
        layout::{split_iv, IvLayout},
        RingRegion, Staging,
    },
    engine::ProtectionEngine,
    error::Result,
    format::SampleWidth,
};

#[derive(Debug)]
pub struct FeedbackReframer {
    input: RingRegion,
    stage: Staging,
    current: Vec<i16>,
    voltage: Vec<i16>,
    engine_frame: usize,
    channels: usize,
    layout: IvLayout,
    width: SampleWidth,
    channel_mask: u32,
    seq: u64,
}

impl FeedbackReframer {
    pub fn new(
        engine_frame: usize,
        channels: usize,
        layout: IvLayout,
        width: SampleWidth,
        channel_mask: u32,
    ) -> Result<Self> {
        let frame_samples = engine_frame * layout.slots_per_frame(channels);
        Ok(Self {
            input: RingRegion::with_capacity(frame_samples * 2)?,
            stage: Staging::with_capacity(frame_samples * 2)?,
            current: alloc_zeroed(engine_frame * channels, "feedback current block")?,
            voltage: alloc_zeroed(engine_frame * channels, "feedback voltage block")?,
            engine_frame,
            channels,
            layout,
            width,
            channel_mask,
            seq: 0,
        })
    }

    /// Samples in one feedback frame, current and voltage slots together.
    pub fn frame_samples(&self) -> usize {
        self.engine_frame * self.layout.slots_per_frame(self.channels)
    }

    pub fn double_capacity(&self) -> usize {
        self.input.capacity()
    }

    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn reset(&mut self) {
        self.input.clear();
        self.current.fill(0);
        self.voltage.fill(0);
        self.seq = 0;
    }

    /// Append interleaved sense frames and feed every complete engine frame.
    pub fn push(
        &mut self,
        engine: &mut dyn ProtectionEngine,
        samples: &[i32],
        diag: &ReframeDiagnostics,
    ) -> Result<FrameReport> {
        self.input.append(samples)?;

        let frame = self.frame_samples();
        let mut report = FrameReport::default();
        while self.input.len() >= frame {
            split_iv(
                self.input.head(frame),
                self.engine_frame,
                self.channels,
                self.layout,
                self.width,
                &mut self.current,
                &mut self.voltage,
            );

            ReframeDiagnostics::bump(&diag.feedback_engine_calls, 1);
            report.engine_calls += 1;
            match engine.feedback_process(self.channel_mask, &self.current, &self.voltage) {
                Ok(consumed) => {
                    if should_report(self.seq) {
                        debug!(seq = self.seq, consumed, buffered = self.input.len(), "feedback frame");
                    }
                }
                Err(e) => {
                    ReframeDiagnostics::bump(&diag.engine_errors, 1);
                    report.engine_errors += 1;
                    warn!(seq = self.seq, error = %e, "feedback engine call failed, frame dropped");
                }
            }

            self.input.consume_front(frame, &mut self.stage);
            self.seq += 1;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::engine::{
        EngineError, EngineFrameSizes, EngineInitParams, EngineMemoryParams, EngineStatus,
        ProcessCounts,
    };
    use crate::error::SmartAmpError;

    /// Records every block pair it is fed.
    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<(Vec<i16>, Vec<i16>)>>>,
        fail: bool,
    }

    impl ProtectionEngine for Recorder {
        fn required_memory(&self, _: &EngineMemoryParams) -> std::result::Result<usize, EngineError> {
            Ok(0)
        }
        fn init(
            &mut self,
            _: &mut EngineInitParams,
            _: Vec<u8>,
        ) -> std::result::Result<EngineFrameSizes, EngineError> {
            Ok(EngineFrameSizes { forward: 2, feedback: 2 })
        }
        fn forward_process(
            &mut self,
            _: u32,
            _: &[i16],
            _: &mut [i16],
        ) -> std::result::Result<ProcessCounts, EngineError> {
            Ok(ProcessCounts::default())
        }
        fn feedback_process(
            &mut self,
            _: u32,
            current: &[i16],
            voltage: &[i16],
        ) -> std::result::Result<usize, EngineError> {
            self.seen.lock().unwrap().push((current.to_vec(), voltage.to_vec()));
            if self.fail {
                return Err(EngineError::Status(EngineStatus::ZERO_V));
            }
            Ok(current.len() + voltage.len())
        }
    }

    #[test]
    fn frame_is_twice_the_forward_count() {
        let fb = FeedbackReframer::new(240, 2, IvLayout::Interleaved16, SampleWidth::Width32Shifted, 0)
            .unwrap();
        assert_eq!(fb.frame_samples(), 960);
        assert_eq!(fb.double_capacity(), 1920);
    }

    #[test]
    fn quads_reach_engine_as_current_and_voltage_blocks() {
        let mut engine = Recorder::default();
        let seen = Arc::clone(&engine.seen);
        let diag = ReframeDiagnostics::default();
        let mut fb =
            FeedbackReframer::new(2, 2, IvLayout::Interleaved16, SampleWidth::Width16, 0).unwrap();

        // Two frames of [c0 v0 c1 v1].
        let report = fb
            .push(&mut engine, &[1, 5, 2, 6, 3, 7, 4, 8], &diag)
            .unwrap();
        assert_eq!(report.engine_calls, 1);
        assert_eq!(fb.buffered(), 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, vec![1, 3, 2, 4]);
        assert_eq!(seen[0].1, vec![5, 7, 6, 8]);
    }

    #[test]
    fn partial_frame_waits_for_more_input() {
        let mut engine = Recorder::default();
        let diag = ReframeDiagnostics::default();
        let mut fb =
            FeedbackReframer::new(2, 2, IvLayout::Interleaved16, SampleWidth::Width16, 0).unwrap();

        fb.push(&mut engine, &[1, 5, 2, 6], &diag).unwrap();
        assert_eq!(diag.snapshot().feedback_engine_calls, 0);
        fb.push(&mut engine, &[3, 7, 4, 8, 9, 9], &diag).unwrap();
        assert_eq!(diag.snapshot().feedback_engine_calls, 1);
        assert_eq!(fb.buffered(), 2);
        assert_eq!(fb.seq(), 1);
    }

    #[test]
    fn overflow_rejects_whole_period() {
        let mut engine = Recorder::default();
        let diag = ReframeDiagnostics::default();
        let mut fb =
            FeedbackReframer::new(2, 1, IvLayout::Interleaved16, SampleWidth::Width16, 0).unwrap();
        assert_eq!(fb.double_capacity(), 8);
        let err = fb.push(&mut engine, &[0; 9], &diag).unwrap_err();
        assert!(matches!(err, SmartAmpError::Overflow { .. }));
        assert_eq!(fb.buffered(), 0);
    }

    #[test]
    fn engine_failure_still_consumes_the_frame() {
        let mut engine = Recorder {
            fail: true,
            ..Default::default()
        };
        let diag = ReframeDiagnostics::default();
        let mut fb =
            FeedbackReframer::new(2, 1, IvLayout::Interleaved16, SampleWidth::Width16, 0).unwrap();
        let report = fb.push(&mut engine, &[1, 2, 3, 4], &diag).unwrap();
        assert_eq!(report.engine_errors, 1);
        assert_eq!(fb.buffered(), 0);
        assert_eq!(diag.snapshot().engine_errors, 1);
    }
}
