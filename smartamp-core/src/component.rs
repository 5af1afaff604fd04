//! `SmartAmp`: the pipeline component that drives a [`Session`] once per
//! host tick.
//!
//! ## Lifecycle
//!
//! ```text
//! SmartAmp::new(config, engine)   → session created, stopped
//!     └─► prepare(streams)        → session reset, stream shapes checked
//!         └─► start(feedback)     → feedback stream zeroed, running
//!             ├─► copy(...)       → one tick, repeated
//!             └─► stop()          → stopped, buffers kept until next prepare
//! ```
//!
//! `start()`/`stop()`/`copy()` in the wrong state return an error rather
//! than panicking.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    buffering::alloc_zeroed,
    engine::ProtectionEngine,
    error::{Result, SmartAmpError},
    format::FrameFormat,
    session::{should_report, FrameReport, ReframeDiagnostics, Session, SessionConfig},
    stream::{
        mux::{driven_slots, gather, scatter},
        AudioStream,
    },
};

/// What one `copy` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Frames taken from the source and written to the sink.
    pub frames: usize,
    pub forward_engine_calls: usize,
    pub feedback_engine_calls: usize,
    pub engine_errors: usize,
    /// A push was rejected; that period's input was dropped.
    pub overflow: bool,
    /// The sink period was zero-filled.
    pub underrun: bool,
}

impl TickReport {
    fn absorb(&mut self, report: FrameReport, feedback: bool) {
        if feedback {
            self.feedback_engine_calls += report.engine_calls;
        } else {
            self.forward_engine_calls += report.engine_calls;
        }
        self.engine_errors += report.engine_errors;
    }
}

pub struct SmartAmp {
    session: Session,
    running: bool,
    sink_slot_mask: u32,
    source_scratch: Vec<i32>,
    sink_scratch: Vec<i32>,
    feedback_scratch: Vec<i32>,
    ticks: u64,
}

impl std::fmt::Debug for SmartAmp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartAmp")
            .field("session", &self.session)
            .field("running", &self.running)
            .field("sink_slot_mask", &self.sink_slot_mask)
            .finish_non_exhaustive()
    }
}

impl SmartAmp {
    /// Create the session. Failure here is fatal for the component.
    pub fn new(config: SessionConfig, engine: Box<dyn ProtectionEngine>) -> Result<Self> {
        let sink_slot_mask = match config.sink_slot_mask {
            0 => (1u32 << config.channels.min(31)) - 1,
            mask => mask,
        };
        let session = Session::create(config, engine)?;
        Ok(Self {
            source_scratch: alloc_zeroed(session.forward_capacity(), "source scratch")?,
            sink_scratch: alloc_zeroed(session.forward_capacity(), "sink scratch")?,
            feedback_scratch: alloc_zeroed(session.feedback_capacity(), "feedback scratch")?,
            session,
            running: false,
            sink_slot_mask,
            ticks: 0,
        })
    }

    /// Reset the session and check the negotiated streams against it.
    pub fn prepare(
        &mut self,
        source: &AudioStream,
        feedback: Option<&AudioStream>,
        sink: &AudioStream,
    ) -> Result<()> {
        if self.running {
            return Err(SmartAmpError::AlreadyRunning);
        }
        let config = self.session.config();
        let channels = config.channels;

        if source.channels() != channels {
            return Err(SmartAmpError::ChannelMismatch(format!(
                "source has {} channels, session runs {channels}",
                source.channels()
            )));
        }
        expect_format(source, config.forward_format, "source")?;
        expect_format(sink, config.forward_format, "sink")?;

        let driven = driven_slots(self.sink_slot_mask, sink.channels());
        if driven != channels {
            return Err(SmartAmpError::ChannelMismatch(format!(
                "sink slot mask {:#x} drives {driven} of {} slots, session runs {channels}",
                self.sink_slot_mask,
                sink.channels()
            )));
        }

        if let Some(fb) = feedback {
            expect_feedback(fb, config)?;
        }

        self.session.reset()?;
        self.ticks = 0;
        info!(
            source_channels = source.channels(),
            sink_channels = sink.channels(),
            feedback = feedback.is_some(),
            "smart amp prepared"
        );
        Ok(())
    }

    pub fn start(&mut self, feedback: Option<&mut AudioStream>) -> Result<()> {
        if self.running {
            return Err(SmartAmpError::AlreadyRunning);
        }
        if let Some(fb) = feedback {
            fb.zero();
        }
        self.running = true;
        info!("smart amp started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Err(SmartAmpError::NotRunning);
        }
        self.running = false;
        info!(ticks = self.ticks, "smart amp stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run one tick.
    ///
    /// Feedback, when supplied, is processed first. Overflow, underrun and
    /// engine failures are absorbed into the returned [`TickReport`]; format
    /// and geometry errors propagate.
    pub fn copy(
        &mut self,
        source: &mut AudioStream,
        feedback: Option<&mut AudioStream>,
        sink: &mut AudioStream,
    ) -> Result<TickReport> {
        if !self.running {
            return Err(SmartAmpError::NotRunning);
        }
        let channels = self.session.geometry().channels;
        let diag = self.session.diagnostics();

        let mut frames = source
            .avail_frames()
            .min(sink.free_frames())
            .min(self.session.forward_capacity() / channels);
        if let Some(fb) = feedback.as_deref() {
            expect_feedback(fb, self.session.config())?;
            frames = frames
                .min(fb.avail_frames())
                .min(self.session.feedback_capacity() / fb.channels().max(1));
        }

        let mut report = TickReport {
            frames,
            ..Default::default()
        };
        ReframeDiagnostics::bump(&diag.ticks, 1);
        if frames == 0 {
            return Ok(report);
        }
        ReframeDiagnostics::bump(&diag.frames_in, frames as u64);

        if let Some(fb) = feedback {
            let n = frames * fb.channels();
            let iv = &mut self.feedback_scratch[..n];
            gather(fb, frames, fb.channels(), iv)?;
            match self.session.push_feedback(iv) {
                Ok(r) => report.absorb(r, true),
                Err(SmartAmpError::Overflow { .. }) => report.overflow = true,
                Err(e) => return Err(e),
            }
            fb.consume_frames(frames);
        }

        let n = frames * channels;
        let input = &mut self.source_scratch[..n];
        gather(source, frames, channels, input)?;
        match self.session.push_forward(input) {
            Ok(r) => report.absorb(r, false),
            Err(SmartAmpError::Overflow { .. }) => report.overflow = true,
            Err(e) => return Err(e),
        }

        let output = &mut self.sink_scratch[..n];
        match self.session.pull_forward(output) {
            Ok(()) => {}
            Err(SmartAmpError::Underrun { .. }) => report.underrun = true,
            Err(e) => return Err(e),
        }
        scatter(output, sink, frames, sink.channels(), self.sink_slot_mask)?;

        source.consume_frames(frames);
        sink.produce_frames(frames);

        if should_report(self.ticks) {
            debug!(tick = self.ticks, ?report, "smart amp copy");
        }
        self.ticks += 1;
        Ok(report)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn diagnostics(&self) -> Arc<ReframeDiagnostics> {
        self.session.diagnostics()
    }

    /// Sink slots the engine output is written to.
    pub fn sink_slot_mask(&self) -> u32 {
        self.sink_slot_mask
    }
}

fn expect_format(stream: &AudioStream, expected: FrameFormat, which: &str) -> Result<()> {
    if stream.frame_format() != expected {
        return Err(SmartAmpError::UnsupportedFormat(format!(
            "{which} stream declares {}, session expects {expected}",
            stream.frame_format()
        )));
    }
    Ok(())
}

/// Feedback slots must match the I/V layout and the declared format.
fn expect_feedback(fb: &AudioStream, config: &SessionConfig) -> Result<()> {
    let slots = config.iv_layout.slots_per_frame(config.channels);
    if fb.channels() != slots {
        return Err(SmartAmpError::ChannelMismatch(format!(
            "feedback has {} slots, {:?} needs {slots}",
            fb.channels(),
            config.iv_layout
        )));
    }
    expect_format(fb, config.feedback_format, "feedback")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PassthroughEngine;

    fn amp(config: SessionConfig) -> SmartAmp {
        SmartAmp::new(config, Box::new(PassthroughEngine::new(240, 240))).unwrap()
    }

    fn streams() -> (AudioStream, AudioStream, AudioStream) {
        (
            AudioStream::new(192, 2, FrameFormat::S32Le),
            AudioStream::new(192, 4, FrameFormat::S32Le),
            AudioStream::new(192, 2, FrameFormat::S32Le),
        )
    }

    #[test]
    fn copy_requires_start() {
        let mut a = amp(SessionConfig::default());
        let (mut src, _, mut sink) = streams();
        assert!(matches!(
            a.copy(&mut src, None, &mut sink),
            Err(SmartAmpError::NotRunning)
        ));
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut a = amp(SessionConfig::default());
        a.start(None).unwrap();
        assert!(matches!(a.start(None), Err(SmartAmpError::AlreadyRunning)));
        a.stop().unwrap();
        assert!(matches!(a.stop(), Err(SmartAmpError::NotRunning)));
    }

    #[test]
    fn start_zeroes_feedback_stream() {
        let mut a = amp(SessionConfig::default());
        let (_, mut fb, _) = streams();
        fb.write_interleaved(&[7; 8]);
        a.start(Some(&mut fb)).unwrap();
        let mut out = [1i32; 8];
        fb.read_interleaved(&mut out);
        assert_eq!(out, [0; 8]);
    }

    #[test]
    fn prepare_checks_stream_shapes() {
        let mut a = amp(SessionConfig::default());
        let (src, fb, sink) = streams();
        a.prepare(&src, Some(&fb), &sink).unwrap();

        let mono = AudioStream::new(192, 1, FrameFormat::S32Le);
        assert!(matches!(
            a.prepare(&mono, None, &sink),
            Err(SmartAmpError::ChannelMismatch(_))
        ));
        assert!(matches!(
            a.prepare(&src, Some(&sink), &sink),
            Err(SmartAmpError::ChannelMismatch(_))
        ));

        let s16 = AudioStream::new(192, 2, FrameFormat::S16Le);
        assert!(matches!(
            a.prepare(&s16, None, &sink),
            Err(SmartAmpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn copy_rejects_misshapen_feedback() {
        let mut a = amp(SessionConfig::default());
        let (mut src, mut fb, mut sink) = streams();
        a.prepare(&src, Some(&fb), &sink).unwrap();
        a.start(Some(&mut fb)).unwrap();
        src.write_interleaved(&[0; 96]);

        let mut two_slots = AudioStream::new(192, 2, FrameFormat::S32Le);
        two_slots.write_interleaved(&[0; 96]);
        assert!(matches!(
            a.copy(&mut src, Some(&mut two_slots), &mut sink),
            Err(SmartAmpError::ChannelMismatch(_))
        ));

        let mut s16 = AudioStream::new(192, 4, FrameFormat::S16Le);
        s16.write_interleaved(&[0; 192]);
        assert!(matches!(
            a.copy(&mut src, Some(&mut s16), &mut sink),
            Err(SmartAmpError::UnsupportedFormat(_))
        ));

        // Nothing moved on either rejection.
        assert_eq!(src.avail_frames(), 48);
        assert_eq!(two_slots.avail_frames(), 48);
        assert_eq!(a.session().forward_buffered(), 0);
    }

    #[test]
    fn sink_mask_must_drive_session_channels() {
        let mut a = amp(SessionConfig {
            sink_slot_mask: 0b0001,
            ..Default::default()
        });
        let (src, _, _) = streams();
        let sink = AudioStream::new(192, 4, FrameFormat::S32Le);
        assert!(matches!(
            a.prepare(&src, None, &sink),
            Err(SmartAmpError::ChannelMismatch(_))
        ));
    }

    #[test]
    fn default_sink_mask_is_lowest_channels() {
        assert_eq!(amp(SessionConfig::default()).sink_slot_mask(), 0b11);
    }

    #[test]
    fn tick_cadence_matches_engine_frame() {
        let mut a = amp(SessionConfig::default());
        let (mut src, mut fb, mut sink) = streams();
        a.prepare(&src, Some(&fb), &sink).unwrap();
        a.start(Some(&mut fb)).unwrap();

        let mut reports = Vec::new();
        for tick in 0..10 {
            let period: Vec<i32> = (0..96).map(|i| (tick * 96 + i) << 16).collect();
            src.write_interleaved(&period);
            fb.write_interleaved(&[0; 192]);
            reports.push(a.copy(&mut src, Some(&mut fb), &mut sink).unwrap());
            let mut drained = [0i32; 96];
            sink.read_interleaved(&mut drained);
        }

        assert!(reports.iter().all(|r| r.frames == 48));
        let forward_calls: usize = reports.iter().map(|r| r.forward_engine_calls).sum();
        let feedback_calls: usize = reports.iter().map(|r| r.feedback_engine_calls).sum();
        assert_eq!(forward_calls, 2);
        assert_eq!(feedback_calls, 2);
        assert!(reports[0].underrun);
        assert!(!reports[4].underrun);

        let snap = a.diagnostics().snapshot();
        assert_eq!(snap.ticks, 10);
        assert_eq!(snap.frames_in, 480);
    }

    #[test]
    fn unused_sink_slots_are_silent() {
        let mut a = amp(SessionConfig {
            sink_slot_mask: 0b0011,
            ..Default::default()
        });
        let period: Vec<i32> = (1..=96).map(|v| v << 16).collect();
        let mut src = AudioStream::new(96, 2, FrameFormat::S32Le);
        let mut sink = AudioStream::new(96, 4, FrameFormat::S32Le);
        a.prepare(&src, None, &sink).unwrap();
        a.start(None).unwrap();

        let mut out = vec![9i32; 192];
        for _ in 0..5 {
            src.write_interleaved(&period);
            a.copy(&mut src, None, &mut sink).unwrap();
            assert_eq!(sink.read_interleaved(&mut out), 48);
        }
        for (i, frame) in out.chunks(4).enumerate() {
            assert_eq!(frame[0], period[2 * i]);
            assert_eq!(frame[1], period[2 * i + 1]);
            assert_eq!(&frame[2..], &[0, 0]);
        }
    }
}
