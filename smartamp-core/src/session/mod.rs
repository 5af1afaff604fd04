//! `Session`: everything one pipeline instance needs between ticks.
//!
//! ## Lifecycle
//!
//! ```text
//! Session::create(config, engine)
//!     ├─ validate channels + formats
//!     ├─ engine.required_memory()  → zeroed state allocated
//!     ├─ engine.init()             → fixed forward / feedback frame sizes
//!     └─ regions sized from those frames, startup policy applied
//! Session::reset()                 → as freshly created, engine state kept
//! ```
//!
//! The engine lives exactly as long as the session. Nothing on the
//! `push_*` / `pull_*` path allocates.

pub mod diagnostics;
pub mod feedback;
pub mod forward;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    buffering::{alloc_zeroed, layout::IvLayout},
    engine::{EngineError, EngineInitParams, EngineMemoryParams, ProtectionEngine},
    error::{Result, SmartAmpError},
    format::{FrameFormat, SampleWidth},
};

pub use diagnostics::{DiagnosticsSnapshot, ReframeDiagnostics};
pub use feedback::FeedbackReframer;
pub use forward::ForwardReframer;

/// Circular buffer slots the engine exposes per channel.
pub const CIRCULAR_BUFFERS_PER_CHANNEL: usize = 4;

/// Per-frame reports are logged for the first few frames of a path and then
/// only periodically.
pub(crate) fn should_report(seq: u64) -> bool {
    seq < 20 || seq % 200 == 0
}

/// How the forward path is primed when a session starts or resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartupPolicy {
    /// Both regions empty. Output underruns until the first engine frame.
    #[default]
    Cold,
    /// Ready region holds one engine frame of silence.
    PrefillReady,
    /// Input region holds one engine frame of zeros, so the first push
    /// already runs the engine.
    PrefillInput,
}

/// Session configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub sample_rate: u32,
    /// Speaker channels, 1 or 2.
    pub channels: usize,
    pub forward_format: FrameFormat,
    pub feedback_format: FrameFormat,
    pub iv_layout: IvLayout,
    pub startup: StartupPolicy,
    /// Engine channel mask. 0 selects all default channels.
    pub channel_mask: u32,
    /// Sink slots the engine output drives. 0 selects the lowest
    /// `channels` slots.
    pub sink_slot_mask: u32,
    pub max_engine_memory_bytes: usize,
    pub num_eq_filters: usize,
    /// Four entries per channel, in samples; 0 marks a slot unused. An empty
    /// list leaves every slot unused.
    pub circular_buffer_sizes: Vec<i32>,
    /// Largest engine frame (samples per channel) the session will accept.
    pub max_frame_samples: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            forward_format: FrameFormat::S32Le,
            feedback_format: FrameFormat::S32Le,
            iv_layout: IvLayout::Interleaved16,
            startup: StartupPolicy::Cold,
            channel_mask: 0,
            sink_slot_mask: 0,
            max_engine_memory_bytes: 1 << 20,
            num_eq_filters: 8,
            circular_buffer_sizes: Vec::new(),
            max_frame_samples: 1024,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Circular buffer sizes expanded to four per channel.
    fn circular_buffers(&self) -> Result<Vec<i32>> {
        let expected = self.channels * CIRCULAR_BUFFERS_PER_CHANNEL;
        if self.circular_buffer_sizes.is_empty() {
            return Ok(vec![0; expected]);
        }
        if self.circular_buffer_sizes.len() != expected {
            return Err(SmartAmpError::InvalidGeometry(format!(
                "{} circular buffer sizes for {} channels, expected {expected}",
                self.circular_buffer_sizes.len(),
                self.channels
            )));
        }
        Ok(self.circular_buffer_sizes.clone())
    }
}

/// Frame sizes the session runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameGeometry {
    /// Frames per channel in the most recent host period; 0 before the
    /// first push.
    pub host_period: usize,
    /// Engine forward frame, samples per channel.
    pub engine_forward: usize,
    /// Engine feedback frame, samples per channel.
    pub engine_feedback: usize,
    pub channels: usize,
    pub iv_layout: IvLayout,
}

/// Counts from one push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub engine_calls: usize,
    pub engine_errors: usize,
}

pub struct Session {
    config: SessionConfig,
    engine: Box<dyn ProtectionEngine>,
    geometry: FrameGeometry,
    forward: ForwardReframer,
    feedback: FeedbackReframer,
    delayed_samples: Vec<i32>,
    diagnostics: Arc<ReframeDiagnostics>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("geometry", &self.geometry)
            .field("forward_seq", &self.forward.seq())
            .field("feedback_seq", &self.feedback.seq())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate `config`, initialise `engine` and allocate every region.
    pub fn create(config: SessionConfig, engine: Box<dyn ProtectionEngine>) -> Result<Self> {
        Self::build(config, engine).inspect_err(|e| error!(error = %e, "session create failed"))
    }

    fn build(config: SessionConfig, mut engine: Box<dyn ProtectionEngine>) -> Result<Self> {
        if !(1..=2).contains(&config.channels) {
            return Err(SmartAmpError::UnsupportedChannels(config.channels));
        }
        let forward_width = SampleWidth::try_from(config.forward_format)?;
        let feedback_width = SampleWidth::try_from(config.feedback_format)?;
        let circular_buffer_sizes = config.circular_buffers()?;

        let required = engine.required_memory(&EngineMemoryParams {
            sample_rate: config.sample_rate,
            channels: config.channels,
            circular_buffer_sizes: circular_buffer_sizes.clone(),
            num_eq_filters: config.num_eq_filters,
        })?;
        if required > config.max_engine_memory_bytes {
            return Err(EngineError::MemoryLimit {
                requested: required,
                limit: config.max_engine_memory_bytes,
            }
            .into());
        }
        let memory = alloc_zeroed::<u8>(required, "engine state")?;

        let mut params = EngineInitParams {
            sample_rate: config.sample_rate,
            channels: config.channels,
            sample_bit_width: 16,
            delayed_samples: vec![0; circular_buffer_sizes.len()],
            circular_buffer_sizes,
        };
        let sizes = engine.init(&mut params, memory)?;
        for size in [sizes.forward, sizes.feedback] {
            if size == 0 || size > config.max_frame_samples {
                return Err(EngineError::BadFrameSize(size).into());
            }
        }

        let forward =
            ForwardReframer::new(sizes.forward, config.channels, forward_width, config.channel_mask)?;
        let feedback = FeedbackReframer::new(
            sizes.feedback,
            config.channels,
            config.iv_layout,
            feedback_width,
            config.channel_mask,
        )?;

        let geometry = FrameGeometry {
            host_period: 0,
            engine_forward: sizes.forward,
            engine_feedback: sizes.feedback,
            channels: config.channels,
            iv_layout: config.iv_layout,
        };
        info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            forward_format = %config.forward_format,
            feedback_format = %config.feedback_format,
            engine_forward = sizes.forward,
            engine_feedback = sizes.feedback,
            engine_memory = required,
            startup = ?config.startup,
            "session created"
        );

        let mut session = Self {
            config,
            engine,
            geometry,
            forward,
            feedback,
            delayed_samples: params.delayed_samples,
            diagnostics: Arc::new(ReframeDiagnostics::default()),
        };
        session.forward.reset(session.config.startup)?;
        Ok(session)
    }

    /// Return every region, cursor, counter and diagnostic to its
    /// freshly-created state. The engine's internal state is not touched.
    pub fn reset(&mut self) -> Result<()> {
        self.forward.reset(self.config.startup)?;
        self.feedback.reset();
        self.geometry.host_period = 0;
        self.diagnostics.reset();
        info!(startup = ?self.config.startup, "session reset");
        Ok(())
    }

    /// Accumulate one interleaved host period on the forward path.
    pub fn push_forward(&mut self, samples: &[i32]) -> Result<FrameReport> {
        self.geometry.host_period = samples.len() / self.config.channels;
        self.forward
            .push(self.engine.as_mut(), samples, &self.diagnostics)
            .inspect_err(|e| {
                if let SmartAmpError::Overflow { .. } = e {
                    ReframeDiagnostics::bump(&self.diagnostics.overflows, 1);
                    warn!(error = %e, "forward push rejected");
                }
            })
    }

    /// Fill `out` with processed samples, zero-filling on underrun.
    pub fn pull_forward(&mut self, out: &mut [i32]) -> Result<()> {
        match self.forward.pull(out) {
            Ok(()) => {
                ReframeDiagnostics::bump(&self.diagnostics.samples_emitted, out.len() as u64);
                Ok(())
            }
            Err(e) => {
                if let SmartAmpError::Underrun { .. } = e {
                    ReframeDiagnostics::bump(&self.diagnostics.underruns, 1);
                    warn!(error = %e, "forward pull zero-filled");
                }
                Err(e)
            }
        }
    }

    /// Accumulate interleaved current/voltage frames on the feedback path.
    pub fn push_feedback(&mut self, samples: &[i32]) -> Result<FrameReport> {
        self.feedback
            .push(self.engine.as_mut(), samples, &self.diagnostics)
            .inspect_err(|e| {
                if let SmartAmpError::Overflow { .. } = e {
                    ReframeDiagnostics::bump(&self.diagnostics.overflows, 1);
                    warn!(error = %e, "feedback push rejected");
                }
            })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Per-buffer delays the engine reported at init.
    pub fn delayed_samples(&self) -> &[i32] {
        &self.delayed_samples
    }

    pub fn forward_seq(&self) -> u64 {
        self.forward.seq()
    }

    pub fn feedback_seq(&self) -> u64 {
        self.feedback.seq()
    }

    /// Forward input capacity in samples (two engine frames).
    pub fn forward_capacity(&self) -> usize {
        self.forward.double_capacity()
    }

    pub fn feedback_capacity(&self) -> usize {
        self.feedback.double_capacity()
    }

    pub fn forward_buffered(&self) -> usize {
        self.forward.buffered()
    }

    pub fn forward_ready(&self) -> usize {
        self.forward.ready()
    }

    pub fn feedback_buffered(&self) -> usize {
        self.feedback.buffered()
    }

    pub fn diagnostics(&self) -> Arc<ReframeDiagnostics> {
        Arc::clone(&self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PassthroughEngine;

    fn session(config: SessionConfig) -> Result<Session> {
        Session::create(config, Box::new(PassthroughEngine::new(240, 240)))
    }

    #[test]
    fn default_config_creates_stereo_session() {
        let s = session(SessionConfig::default()).unwrap();
        let g = s.geometry();
        assert_eq!(g.channels, 2);
        assert_eq!(g.engine_forward, 240);
        assert_eq!(s.forward_capacity(), 960);
        assert_eq!(s.feedback_capacity(), 1920);
        assert_eq!(s.delayed_samples(), &[0; 8]);
        assert_eq!(s.forward_buffered(), 0);
        assert_eq!(s.forward_ready(), 0);
    }

    #[test]
    fn rejects_unsupported_channel_counts() {
        for channels in [0, 3, 8] {
            let err = session(SessionConfig {
                channels,
                ..Default::default()
            })
            .unwrap_err();
            assert!(matches!(err, SmartAmpError::UnsupportedChannels(c) if c == channels));
        }
    }

    #[test]
    fn rejects_float_formats() {
        let err = session(SessionConfig {
            forward_format: FrameFormat::F32Le,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, SmartAmpError::UnsupportedFormat(_)));
    }

    #[test]
    fn enforces_engine_memory_limit() {
        let err = session(SessionConfig {
            max_engine_memory_bytes: 16,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SmartAmpError::Engine(EngineError::MemoryLimit { limit: 16, .. })
        ));
    }

    #[test]
    fn rejects_oversized_engine_frames() {
        let err = Session::create(
            SessionConfig::default(),
            Box::new(PassthroughEngine::new(4096, 240)),
        )
        .unwrap_err();
        assert!(matches!(err, SmartAmpError::Engine(EngineError::BadFrameSize(4096))));
    }

    #[test]
    fn circular_buffer_list_must_cover_every_channel() {
        let err = session(SessionConfig {
            circular_buffer_sizes: vec![0; 3],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, SmartAmpError::InvalidGeometry(_)));
    }

    #[test]
    fn end_to_end_240_frame_48_period() {
        let mut s = session(SessionConfig::default()).unwrap();
        let period: Vec<i32> = (1..=96).map(|v| v << 16).collect();
        for _ in 0..5 {
            s.push_forward(&period).unwrap();
        }
        assert_eq!(s.forward_seq(), 1);
        assert_eq!(s.geometry().host_period, 48);

        let mut out = vec![0i32; 96];
        for _ in 0..5 {
            s.pull_forward(&mut out).unwrap();
            assert_eq!(out, period);
        }
        out.fill(3);
        assert!(matches!(s.pull_forward(&mut out), Err(SmartAmpError::Underrun { .. })));
        assert!(out.iter().all(|&v| v == 0));

        let snap = s.diagnostics().snapshot();
        assert_eq!(snap.forward_engine_calls, 1);
        assert_eq!(snap.underruns, 1);
        assert_eq!(snap.samples_emitted, 480);
    }

    #[test]
    fn overflow_is_counted_and_leaves_state() {
        let mut s = session(SessionConfig::default()).unwrap();
        let err = s.push_forward(&vec![1; 961]).unwrap_err();
        assert!(matches!(err, SmartAmpError::Overflow { requested: 961, .. }));
        assert_eq!(s.forward_buffered(), 0);
        assert_eq!(s.diagnostics().snapshot().overflows, 1);
    }

    #[test]
    fn reset_returns_to_fresh_state() {
        let mut s = session(SessionConfig {
            startup: StartupPolicy::PrefillReady,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(s.forward_ready(), 480);

        s.push_forward(&vec![1; 500]).unwrap();
        s.push_feedback(&vec![1; 1000]).unwrap();
        assert_eq!(s.forward_seq(), 1);
        assert_eq!(s.feedback_seq(), 1);

        s.reset().unwrap();
        assert_eq!(s.forward_seq(), 0);
        assert_eq!(s.feedback_seq(), 0);
        assert_eq!(s.forward_buffered(), 0);
        assert_eq!(s.feedback_buffered(), 0);
        assert_eq!(s.forward_ready(), 480);
        assert_eq!(s.geometry().host_period, 0);
        assert_eq!(s.diagnostics().snapshot(), DiagnosticsSnapshot::default());
    }

    #[test]
    fn config_loads_from_camel_case_json() {
        let cfg = SessionConfig::from_json_str(
            r#"{
                "channels": 1,
                "forwardFormat": "s16le",
                "ivLayout": "voltage8",
                "startup": "prefillInput",
                "sinkSlotMask": 2
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.channels, 1);
        assert_eq!(cfg.forward_format, FrameFormat::S16Le);
        assert_eq!(cfg.feedback_format, FrameFormat::S32Le);
        assert_eq!(cfg.iv_layout, IvLayout::Voltage8);
        assert_eq!(cfg.startup, StartupPolicy::PrefillInput);
        assert_eq!(cfg.sink_slot_mask, 2);
        assert_eq!(cfg.sample_rate, 48_000);
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let err = SessionConfig::from_json_str("{\"channels\": \"two\"}").unwrap_err();
        assert!(matches!(err, SmartAmpError::Config(_)));
    }

    #[test]
    fn report_cadence() {
        assert!(should_report(0));
        assert!(should_report(19));
        assert!(!should_report(20));
        assert!(should_report(200));
        assert!(!should_report(201));
    }
}
