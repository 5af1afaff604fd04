//! # smartamp-core
//!
//! Frame reframing and double buffering between a host audio pipeline and a
//! fixed-frame speaker-protection engine.
//!
//! ## Architecture
//!
//! ```text
//! source AudioStream ─► gather ─► ForwardReframer ─► ProtectionEngine::forward_process
//!                                      │                          │
//!                                      │          ready region ◄──┘
//!                                      ▼
//!                          pull ─► scatter (slot mask) ─► sink AudioStream
//!
//! feedback AudioStream ─► gather ─► FeedbackReframer ─► ProtectionEngine::feedback_process
//! ```
//!
//! `SmartAmp` runs one tick of that graph per `copy`. All buffers are sized
//! from the engine's frame geometry when the session is created; the tick
//! path does not allocate.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod component;
pub mod engine;
pub mod error;
pub mod format;
pub mod session;
pub mod stream;

// Convenience re-exports for downstream crates
pub use buffering::layout::IvLayout;
pub use component::{SmartAmp, TickReport};
pub use engine::{EngineError, EngineStatus, PassthroughEngine, ProtectionEngine};
pub use error::{Result, SmartAmpError};
pub use format::{FrameFormat, SampleWidth};
pub use session::{DiagnosticsSnapshot, FrameGeometry, Session, SessionConfig, StartupPolicy};
pub use stream::AudioStream;
