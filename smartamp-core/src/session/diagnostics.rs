//! Per-session counters.
//!
//! Written from the tick with relaxed atomics; a control thread holding the
//! `Arc` can take a [`DiagnosticsSnapshot`] at any time without touching the
//! session itself.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct ReframeDiagnostics {
    pub ticks: AtomicU64,
    pub frames_in: AtomicU64,
    pub forward_engine_calls: AtomicU64,
    pub feedback_engine_calls: AtomicU64,
    pub engine_errors: AtomicU64,
    pub overflows: AtomicU64,
    pub underruns: AtomicU64,
    pub samples_emitted: AtomicU64,
}

impl ReframeDiagnostics {
    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.frames_in.store(0, Ordering::Relaxed);
        self.forward_engine_calls.store(0, Ordering::Relaxed);
        self.feedback_engine_calls.store(0, Ordering::Relaxed);
        self.engine_errors.store(0, Ordering::Relaxed);
        self.overflows.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.samples_emitted.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            forward_engine_calls: self.forward_engine_calls.load(Ordering::Relaxed),
            feedback_engine_calls: self.feedback_engine_calls.load(Ordering::Relaxed),
            engine_errors: self.engine_errors.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            samples_emitted: self.samples_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub ticks: u64,
    pub frames_in: u64,
    pub forward_engine_calls: u64,
    pub feedback_engine_calls: u64,
    pub engine_errors: u64,
    pub overflows: u64,
    pub underruns: u64,
    pub samples_emitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_zeroes_every_counter() {
        let d = ReframeDiagnostics::default();
        ReframeDiagnostics::bump(&d.ticks, 3);
        ReframeDiagnostics::bump(&d.underruns, 1);
        assert_eq!(d.snapshot().ticks, 3);
        d.reset();
        assert_eq!(d.snapshot(), DiagnosticsSnapshot::default());
    }

    #[test]
    fn snapshot_serializes_with_camel_case_fields() {
        let snap = DiagnosticsSnapshot {
            forward_engine_calls: 7,
            samples_emitted: 96,
            ..Default::default()
        };
        let json = serde_json::to_value(snap).expect("serialize snapshot");
        assert_eq!(json["forwardEngineCalls"], 7);
        assert_eq!(json["samplesEmitted"], 96);
    }
}
