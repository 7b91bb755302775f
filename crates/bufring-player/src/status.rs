use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the engine thread and the device callback.
///
/// All updates are relaxed; readers get a best-effort snapshot.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    buffers_submitted: AtomicU64,
    buffers_completed: AtomicU64,
    frames_played: AtomicU64,
    underrun_frames: AtomicU64,
    underrun_events: AtomicU64,
    late_refills: AtomicU64,
}

/// Point-in-time copy of [`PlaybackStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub buffers_submitted: u64,
    pub buffers_completed: u64,
    pub frames_played: u64,
    pub underrun_frames: u64,
    pub underrun_events: u64,
    pub late_refills: u64,
}

impl PlaybackStats {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_submit(&self) {
        self.buffers_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.buffers_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_played(&self, frames: u64) {
        if frames > 0 {
            self.frames_played.fetch_add(frames, Ordering::Relaxed);
        }
    }

    /// One underrun event covering `frames` frames of silence.
    pub fn record_underrun(&self, frames: u64) {
        self.underrun_events.fetch_add(1, Ordering::Relaxed);
        self.underrun_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn record_late_refill(&self) {
        self.late_refills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            buffers_submitted: self.buffers_submitted.load(Ordering::Relaxed),
            buffers_completed: self.buffers_completed.load(Ordering::Relaxed),
            frames_played: self.frames_played.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            underrun_events: self.underrun_events.load(Ordering::Relaxed),
            late_refills: self.late_refills.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Milliseconds of audio played at `sample_rate`.
    pub fn elapsed_ms(&self, sample_rate: u32) -> Option<u64> {
        if sample_rate == 0 {
            return None;
        }
        Some(self.frames_played.saturating_mul(1000) / u64::from(sample_rate))
    }
}
