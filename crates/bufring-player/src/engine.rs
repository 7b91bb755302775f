//! Round-robin playback engine.
//!
//! The engine owns the buffer pool and the sample source. It reacts to device events:
//!
//! - `Opened`: allocate `N` silent buffers and submit all of them in index order. The
//!   source is not consulted yet, so the device starts with `N` buffers of lead time.
//! - `BufferCompleted`: take the buffer back, refill buffer `round_robin mod N` from the
//!   source and resubmit it, then advance `round_robin`.
//! - after [`PlaybackEngine::stop`]: completions are reclaimed but nothing is resubmitted.
//!
//! Every call happens on the thread that drains the session's event channel, so engine
//! state needs no locking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PlaybackConfig;
use crate::error::{DeviceError, PlayerError};
use crate::format::AudioFormat;
use crate::pool::{BufferPool, PcmBuffer};
use crate::session::{DeviceEvent, DeviceSession, SubmitError};
use crate::source::SampleSource;
use crate::status::PlaybackStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    PrimingSubmitted,
    Streaming,
    Stopped,
}

/// Position of the engine in the stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    /// Completions handled while streaming; the next refill targets `round_robin mod N`.
    pub round_robin: u64,
    /// Frames pulled from the source since the stream started. The source is rewound on
    /// open, so for a tone this equals the synthesizer's phase counter.
    pub sample_counter: i64,
}

pub struct PlaybackEngine<S> {
    source: S,
    format: AudioFormat,
    config: PlaybackConfig,
    pool: Option<BufferPool>,
    cursor: PlaybackCursor,
    state: EngineState,
    stats: Arc<PlaybackStats>,
    refill_budget: Duration,
}

impl<S: SampleSource> PlaybackEngine<S> {
    pub fn new(
        source: S,
        config: PlaybackConfig,
        stats: Arc<PlaybackStats>,
    ) -> Result<Self, PlayerError> {
        config.validate()?;
        let format = source.format();
        let refill_budget = format.frames_duration(config.frames_per_buffer) / 2;
        Ok(Self {
            source,
            format,
            config,
            pool: None,
            cursor: PlaybackCursor::default(),
            state: EngineState::Uninitialized,
            stats,
            refill_budget,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Buffers currently on loan to the device.
    pub fn outstanding(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::outstanding)
    }

    /// Playback time covered by one buffer.
    pub fn buffer_duration(&self) -> Duration {
        self.format.frames_duration(self.config.frames_per_buffer)
    }

    /// React to one device event.
    pub fn handle<D>(&mut self, event: DeviceEvent, session: &mut D) -> Result<(), PlayerError>
    where
        D: DeviceSession + ?Sized,
    {
        match event {
            DeviceEvent::Opened => self.on_opened(session),
            DeviceEvent::BufferCompleted(buffer) => self.on_completed(buffer, session),
            DeviceEvent::Closed => {
                tracing::debug!("device session closed");
                self.stop();
                Ok(())
            }
        }
    }

    /// Stop issuing submissions. Buffers still on loan come back through completions or
    /// through [`shutdown`](Self::shutdown).
    pub fn stop(&mut self) {
        if self.state != EngineState::Stopped {
            tracing::info!(
                round_robin = self.cursor.round_robin,
                outstanding = self.outstanding(),
                "playback stopping"
            );
            self.state = EngineState::Stopped;
        }
    }

    /// Take back buffers the session returned on close and free the pool.
    pub fn shutdown(&mut self, returned: Vec<PcmBuffer>) -> Result<(), PlayerError> {
        self.stop();
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };
        for buffer in returned {
            pool.reclaim(buffer)?;
        }
        pool.release()?;
        self.pool = None;
        Ok(())
    }

    fn on_opened<D>(&mut self, session: &mut D) -> Result<(), PlayerError>
    where
        D: DeviceSession + ?Sized,
    {
        if self.state != EngineState::Uninitialized {
            tracing::warn!(state = ?self.state, "ignoring repeated open notification");
            return Ok(());
        }
        self.source.rewind();
        self.cursor = PlaybackCursor::default();

        let bytes_per_buffer = self.config.bytes_per_buffer(&self.format);
        self.pool = Some(BufferPool::allocate(
            self.config.buffer_count,
            bytes_per_buffer,
        )?);
        self.state = EngineState::PrimingSubmitted;
        tracing::info!(
            buffers = self.config.buffer_count,
            bytes_per_buffer,
            buffer_ms = self.buffer_duration().as_secs_f64() * 1000.0,
            "priming device with silence"
        );

        for index in 0..self.config.buffer_count {
            let buffer = self.pool_mut()?.checkout(index)?;
            self.submit(buffer, session)?;
        }
        Ok(())
    }

    fn on_completed<D>(&mut self, buffer: PcmBuffer, session: &mut D) -> Result<(), PlayerError>
    where
        D: DeviceSession + ?Sized,
    {
        self.stats.record_completion();
        let done = self.pool_mut()?.reclaim(buffer)?;

        match self.state {
            EngineState::Stopped => return Ok(()),
            EngineState::PrimingSubmitted => {
                tracing::debug!("first completion; streaming");
                self.state = EngineState::Streaming;
            }
            _ => {}
        }

        let count = self.config.buffer_count as u64;
        let target = (self.cursor.round_robin % count) as usize;
        if target != done {
            tracing::warn!(target, completed = done, "completion arrived out of order");
        }

        let frames = self.config.frames_per_buffer;
        let align = self.format.block_align();
        let started = Instant::now();
        let source = &mut self.source;
        let written = self
            .pool
            .as_mut()
            .ok_or_else(no_pool)?
            .begin_refill(target)?
            .refill_with(|dest| source.produce(frames, dest));
        let elapsed = started.elapsed();
        self.cursor.sample_counter += (written / align) as i64;
        if elapsed > self.refill_budget {
            self.stats.record_late_refill();
            tracing::warn!(
                target,
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.refill_budget.as_micros() as u64,
                "refill exceeded real-time budget"
            );
        }

        let buffer = self.pool_mut()?.checkout(target)?;
        self.submit(buffer, session)?;
        self.cursor.round_robin += 1;
        Ok(())
    }

    fn submit<D>(&mut self, buffer: PcmBuffer, session: &mut D) -> Result<(), PlayerError>
    where
        D: DeviceSession + ?Sized,
    {
        match session.submit(buffer) {
            Ok(()) => {
                self.stats.record_submit();
                Ok(())
            }
            Err(SubmitError { buffer, reason }) => {
                self.pool_mut()?.reclaim(buffer)?;
                self.stop();
                Err(DeviceError::Stream(reason).into())
            }
        }
    }

    fn pool_mut(&mut self) -> Result<&mut BufferPool, PlayerError> {
        self.pool.as_mut().ok_or_else(no_pool)
    }
}

fn no_pool() -> PlayerError {
    PlayerError::Config("engine has no buffer pool".into())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::config::ToneConfig;
    use crate::pool::BufferState;
    use crate::source::{LoopingPcm, ToneSource};

    /// Session that keeps submissions queued until the test completes them.
    #[derive(Default)]
    struct QueueSession {
        queued: VecDeque<PcmBuffer>,
        submitted: Vec<(usize, Vec<u8>)>,
        reject: bool,
    }

    impl QueueSession {
        fn complete_next(&mut self) -> DeviceEvent {
            DeviceEvent::BufferCompleted(self.queued.pop_front().expect("nothing queued"))
        }
    }

    impl DeviceSession for QueueSession {
        fn submit(&mut self, buffer: PcmBuffer) -> Result<(), SubmitError> {
            if self.reject {
                return Err(SubmitError {
                    buffer,
                    reason: "device gone".into(),
                });
            }
            self.submitted.push((buffer.index(), buffer.bytes().to_vec()));
            self.queued.push_back(buffer);
            Ok(())
        }

        fn close(&mut self) -> Vec<PcmBuffer> {
            self.queued.drain(..).collect()
        }
    }

    fn tone_engine(buffers: usize) -> PlaybackEngine<ToneSource> {
        let source = ToneSource::new(AudioFormat::TONE_DEFAULT, &ToneConfig::default());
        let config = PlaybackConfig {
            buffer_count: buffers,
            frames_per_buffer: 512,
            drain_on_stop: false,
        };
        PlaybackEngine::new(source, config, PlaybackStats::shared()).unwrap()
    }

    #[test]
    fn open_primes_every_buffer_with_silence_in_order() {
        let mut engine = tone_engine(4);
        let mut session = QueueSession::default();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(engine.pool().is_none());

        engine.handle(DeviceEvent::Opened, &mut session).unwrap();

        assert_eq!(engine.state(), EngineState::PrimingSubmitted);
        let order: Vec<usize> = session.submitted.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        for (_, bytes) in &session.submitted {
            assert_eq!(bytes.len(), 2048);
            assert!(bytes.iter().all(|&b| b == 0));
        }
        assert_eq!(engine.outstanding(), 4);
        assert_eq!(engine.source().sample_counter(), 0);
    }

    #[test]
    fn refill_target_follows_completion_count_for_any_pool_size() {
        for n in 1..=6usize {
            let mut engine = tone_engine(n);
            let mut session = QueueSession::default();
            engine.handle(DeviceEvent::Opened, &mut session).unwrap();

            for k in 0..(3 * n + 1) {
                let ev = session.complete_next();
                engine.handle(ev, &mut session).unwrap();
                let (index, _) = session.submitted.last().unwrap();
                assert_eq!(*index, k % n, "pool of {n}, completion {k}");
                assert_eq!(engine.outstanding(), n);
            }
            assert_eq!(engine.state(), EngineState::Streaming);
            assert_eq!(engine.cursor().round_robin, (3 * n + 1) as u64);
        }
    }

    #[test]
    fn first_audible_content_is_the_fifth_submission() {
        let mut engine = tone_engine(4);
        let mut session = QueueSession::default();
        engine.handle(DeviceEvent::Opened, &mut session).unwrap();
        for _ in 0..4 {
            let ev = session.complete_next();
            engine.handle(ev, &mut session).unwrap();
        }

        assert_eq!(session.submitted.len(), 8);
        for (_, bytes) in &session.submitted[..4] {
            assert!(bytes.iter().all(|&b| b == 0));
        }
        for (_, bytes) in &session.submitted[4..] {
            assert!(bytes.iter().any(|&b| b != 0));
        }
        assert_eq!(engine.cursor().sample_counter, 4 * 512);
    }

    #[test]
    fn tone_phase_is_continuous_across_buffers() {
        let mut engine = tone_engine(2);
        let mut session = QueueSession::default();
        engine.handle(DeviceEvent::Opened, &mut session).unwrap();
        for _ in 0..3 {
            let ev = session.complete_next();
            engine.handle(ev, &mut session).unwrap();
        }

        let mut reference = ToneSource::new(AudioFormat::TONE_DEFAULT, &ToneConfig::default());
        let mut expected = vec![0u8; 3 * 2048];
        reference.produce(3 * 512, &mut expected);
        let streamed: Vec<u8> = session.submitted[2..]
            .iter()
            .flat_map(|(_, b)| b.clone())
            .collect();
        assert_eq!(streamed, expected);
        assert_eq!(engine.cursor().sample_counter, 3 * 512);
        assert_eq!(engine.cursor().sample_counter, engine.source().sample_counter());
    }

    #[test]
    fn file_source_submits_short_buffer_at_loop_seam() {
        let format = AudioFormat::new(8_000, 1, 8).unwrap();
        let source = LoopingPcm::new(format, (1..=10).collect()).unwrap();
        let config = PlaybackConfig {
            buffer_count: 2,
            frames_per_buffer: 4,
            drain_on_stop: false,
        };
        let mut engine = PlaybackEngine::new(source, config, PlaybackStats::shared()).unwrap();
        let mut session = QueueSession::default();
        engine.handle(DeviceEvent::Opened, &mut session).unwrap();
        for _ in 0..4 {
            let ev = session.complete_next();
            engine.handle(ev, &mut session).unwrap();
        }

        let refills: Vec<Vec<u8>> = session.submitted[2..].iter().map(|(_, b)| b.clone()).collect();
        assert_eq!(
            refills,
            vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10], vec![1, 2, 3, 4]]
        );
    }

    #[test]
    fn stop_reclaims_without_resubmitting() {
        let mut engine = tone_engine(3);
        let mut session = QueueSession::default();
        engine.handle(DeviceEvent::Opened, &mut session).unwrap();
        let ev = session.complete_next();
        engine.handle(ev, &mut session).unwrap();

        engine.stop();
        let submitted = session.submitted.len();
        let ev = session.complete_next();
        engine.handle(ev, &mut session).unwrap();

        assert_eq!(session.submitted.len(), submitted);
        assert_eq!(engine.outstanding(), 2);
        assert_eq!(engine.pool().unwrap().state(1), Some(BufferState::Idle));

        let leftovers = session.close();
        engine.shutdown(leftovers).unwrap();
        assert!(engine.pool().is_none());
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn shutdown_before_open_is_a_no_op() {
        let mut engine = tone_engine(4);
        engine.shutdown(Vec::new()).unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn rejected_submission_stops_and_keeps_the_buffer() {
        let mut engine = tone_engine(2);
        let mut session = QueueSession {
            reject: true,
            ..Default::default()
        };
        let err = engine.handle(DeviceEvent::Opened, &mut session).unwrap_err();
        assert!(matches!(err, PlayerError::Device(DeviceError::Stream(_))));
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.outstanding(), 0);
    }

    #[test]
    fn repeated_open_is_ignored() {
        let mut engine = tone_engine(2);
        let mut session = QueueSession::default();
        engine.handle(DeviceEvent::Opened, &mut session).unwrap();
        engine.handle(DeviceEvent::Opened, &mut session).unwrap();
        assert_eq!(session.submitted.len(), 2);
    }

    #[test]
    fn stats_count_submissions_and_completions() {
        let stats = PlaybackStats::shared();
        let source = ToneSource::new(AudioFormat::TONE_DEFAULT, &ToneConfig::default());
        let mut engine =
            PlaybackEngine::new(source, PlaybackConfig::default(), stats.clone()).unwrap();
        let mut session = QueueSession::default();
        engine.handle(DeviceEvent::Opened, &mut session).unwrap();
        for _ in 0..5 {
            let ev = session.complete_next();
            engine.handle(ev, &mut session).unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.buffers_submitted, 9);
        assert_eq!(snap.buffers_completed, 5);
    }
}
