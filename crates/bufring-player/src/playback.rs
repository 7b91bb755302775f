//! CPAL-backed device session.
//!
//! CPAL pulls audio from a callback rather than accepting buffers, so the session keeps a
//! FIFO of submitted [`PcmBuffer`]s. The callback:
//! - decodes samples from the head buffer into the device sample format
//! - hands each buffer back with [`DeviceEvent::BufferCompleted`] once its last sample is out
//! - outputs silence (counted as underrun) when the FIFO runs dry after priming
//!
//! The callback and the engine only meet at the FIFO mutex, held for one callback period
//! at most, and at the event channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::PlaybackConfig;
use crate::device;
use crate::error::DeviceError;
use crate::format::AudioFormat;
use crate::pool::PcmBuffer;
use crate::session::{DeviceEvent, DeviceSession, EventSink, OutputDevice, SubmitError};
use crate::status::PlaybackStats;

/// An output device reached through CPAL.
pub struct CpalOutput {
    device: cpal::Device,
    frames_per_buffer: usize,
    pool_frames: usize,
    stats: Arc<PlaybackStats>,
}

impl CpalOutput {
    pub fn new(device: cpal::Device, config: &PlaybackConfig, stats: Arc<PlaybackStats>) -> Self {
        Self {
            device,
            frames_per_buffer: config.frames_per_buffer,
            pool_frames: config.buffer_count.saturating_mul(config.frames_per_buffer),
            stats,
        }
    }

    pub fn name(&self) -> String {
        self.device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "<unknown device>".to_string())
    }
}

impl OutputDevice for CpalOutput {
    type Session = CpalSession;

    fn open(&self, format: AudioFormat, sink: EventSink) -> Result<CpalSession, DeviceError> {
        let supported = device::negotiate_config(&self.device, format)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported, self.frames_per_buffer) {
            stream_config.buffer_size = buf;
        }
        if device::period_exceeds_pool(&stream_config.buffer_size, self.pool_frames) {
            tracing::warn!(
                buffer_size = ?stream_config.buffer_size,
                pool_frames = self.pool_frames,
                "device period is larger than the whole buffer pool; expect underruns"
            );
        }
        tracing::info!(
            device = %self.name(),
            format = %format,
            sample_format = ?supported.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "device output config"
        );

        let queue = Arc::new(Mutex::new(DeviceQueue::new(format)));
        let stream = build_output_stream(
            &self.device,
            &stream_config,
            supported.sample_format(),
            StreamShared {
                queue: queue.clone(),
                sink: sink.clone(),
                stats: self.stats.clone(),
            },
            format,
        )?;
        stream
            .play()
            .map_err(|e| DeviceError::Stream(format!("start stream: {e}")))?;

        sink.send(DeviceEvent::Opened)
            .map_err(|_| DeviceError::Stream("event sink closed before open".into()))?;

        Ok(CpalSession {
            stream: Some(stream),
            queue,
            sink,
        })
    }
}

/// Open CPAL stream fed from submitted buffers.
pub struct CpalSession {
    stream: Option<cpal::Stream>,
    queue: Arc<Mutex<DeviceQueue>>,
    sink: EventSink,
}

impl DeviceSession for CpalSession {
    fn submit(&mut self, buffer: PcmBuffer) -> Result<(), SubmitError> {
        if self.stream.is_none() {
            return Err(SubmitError {
                buffer,
                reason: "session closed".into(),
            });
        }
        match self.queue.lock() {
            Ok(mut q) => {
                q.primed = true;
                q.pending.push_back(buffer);
                Ok(())
            }
            Err(_) => Err(SubmitError {
                buffer,
                reason: "device queue poisoned".into(),
            }),
        }
    }

    fn finish(&mut self) {
        let mut q = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        q.finishing = true;
    }

    fn close(&mut self) -> Vec<PcmBuffer> {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!("pause on close: {e}");
            }
            drop(stream);
            let _ = self.sink.send(DeviceEvent::Closed);
        }
        let mut q = self.queue.lock().unwrap_or_else(|p| p.into_inner());
        q.closed = true;
        q.take_all()
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        let left = self.close();
        if !left.is_empty() {
            tracing::debug!(buffers = left.len(), "session dropped with buffers queued");
        }
    }
}

/// FIFO of buffers on loan to the device, plus the read position in the head buffer.
struct DeviceQueue {
    format: AudioFormat,
    pending: VecDeque<PcmBuffer>,
    pos: usize,
    /// Set by the first submission; silence before that is not an underrun.
    primed: bool,
    /// No more submissions are coming; the queue runs dry on purpose.
    finishing: bool,
    closed: bool,
}

impl DeviceQueue {
    fn new(format: AudioFormat) -> Self {
        Self {
            format,
            pending: VecDeque::new(),
            pos: 0,
            primed: false,
            finishing: false,
            closed: false,
        }
    }

    /// Decode the next sample, completing buffers as they run out.
    fn next_sample(&mut self, sink: &EventSink) -> Option<f32> {
        let width = self.format.bytes_per_sample();
        loop {
            let (value, exhausted) = {
                let head = self.pending.front()?;
                let bytes = head.bytes();
                if self.pos + width <= bytes.len() {
                    let v = self.format.decode_sample(&bytes[self.pos..self.pos + width]);
                    self.pos += width;
                    (Some(v), self.pos + width > bytes.len())
                } else {
                    (None, true)
                }
            };
            if exhausted {
                self.finish_head(sink);
            }
            if value.is_some() {
                return value;
            }
        }
    }

    /// Whether running dry right now counts as an underrun.
    fn starving(&self) -> bool {
        self.primed && !self.finishing && !self.closed
    }

    fn finish_head(&mut self, sink: &EventSink) {
        if let Some(done) = self.pending.pop_front() {
            self.pos = 0;
            if sink.send(DeviceEvent::BufferCompleted(done)).is_err() {
                tracing::debug!("completion dropped; engine gone");
            }
        }
    }

    fn take_all(&mut self) -> Vec<PcmBuffer> {
        self.pos = 0;
        self.pending.drain(..).collect()
    }
}

struct StreamShared {
    queue: Arc<Mutex<DeviceQueue>>,
    sink: EventSink,
    stats: Arc<PlaybackStats>,
}

/// Build the CPAL stream for the negotiated device sample format.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    shared: StreamShared,
    format: AudioFormat,
) -> Result<cpal::Stream, DeviceError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, shared, format),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, shared, format),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, shared, format),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, shared, format),
        cpal::SampleFormat::U8 => build_stream::<u8>(device, config, shared, format),
        cpal::SampleFormat::I8 => build_stream::<i8>(device, config, shared, format),
        other => Err(DeviceError::Unavailable {
            format,
            reason: format!("unsupported device sample format: {other:?}"),
        }),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: StreamShared,
    format: AudioFormat,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    let StreamShared { queue, sink, stats } = shared;

    let err_fn = |err| tracing::warn!("stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| fill_output(data, channels, &queue, &sink, &stats),
            err_fn,
            None,
        )
        .map_err(|e| DeviceError::Unavailable {
            format,
            reason: format!("build output stream: {e}"),
        })
}

/// Fill one device period from the queue, padding with silence when it runs dry.
fn fill_output<T>(
    data: &mut [T],
    channels: usize,
    queue: &Mutex<DeviceQueue>,
    sink: &EventSink,
    stats: &PlaybackStats,
) where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    let Ok(mut q) = queue.lock() else {
        data.fill(silence);
        return;
    };

    let mut filled = 0usize;
    for out in data.iter_mut() {
        match q.next_sample(sink) {
            Some(v) => {
                *out = <T as cpal::Sample>::from_sample::<f32>(v);
                filled += 1;
            }
            None => break,
        }
    }
    if filled < data.len() {
        data[filled..].fill(silence);
        if q.starving() {
            stats.record_underrun(((data.len() - filled) / channels) as u64);
        }
    }
    stats.record_played((filled / channels) as u64);
}
