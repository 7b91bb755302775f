//! Sample sources that fill pool buffers on demand.
//!
//! Both shipped sources are infinite: [`LoopingPcm`] wraps around its payload and
//! [`ToneSource`] is a pure function of its sample counter. A refill therefore never fails.

use crate::config::ToneConfig;
use crate::error::SourceError;
use crate::format::AudioFormat;
use crate::wav::WavFile;

/// Producer of interleaved PCM bytes in a fixed [`AudioFormat`].
pub trait SampleSource: Send {
    /// Format of every byte this source produces.
    fn format(&self) -> AudioFormat;

    /// Write up to `frames` frames into `dest` and return the number of bytes written.
    ///
    /// Never writes past `dest.len()` and always writes whole frames.
    fn produce(&mut self, frames: usize, dest: &mut [u8]) -> usize;

    /// Return to the start of the stream.
    fn rewind(&mut self);
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn format(&self) -> AudioFormat {
        (**self).format()
    }

    fn produce(&mut self, frames: usize, dest: &mut [u8]) -> usize {
        (**self).produce(frames, dest)
    }

    fn rewind(&mut self) {
        (**self).rewind()
    }
}

/// Looping cursor over a PCM payload loaded in memory.
///
/// When fewer bytes remain than requested, the remainder is copied (a short buffer) and the
/// cursor wraps to the start; the next request continues from byte 0. Nothing is padded.
#[derive(Debug)]
pub struct LoopingPcm {
    format: AudioFormat,
    pcm: Vec<u8>,
    read_offset: usize,
}

impl LoopingPcm {
    /// Wrap a payload. A trailing partial frame is dropped so the loop seam stays frame aligned.
    pub fn new(format: AudioFormat, mut pcm: Vec<u8>) -> Result<Self, SourceError> {
        let align = format.block_align();
        let whole = pcm.len() - pcm.len() % align;
        if whole != pcm.len() {
            tracing::warn!(
                dropped_bytes = pcm.len() - whole,
                block_align = align,
                "payload ends in a partial frame; trimming"
            );
            pcm.truncate(whole);
        }
        if pcm.is_empty() {
            return Err(SourceError::EmptyPayload);
        }
        Ok(Self {
            format,
            pcm,
            read_offset: 0,
        })
    }

    pub fn from_wav(wav: WavFile) -> Result<Self, SourceError> {
        Self::new(wav.format, wav.pcm)
    }

    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}

impl SampleSource for LoopingPcm {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn produce(&mut self, frames: usize, dest: &mut [u8]) -> usize {
        let align = self.format.block_align();
        let wanted = frames.saturating_mul(align).min(dest.len() - dest.len() % align);
        let remaining = self.pcm.len() - self.read_offset;
        let n = wanted.min(remaining);

        dest[..n].copy_from_slice(&self.pcm[self.read_offset..self.read_offset + n]);
        self.read_offset += n;
        if self.read_offset == self.pcm.len() {
            self.read_offset = 0;
        }
        n
    }

    fn rewind(&mut self) {
        self.read_offset = 0;
    }
}

/// Sine synthesizer, duplicated across every channel.
///
/// Output is a pure function of the sample counter: frame `n` is
/// `amplitude × sin(2π × frequency × n / sample_rate)` scaled to the bit depth.
#[derive(Clone, Debug)]
pub struct ToneSource {
    format: AudioFormat,
    frequency_hz: f64,
    amplitude: f64,
    sample_counter: i64,
}

impl ToneSource {
    pub fn new(format: AudioFormat, tone: &ToneConfig) -> Self {
        Self {
            format,
            frequency_hz: tone.frequency_hz,
            amplitude: tone.amplitude,
            sample_counter: 0,
        }
    }

    /// Frames generated since the last rewind.
    pub fn sample_counter(&self) -> i64 {
        self.sample_counter
    }

    /// Normalized value of frame `n`.
    pub fn value_at(&self, n: i64) -> f64 {
        let phase = 2.0 * std::f64::consts::PI * self.frequency_hz * n as f64
            / f64::from(self.format.sample_rate);
        self.amplitude * phase.sin()
    }
}

impl SampleSource for ToneSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn produce(&mut self, frames: usize, dest: &mut [u8]) -> usize {
        let align = self.format.block_align();
        let width = self.format.bytes_per_sample();
        let frames = frames.min(dest.len() / align);

        for frame in dest[..frames * align].chunks_exact_mut(align) {
            let value = self.value_at(self.sample_counter);
            let (first, rest) = frame.split_at_mut(width);
            self.format.encode_sample(value, first);
            for ch in rest.chunks_exact_mut(width) {
                ch.copy_from_slice(first);
            }
            self.sample_counter += 1;
        }
        frames * align
    }

    fn rewind(&mut self) {
        self.sample_counter = 0;
    }
}
