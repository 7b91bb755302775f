//! Linear PCM stream format.
//!
//! Samples are interleaved little-endian integers: 8-bit is unsigned (silence = 0x80),
//! 16/24/32-bit are signed two's complement. This matches what a RIFF/WAVE PCM payload holds.

use std::fmt;
use std::time::Duration;

use crate::error::SourceError;

/// Negotiated PCM format of a playback stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Format used when synthesizing a tone: 48 kHz, stereo, 16-bit.
    pub const TONE_DEFAULT: AudioFormat = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
        bits_per_sample: 16,
    };

    /// Build a validated format.
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Result<Self, SourceError> {
        if sample_rate == 0 {
            return Err(SourceError::FormatValidation("sample rate is zero".into()));
        }
        if channels == 0 {
            return Err(SourceError::FormatValidation("channel count is zero".into()));
        }
        if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(SourceError::FormatValidation(format!(
                "unsupported bits per sample: {bits_per_sample}"
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
        })
    }

    /// Bytes per sample of a single channel.
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes per frame (`channels × bits_per_sample / 8`).
    pub fn block_align(&self) -> usize {
        usize::from(self.channels) * self.bytes_per_sample()
    }

    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * self.block_align() as u64
    }

    /// Playback duration of `frames` frames at this rate.
    pub fn frames_duration(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    /// Largest positive integer sample value at this bit depth.
    pub fn full_scale(&self) -> f64 {
        match self.bits_per_sample {
            8 => 127.0,
            16 => f64::from(i16::MAX),
            24 => 8_388_607.0,
            _ => f64::from(i32::MAX),
        }
    }

    /// Encode a normalized value (`-1.0..=1.0`) as one little-endian sample into `dest`.
    ///
    /// The value is scaled by [`full_scale`](Self::full_scale) and rounded to the nearest
    /// integer. `dest` must be exactly [`bytes_per_sample`](Self::bytes_per_sample) long.
    pub fn encode_sample(&self, value: f64, dest: &mut [u8]) {
        let scaled = (value.clamp(-1.0, 1.0) * self.full_scale()).round();
        match self.bits_per_sample {
            8 => dest[0] = (scaled as i16 + 128) as u8,
            16 => dest.copy_from_slice(&(scaled as i16).to_le_bytes()),
            24 => dest.copy_from_slice(&(scaled as i32).to_le_bytes()[..3]),
            _ => dest.copy_from_slice(&(scaled as i32).to_le_bytes()),
        }
    }

    /// Decode one little-endian sample from `src` into a normalized `f32`.
    pub fn decode_sample(&self, src: &[u8]) -> f32 {
        match self.bits_per_sample {
            8 => (f32::from(src[0]) - 128.0) / 128.0,
            16 => f32::from(i16::from_le_bytes([src[0], src[1]])) / 32_768.0,
            24 => {
                // Place the 24 bits in the top of an i32, then shift back to sign-extend.
                let v = i32::from_le_bytes([0, src[0], src[1], src[2]]) >> 8;
                v as f32 / 8_388_608.0
            }
            _ => i32::from_le_bytes([src[0], src[1], src[2], src[3]]) as f32 / 2_147_483_648.0,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}-bit PCM",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}
