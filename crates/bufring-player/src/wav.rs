//! RIFF/WAVE loader.
//!
//! Only the canonical 44-byte header is understood: `RIFF` chunk, `WAVE` form, a 16-byte
//! `fmt ` chunk and the `data` chunk immediately after it. The whole PCM payload is read
//! into memory once; playback then loops over it.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::SourceError;
use crate::format::AudioFormat;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 44;

const WAVE_FORMAT_PCM: u16 = 1;

/// Parsed fixed-layout header fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WavHeader {
    pub chunk_id: [u8; 4],
    pub chunk_size: u32,
    pub format: [u8; 4],
    pub subchunk1_id: [u8; 4],
    pub subchunk1_size: u32,
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub subchunk2_id: [u8; 4],
    pub subchunk2_size: u32,
}

impl WavHeader {
    /// Decode the little-endian header layout. Does not validate.
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Self {
        let tag = |at: usize| [raw[at], raw[at + 1], raw[at + 2], raw[at + 3]];
        let u32_at = |at: usize| u32::from_le_bytes(tag(at));
        let u16_at = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        Self {
            chunk_id: tag(0),
            chunk_size: u32_at(4),
            format: tag(8),
            subchunk1_id: tag(12),
            subchunk1_size: u32_at(16),
            audio_format: u16_at(20),
            channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            subchunk2_id: tag(36),
            subchunk2_size: u32_at(40),
        }
    }

    /// Check the container tags and derive the stream format.
    pub fn validate(&self) -> Result<AudioFormat, SourceError> {
        if &self.chunk_id != b"RIFF" || &self.format != b"WAVE" {
            return Err(SourceError::FormatValidation(format!(
                "expected RIFF/WAVE, found {}/{}",
                String::from_utf8_lossy(&self.chunk_id),
                String::from_utf8_lossy(&self.format)
            )));
        }
        if self.audio_format != WAVE_FORMAT_PCM {
            return Err(SourceError::FormatValidation(format!(
                "audio format {} is not linear PCM",
                self.audio_format
            )));
        }
        let format = AudioFormat::new(self.sample_rate, self.channels, self.bits_per_sample)?;
        if usize::from(self.block_align) != format.block_align() {
            tracing::warn!(
                header = self.block_align,
                derived = format.block_align(),
                "header block align disagrees with channels/bits; using derived value"
            );
        }
        if u64::from(self.byte_rate) != format.bytes_per_second() {
            tracing::warn!(
                header = self.byte_rate,
                derived = format.bytes_per_second(),
                "header byte rate disagrees with rate/block align; using derived value"
            );
        }
        Ok(format)
    }
}

/// A fully loaded PCM file.
#[derive(Clone, Debug)]
pub struct WavFile {
    pub header: WavHeader,
    pub format: AudioFormat,
    pub pcm: Vec<u8>,
}

impl WavFile {
    /// Open and load `path`.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "parsing wave file");
        Self::read_from(BufReader::new(file)).map_err(|e| match e {
            SourceError::Read(source) => SourceError::Open {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Load from any reader positioned at the start of the header.
    ///
    /// A payload shorter than the header's data size is accepted with a warning; a payload
    /// that is empty is an error.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, SourceError> {
        let mut raw = [0u8; HEADER_LEN];
        reader.read_exact(&mut raw).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SourceError::FormatValidation("file shorter than a WAV header".into())
            } else {
                SourceError::Read(e)
            }
        })?;
        let header = WavHeader::parse(&raw);
        let format = header.validate()?;

        let declared = header.subchunk2_size as usize;
        let mut pcm = Vec::new();
        reader
            .take(u64::from(header.subchunk2_size))
            .read_to_end(&mut pcm)
            .map_err(SourceError::Read)?;
        if pcm.len() < declared {
            tracing::warn!(
                declared_bytes = declared,
                read_bytes = pcm.len(),
                "PCM payload truncated"
            );
        }
        if pcm.is_empty() {
            return Err(SourceError::EmptyPayload);
        }

        tracing::info!(
            channels = format.channels,
            rate_hz = format.sample_rate,
            bits = format.bits_per_sample,
            pcm_bytes = pcm.len(),
            "wave file loaded"
        );
        Ok(Self {
            header,
            format,
            pcm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header_bytes(
        riff: &[u8; 4],
        wave: &[u8; 4],
        audio_format: u16,
        channels: u16,
        rate: u32,
        bits: u16,
        data_len: u32,
    ) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(riff);
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(wave);
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&audio_format.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out
    }

    #[test]
    fn parses_canonical_header() {
        let mut bytes = header_bytes(b"RIFF", b"WAVE", 1, 2, 44_100, 16, 8);
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let wav = WavFile::read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(wav.format, AudioFormat::new(44_100, 2, 16).unwrap());
        assert_eq!(wav.header.byte_rate, 44_100 * 4);
        assert_eq!(wav.header.block_align, 4);
        assert_eq!(wav.pcm, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn rejects_wrong_container_tags() {
        let mut bytes = header_bytes(b"RIFX", b"WAVE", 1, 2, 44_100, 16, 4);
        bytes.extend_from_slice(&[0; 4]);
        let err = WavFile::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SourceError::FormatValidation(_)));

        let mut bytes = header_bytes(b"RIFF", b"AVI ", 1, 2, 44_100, 16, 4);
        bytes.extend_from_slice(&[0; 4]);
        let err = WavFile::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SourceError::FormatValidation(_)));
    }

    #[test]
    fn rejects_non_pcm_codecs() {
        // 3 = IEEE float
        let mut bytes = header_bytes(b"RIFF", b"WAVE", 3, 2, 48_000, 32, 8);
        bytes.extend_from_slice(&[0; 8]);
        let err = WavFile::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SourceError::FormatValidation(_)));
    }

    #[test]
    fn inconsistent_byte_rate_uses_derived_format() {
        let mut bytes = header_bytes(b"RIFF", b"WAVE", 1, 2, 44_100, 16, 4);
        bytes[28..32].copy_from_slice(&1234u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        let wav = WavFile::read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(wav.header.byte_rate, 1234);
        assert_eq!(wav.format.bytes_per_second(), 44_100 * 4);
    }

    #[test]
    fn rejects_short_header() {
        let err = WavFile::read_from(Cursor::new(b"RIFF".to_vec())).unwrap_err();
        assert!(matches!(err, SourceError::FormatValidation(_)));
    }

    #[test]
    fn empty_payload_is_a_load_error() {
        let bytes = header_bytes(b"RIFF", b"WAVE", 1, 1, 8_000, 8, 0);
        let err = WavFile::read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, SourceError::EmptyPayload));
    }

    #[test]
    fn truncated_payload_keeps_what_exists() {
        let mut bytes = header_bytes(b"RIFF", b"WAVE", 1, 1, 8_000, 8, 100);
        bytes.extend_from_slice(&[7; 10]);
        let wav = WavFile::read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(wav.pcm.len(), 10);
    }

    #[test]
    fn trailing_chunks_after_data_are_ignored() {
        let mut bytes = header_bytes(b"RIFF", b"WAVE", 1, 1, 8_000, 8, 2);
        bytes.extend_from_slice(&[9, 9]);
        bytes.extend_from_slice(b"LIST\x04\x00\x00\x00abcd");
        let wav = WavFile::read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(wav.pcm, vec![9, 9]);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WavFile::open(&dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn loads_file_written_by_hound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..64i16 {
            writer.write_sample(i).unwrap();
            writer.write_sample(-i).unwrap();
        }
        writer.finalize().unwrap();

        let wav = WavFile::open(&path).unwrap();
        assert_eq!(wav.format, AudioFormat::TONE_DEFAULT);
        assert_eq!(wav.pcm.len(), 64 * 4);
        assert_eq!(i16::from_le_bytes([wav.pcm[4], wav.pcm[5]]), 1);
        assert_eq!(i16::from_le_bytes([wav.pcm[6], wav.pcm[7]]), -1);
    }
}
