use crate::error::PlayerError;
use crate::format::AudioFormat;

/// Buffer pool sizing and stop behaviour, fixed for the life of a session.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Number of buffers cycled between engine and device.
    pub buffer_count: usize,
    /// Frames held by each buffer.
    pub frames_per_buffer: usize,
    /// On stop, wait for in-flight buffers to finish instead of flushing them.
    pub drain_on_stop: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            frames_per_buffer: 512,
            drain_on_stop: false,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), PlayerError> {
        if self.buffer_count == 0 {
            return Err(PlayerError::Config("buffer count must be at least 1".into()));
        }
        if self.frames_per_buffer == 0 {
            return Err(PlayerError::Config(
                "frames per buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Size in bytes of one pool buffer for `format`.
    pub fn bytes_per_buffer(&self, format: &AudioFormat) -> usize {
        self.frames_per_buffer * format.block_align()
    }
}

/// Sine generator parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ToneConfig {
    pub frequency_hz: f64,
    /// Peak level relative to full scale, `0.0..=1.0`.
    pub amplitude: f64,
}

impl Default for ToneConfig {
    /// A4 at -20 dBFS.
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            amplitude: 0.1,
        }
    }
}

impl ToneConfig {
    pub fn validate(&self, format: &AudioFormat) -> Result<(), PlayerError> {
        if !(0.0..=1.0).contains(&self.amplitude) {
            return Err(PlayerError::Config(format!(
                "amplitude {} outside 0.0..=1.0",
                self.amplitude
            )));
        }
        let nyquist = f64::from(format.sample_rate) / 2.0;
        if !(self.frequency_hz > 0.0 && self.frequency_hz < nyquist) {
            return Err(PlayerError::Config(format!(
                "frequency {} Hz must be above 0 and below {nyquist} Hz",
                self.frequency_hz
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_sizing() {
        let cfg = PlaybackConfig::default();
        assert_eq!(cfg.buffer_count, 4);
        assert_eq!(cfg.frames_per_buffer, 512);
        assert_eq!(cfg.bytes_per_buffer(&AudioFormat::TONE_DEFAULT), 2048);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let cfg = PlaybackConfig {
            buffer_count: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = PlaybackConfig {
            frames_per_buffer: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tone_limits() {
        let fmt = AudioFormat::TONE_DEFAULT;
        assert!(ToneConfig::default().validate(&fmt).is_ok());
        let loud = ToneConfig {
            amplitude: 1.5,
            ..Default::default()
        };
        assert!(loud.validate(&fmt).is_err());
        let high = ToneConfig {
            frequency_hz: 24_000.0,
            ..Default::default()
        };
        assert!(high.validate(&fmt).is_err());
        let nan = ToneConfig {
            frequency_hz: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate(&fmt).is_err());
    }
}
