use std::path::PathBuf;

pub use bufring_player::config::{PlaybackConfig, ToneConfig};

use crate::cli::{Args, DEFAULT_INPUT};

/// Where samples come from.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceSpec {
    File(PathBuf),
    Tone(ToneConfig),
}

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub source: SourceSpec,
    pub device: Option<String>,
    pub playback: PlaybackConfig,
}

impl From<Args> for PlayConfig {
    fn from(args: Args) -> Self {
        let source = if args.tone {
            SourceSpec::Tone(ToneConfig {
                frequency_hz: args.frequency,
                amplitude: args.amplitude,
            })
        } else {
            SourceSpec::File(args.path.unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT)))
        };
        Self {
            source,
            device: args.device,
            playback: PlaybackConfig {
                buffer_count: args.buffers,
                frames_per_buffer: args.frames_per_buffer,
                drain_on_stop: args.drain,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn missing_path_falls_back_to_default_input() {
        let config = PlayConfig::from(Args::try_parse_from(["bufring"]).unwrap());
        assert_eq!(config.source, SourceSpec::File(PathBuf::from(DEFAULT_INPUT)));
        assert_eq!(config.playback.buffer_count, 4);
    }

    #[test]
    fn tone_mode_carries_tone_settings() {
        let args = Args::try_parse_from([
            "bufring",
            "--tone",
            "--frequency",
            "220",
            "--buffers",
            "8",
            "--drain",
        ])
        .unwrap();
        let config = PlayConfig::from(args);
        assert_eq!(
            config.source,
            SourceSpec::Tone(ToneConfig {
                frequency_hz: 220.0,
                amplitude: 0.1,
            })
        );
        assert_eq!(config.playback.buffer_count, 8);
        assert!(config.playback.drain_on_stop);
    }
}
