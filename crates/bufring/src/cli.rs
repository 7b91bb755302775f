use std::path::PathBuf;

use clap::Parser;

/// Input file played when no path is given.
pub const DEFAULT_INPUT: &str = "Ring07.wav";

#[derive(Parser, Debug)]
#[command(name = "bufring", version)]
pub struct Args {
    /// Path to a 16/24/32-bit or 8-bit PCM WAV file (44-byte header)
    pub path: Option<PathBuf>,

    /// Play a generated sine tone instead of a file
    #[arg(long, conflicts_with = "path")]
    pub tone: bool,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    pub frequency: f64,

    /// Tone amplitude as a fraction of full scale (0..=1)
    #[arg(long, default_value_t = 0.1)]
    pub amplitude: f64,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Number of buffers cycled between player and device
    #[arg(long, default_value_t = 4)]
    pub buffers: usize,

    /// Frames per buffer (higher => more latency, lower => tighter refill deadline)
    #[arg(long, default_value_t = 512)]
    pub frames_per_buffer: usize,

    /// On stop, let queued buffers finish playing instead of discarding them
    #[arg(long)]
    pub drain: bool,
}
