//! Binary runtime helpers.
//!
//! Provides device enumeration and local playback with console stop keys.

use anyhow::{Context, Result};
use crossbeam_channel::Sender;

use crate::config::{PlayConfig, SourceSpec};
use crate::keys::KeyWatcher;
use bufring_player::device;
use bufring_player::format::AudioFormat;
use bufring_player::pipeline::{self, Control};
use bufring_player::playback::CpalOutput;
use bufring_player::source::{LoopingPcm, SampleSource, ToneSource};
use bufring_player::status::PlaybackStats;
use bufring_player::wav::WavFile;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)?;
    Ok(())
}

/// Load the configured source and play it until a stop key or Ctrl-C.
pub fn run_play(config: PlayConfig) -> Result<()> {
    let source = load_source(&config.source)?;
    let format = source.format();

    let host = cpal::default_host();
    let device_name = normalize_device_name(config.device);
    let device = device::pick_device(&host, device_name.as_deref(), format)?;
    let stats = PlaybackStats::shared();
    let output = CpalOutput::new(device, &config.playback, stats.clone());
    tracing::info!(device = %output.name(), "output device");

    let (control_tx, control_rx) = crossbeam_channel::unbounded();
    install_ctrlc(control_tx.clone())?;

    let mut keys = None;
    let result = pipeline::run_session_with(
        &output,
        source,
        &config.playback,
        &control_rx,
        stats,
        || keys = watch_keys(control_tx),
    );
    drop(keys);
    result?;
    Ok(())
}

/// Called once the device is open: tell the user how to stop and start reading keys.
fn watch_keys(control: Sender<Control>) -> Option<KeyWatcher> {
    println!("You should hear sound now. Press Escape to quit.");
    match KeyWatcher::spawn(control) {
        Ok(keys) => Some(keys),
        Err(e) => {
            tracing::warn!("stop keys unavailable, use Ctrl-C: {e:#}");
            None
        }
    }
}

fn load_source(spec: &SourceSpec) -> Result<Box<dyn SampleSource>> {
    match spec {
        SourceSpec::File(path) => {
            let wav = WavFile::open(path).with_context(|| format!("load {}", path.display()))?;
            println!(
                "{}: {} channels, {} Hz, {} bits per sample, {} bytes of PCM",
                path.display(),
                wav.format.channels,
                wav.format.sample_rate,
                wav.format.bits_per_sample,
                wav.pcm.len()
            );
            tracing::info!(
                channels = wav.format.channels,
                rate_hz = wav.format.sample_rate,
                bits = wav.format.bits_per_sample,
                payload_bytes = wav.pcm.len(),
                "source (wav file)"
            );
            Ok(Box::new(LoopingPcm::from_wav(wav)?))
        }
        SourceSpec::Tone(tone) => {
            let format = AudioFormat::TONE_DEFAULT;
            tone.validate(&format)?;
            tracing::info!(
                frequency_hz = tone.frequency_hz,
                amplitude = tone.amplitude,
                format = %format,
                "source (tone)"
            );
            Ok(Box::new(ToneSource::new(format, tone)))
        }
    }
}

fn install_ctrlc(control: Sender<Control>) -> Result<()> {
    ctrlc::set_handler(move || {
        control.send(Control::Stop).ok();
    })
    .context("install Ctrl-C handler")
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
