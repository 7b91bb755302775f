//! Output device discovery and format negotiation.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - finding a device configuration that carries a PCM format unchanged

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::DeviceError;
use crate::format::AudioFormat;

/// Pick a CPAL output device.
///
/// - If `needle` is `Some`, chooses the first output device whose name contains the substring
///   (case-insensitive).
/// - Otherwise, returns the host default output device.
pub fn pick_device(
    host: &cpal::Host,
    needle: Option<&str>,
    format: AudioFormat,
) -> Result<cpal::Device, DeviceError> {
    let unavailable = |reason: String| DeviceError::Unavailable { format, reason };
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .map_err(|e| unavailable(format!("no output devices: {e}")))?
        .collect();

    if let Some(needle) = needle {
        return devices
            .drain(..)
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| unavailable(format!("no output device matched: {needle}")));
    }

    host.default_output_device()
        .ok_or_else(|| unavailable("no default output device".into()))
}

/// Find a device configuration that plays `format` without conversion of rate or layout.
///
/// Channel count and sample rate must match exactly. Among matching ranges the sample
/// format closest to the source bit depth wins, then `f32`.
pub fn negotiate_config(
    device: &cpal::Device,
    format: AudioFormat,
) -> Result<cpal::SupportedStreamConfig, DeviceError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| DeviceError::Unavailable {
            format,
            reason: format!("cannot query device configs: {e}"),
        })?;

    let mut best: Option<(u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        if range.channels() != format.channels {
            continue;
        }
        let (min, max) = (range.min_sample_rate(), range.max_sample_rate());
        if format.sample_rate < min || format.sample_rate > max {
            continue;
        }
        let rank = sample_format_rank(range.sample_format(), format.bits_per_sample);
        if best.as_ref().is_none_or(|(b, _)| rank < *b) {
            best = Some((rank, range.with_sample_rate(format.sample_rate)));
        }
    }

    best.map(|(_, cfg)| cfg).ok_or_else(|| DeviceError::Unavailable {
        format,
        reason: "device has no matching channel count / sample rate".into(),
    })
}

/// Ask for a hardware period of `frames` when the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    frames: usize,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            let want = u32::try_from(frames).unwrap_or(u32::MAX);
            Some(cpal::BufferSize::Fixed(clamp_frames(want, *min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Whether one hardware period of `buffer_size` holds more frames than the whole pool.
///
/// Such a device drains every buffer within a single callback and underruns on each one.
pub fn period_exceeds_pool(buffer_size: &cpal::BufferSize, pool_frames: usize) -> bool {
    match buffer_size {
        cpal::BufferSize::Fixed(period) => {
            usize::try_from(*period).unwrap_or(usize::MAX) > pool_frames
        }
        cpal::BufferSize::Default => false,
    }
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<(), DeviceError> {
    let devices = host
        .output_devices()
        .map_err(|e| DeviceError::Stream(format!("no output devices: {e}")))?;
    for (i, d) in devices.enumerate() {
        match d.description() {
            Ok(desc) => println!("#{i}: {desc}"),
            Err(e) => println!("#{i}: <unnamed: {e}>"),
        }
    }
    Ok(())
}

fn clamp_frames(want: u32, min: u32, max: u32) -> u32 {
    if min > max { min } else { want.clamp(min, max) }
}

/// Lower is better. The native integer width of the source ranks first.
fn sample_format_rank(format: cpal::SampleFormat, bits: u16) -> u8 {
    let native = match bits {
        8 => cpal::SampleFormat::U8,
        16 => cpal::SampleFormat::I16,
        _ => cpal::SampleFormat::I32,
    };
    if format == native {
        return 0;
    }
    match format {
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::I16 => 3,
        cpal::SampleFormat::U16 => 4,
        cpal::SampleFormat::U8 | cpal::SampleFormat::I8 => 5,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
