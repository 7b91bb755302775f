//! bufring: play a PCM WAV file (looped) or a sine tone through a small ring of buffers.
//!
//! ## Flow
//! 1. **Load**: the WAV payload is read into memory, or a tone source is configured.
//! 2. **Prime**: the device session opens and every pool buffer is submitted as silence.
//! 3. **Stream**: each completion refills the next buffer in round-robin order and resubmits it.
//!
//! Esc, `q` or Ctrl-C stops playback; in-flight buffers are flushed (or drained with `--drain`).

use anyhow::Result;
use bufring::{cli, config::PlayConfig, logging, runtime};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,bufring=info,bufring_player=info")
        }))
        .with_writer(logging::stderr)
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    runtime::run_play(PlayConfig::from(args))
}
