//! Round-robin PCM buffer playback.
//!
//! A fixed pool of buffers is cycled between a [`engine::PlaybackEngine`] and an output
//! device: the device reports each buffer it finished playing, the engine refills the next
//! buffer in round-robin order from a [`source::SampleSource`] and hands it back.

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod playback;
pub mod pool;
pub mod session;
pub mod source;
pub mod status;
pub mod wav;
