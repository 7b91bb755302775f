//! Device session boundary.
//!
//! An [`OutputDevice`] opens a [`DeviceSession`] for one [`AudioFormat`] and reports what
//! happens to it as [`DeviceEvent`]s on the sink it was given. Submitting a buffer moves it
//! to the device; the device gives it back inside [`DeviceEvent::BufferCompleted`] once
//! played, or from [`DeviceSession::close`] if it never got that far.
//!
//! Implementations must deliver completions in submission order and exactly once per
//! submission. Events for one session are consumed by a single thread, so the engine's
//! handler is never re-entered even when the backend calls back from several threads.

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::error::DeviceError;
use crate::format::AudioFormat;
use crate::pool::PcmBuffer;

/// Notifications from a device session.
#[derive(Debug)]
pub enum DeviceEvent {
    /// The stream is open and ready for buffers.
    Opened,
    /// A submitted buffer finished playing and is handed back.
    BufferCompleted(PcmBuffer),
    /// The stream was closed.
    Closed,
}

/// Sending half the engine hands to [`OutputDevice::open`].
pub type EventSink = Sender<DeviceEvent>;

/// A submission the device would not accept. Carries the buffer back to its owner.
#[derive(Error, Debug)]
#[error("device rejected buffer {}: {reason}", .buffer.index())]
pub struct SubmitError {
    pub buffer: PcmBuffer,
    pub reason: String,
}

/// An open PCM output stream.
pub trait DeviceSession {
    /// Queue `buffer` for playback and return immediately.
    fn submit(&mut self, buffer: PcmBuffer) -> Result<(), SubmitError>;

    /// No further submissions will follow. Silence once the queued buffers have played is
    /// expected from here on and is not an underrun.
    fn finish(&mut self) {}

    /// Stop playback, release the stream and hand back every buffer still queued.
    fn close(&mut self) -> Vec<PcmBuffer>;
}

/// A device capable of opening PCM sessions.
pub trait OutputDevice {
    type Session: DeviceSession;

    /// Negotiate `format` and start a session reporting to `sink`.
    ///
    /// On success the session has already posted [`DeviceEvent::Opened`].
    fn open(&self, format: AudioFormat, sink: EventSink) -> Result<Self::Session, DeviceError>;
}
