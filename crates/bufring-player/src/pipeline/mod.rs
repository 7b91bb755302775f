//! Session wiring: open the device, run the engine on the calling thread, shut down.
//!
//! The calling thread is the only one that touches the engine. It waits on two channels:
//! device events from the session and [`Control`] messages from whoever may ask playback
//! to stop (key handler, signal handler).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::config::PlaybackConfig;
use crate::engine::{EngineState, PlaybackCursor, PlaybackEngine};
use crate::error::PlayerError;
use crate::format::AudioFormat;
use crate::session::{DeviceEvent, DeviceSession, OutputDevice};
use crate::source::SampleSource;
use crate::status::{PlaybackStats, StatsSnapshot};

const DRAIN_SLACK: Duration = Duration::from_millis(200);

/// Requests from outside the engine thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Stop,
}

/// What a finished session did.
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub format: AudioFormat,
    pub cursor: PlaybackCursor,
    pub stats: StatsSnapshot,
}

/// Play `source` on `device` until a [`Control::Stop`] arrives or the control channel closes.
///
/// Device-open failures are returned before any buffer is allocated. On return every
/// buffer has been reclaimed from the device and the pool is freed.
pub fn run_session<D, S>(
    device: &D,
    source: S,
    config: &PlaybackConfig,
    control: &Receiver<Control>,
    stats: Arc<PlaybackStats>,
) -> Result<SessionSummary, PlayerError>
where
    D: OutputDevice,
    S: SampleSource,
{
    run_session_with(device, source, config, control, stats, || {})
}

/// Like [`run_session`], calling `on_open` once the device session is open and before the
/// first buffer is submitted. `on_open` never runs when opening fails.
pub fn run_session_with<D, S, F>(
    device: &D,
    source: S,
    config: &PlaybackConfig,
    control: &Receiver<Control>,
    stats: Arc<PlaybackStats>,
    on_open: F,
) -> Result<SessionSummary, PlayerError>
where
    D: OutputDevice,
    S: SampleSource,
    F: FnOnce(),
{
    let format = source.format();
    let mut engine = PlaybackEngine::new(source, config.clone(), stats.clone())?;

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let mut session = device.open(format, event_tx)?;
    tracing::info!(format = %format, "device session open");
    on_open();

    let streamed = stream_until_stopped(&mut engine, &mut session, &event_rx, control, config);

    let mut returned = session.close();
    returned.extend(event_rx.try_iter().filter_map(|ev| match ev {
        DeviceEvent::BufferCompleted(buffer) => Some(buffer),
        _ => None,
    }));
    tracing::debug!(flushed = returned.len(), "session closed");
    let shutdown = engine.shutdown(returned);
    streamed?;
    shutdown?;

    let summary = SessionSummary {
        format,
        cursor: engine.cursor(),
        stats: stats.snapshot(),
    };
    tracing::info!(
        buffers_submitted = summary.stats.buffers_submitted,
        buffers_completed = summary.stats.buffers_completed,
        elapsed_ms = summary.stats.elapsed_ms(format.sample_rate),
        underrun_events = summary.stats.underrun_events,
        underrun_frames = summary.stats.underrun_frames,
        late_refills = summary.stats.late_refills,
        "playback finished"
    );
    Ok(summary)
}

fn stream_until_stopped<S, D>(
    engine: &mut PlaybackEngine<S>,
    session: &mut D,
    events: &Receiver<DeviceEvent>,
    control: &Receiver<Control>,
    config: &PlaybackConfig,
) -> Result<(), PlayerError>
where
    S: SampleSource,
    D: DeviceSession,
{
    while engine.state() != EngineState::Stopped {
        crossbeam_channel::select! {
            recv(events) -> ev => match ev {
                Ok(ev) => engine.handle(ev, session)?,
                Err(_) => {
                    tracing::warn!("device event channel closed");
                    engine.stop();
                }
            },
            recv(control) -> msg => {
                match msg {
                    Ok(Control::Stop) => tracing::info!("stop requested"),
                    Err(_) => tracing::debug!("control channel closed"),
                }
                engine.stop();
            }
        }
    }

    session.finish();
    if config.drain_on_stop {
        drain(engine, session, events, config)?;
    }
    Ok(())
}

/// Keep taking completions without resubmitting until nothing is on loan, or give up
/// after the queued audio should long have played.
fn drain<S, D>(
    engine: &mut PlaybackEngine<S>,
    session: &mut D,
    events: &Receiver<DeviceEvent>,
    config: &PlaybackConfig,
) -> Result<(), PlayerError>
where
    S: SampleSource,
    D: DeviceSession,
{
    let buffers = u32::try_from(config.buffer_count).unwrap_or(u32::MAX);
    let deadline = Instant::now()
        + engine
            .buffer_duration()
            .saturating_mul(buffers.saturating_add(1))
        + DRAIN_SLACK;

    while engine.outstanding() > 0 {
        let left = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(left) {
            Ok(ev) => engine.handle(ev, session)?,
            Err(_) => {
                tracing::warn!(
                    outstanding = engine.outstanding(),
                    "drain timed out; flushing remaining buffers"
                );
                break;
            }
        }
    }
    Ok(())
}
