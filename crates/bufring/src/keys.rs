//! Console stop keys.
//!
//! Puts the terminal in raw mode so a single key press is seen without Enter, and turns
//! Esc, `q` or Ctrl-C into a [`Control::Stop`] for the engine thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use bufring_player::pipeline::Control;
use crossbeam_channel::Sender;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Background key reader. Dropping it stops the reader and restores the terminal.
pub struct KeyWatcher {
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyWatcher {
    pub fn spawn(control: Sender<Control>) -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let handle = std::thread::Builder::new()
            .name("keys".into())
            .spawn(move || {
                if let Err(e) = watch(&flag, &control) {
                    tracing::warn!("key watcher stopped: {e:#}");
                }
            });
        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                disable_raw_mode().ok();
                return Err(e).context("spawn key watcher");
            }
        };
        Ok(Self {
            done,
            handle: Some(handle),
        })
    }
}

impl Drop for KeyWatcher {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        disable_raw_mode().ok();
    }
}

fn watch(done: &AtomicBool, control: &Sender<Control>) -> Result<()> {
    while !done.load(Ordering::Relaxed) {
        if !event::poll(POLL_INTERVAL).context("poll terminal events")? {
            continue;
        }
        if let CEvent::Key(key) = event::read().context("read terminal event")? {
            if is_stop_key(&key) {
                control.send(Control::Stop).ok();
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Raw mode swallows SIGINT, so Ctrl-C arrives here as a key.
fn is_stop_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> KeyEvent {
        KeyEvent::new_with_kind(code, modifiers, kind)
    }

    #[test]
    fn escape_and_q_stop() {
        assert!(is_stop_key(&key(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Press)));
        assert!(is_stop_key(&key(KeyCode::Char('q'), KeyModifiers::NONE, KeyEventKind::Press)));
        assert!(is_stop_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL, KeyEventKind::Press)));
    }

    #[test]
    fn other_keys_and_releases_are_ignored() {
        assert!(!is_stop_key(&key(KeyCode::Char('c'), KeyModifiers::NONE, KeyEventKind::Press)));
        assert!(!is_stop_key(&key(KeyCode::Enter, KeyModifiers::NONE, KeyEventKind::Press)));
        assert!(!is_stop_key(&key(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Release)));
    }
}
