//! Input handling module
//!
//! Raw device events flow through [`TrackballFilter`] into the
//! [`queue::EventQueue`]. The blocking device read happens here, never under
//! the console's update lock.

pub mod evdev_handler;
pub mod keys;
pub mod queue;

use tracing::{debug, warn};

use crate::error::UiError;
use keys::{KeyCode, KEY_DOWN, KEY_UP, REL_Y};
use queue::EventQueue;

/// Accumulated trackball travel needed for one synthetic up/down key.
const TRACKBALL_THRESHOLD: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Key,
    Relative,
    Sync,
    Other,
}

/// A device event as read from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn key(code: KeyCode, value: i32) -> Self {
        Self { kind: EventKind::Key, code: code as u16, value }
    }

    pub fn rel_y(delta: i32) -> Self {
        Self { kind: EventKind::Relative, code: REL_Y, value: delta }
    }
}

/// A key transition ready for the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    /// 0 release, 1 press, 2 kernel auto-repeat.
    pub value: i32,
    /// Generated from trackball motion; has no matching release.
    pub synthetic: bool,
}

/// Source of raw input events.
pub trait InputSource: Send {
    /// Block until the next event arrives. An error means the source is gone.
    fn next_event(&mut self) -> Result<RawEvent, UiError>;
}

/// Turns vertical trackball motion into discrete up/down presses.
#[derive(Debug, Default)]
pub struct TrackballFilter {
    travel: i32,
}

impl TrackballFilter {
    /// Map one raw event to at most one key event.
    ///
    /// Sync reports are transparent to the accumulator; a device reports
    /// motion as REL + SYN pairs, so resetting on SYN would never let travel
    /// build up.
    pub fn feed(&mut self, event: RawEvent) -> Option<KeyEvent> {
        match event.kind {
            EventKind::Relative => {
                if event.code != REL_Y {
                    return None;
                }
                self.travel += event.value;
                let code = if self.travel > TRACKBALL_THRESHOLD {
                    KEY_DOWN
                } else if self.travel < -TRACKBALL_THRESHOLD {
                    KEY_UP
                } else {
                    return None;
                };
                self.travel = 0;
                Some(KeyEvent { code, value: 1, synthetic: true })
            }
            EventKind::Sync => None,
            EventKind::Key => {
                self.travel = 0;
                Some(KeyEvent { code: KeyCode::from(event.code), value: event.value, synthetic: false })
            }
            EventKind::Other => {
                self.travel = 0;
                None
            }
        }
    }
}

/// Read `source` until it fails, feeding key events into `queue`.
///
/// `on_key_down` runs after every real key press has been queued; the console
/// uses it for the display-toggle and reboot hooks.
pub fn read_loop<F>(source: &mut dyn InputSource, queue: &EventQueue, mut on_key_down: F)
where
    F: FnMut(KeyCode),
{
    let mut filter = TrackballFilter::default();
    loop {
        let event = match source.next_event() {
            Ok(event) => event,
            Err(e) => {
                warn!("Input reader stopping: {}", e);
                return;
            }
        };
        let Some(key) = filter.feed(event) else {
            continue;
        };
        debug!("Key {} value {}{}", key.code, key.value, if key.synthetic { " (trackball)" } else { "" });
        queue.push_key_event(key.code, key.value, key.synthetic);
        if !key.synthetic && key.value > 0 {
            on_key_down(key.code);
        }
    }
}
