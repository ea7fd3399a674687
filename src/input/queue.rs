//! Key event queue and key-press tracking
//!
//! A bounded FIFO of key codes fed by the input reader and drained by
//! [`EventQueue::wait_for_key`]. Cancellation is carried out of band so a waiter
//! can always be woken, even when the queue is full.
//!
//! The per-key press table is written under the queue lock but read without
//! it. Those reads only steer repeat timing, so a value that is a few
//! microseconds stale is fine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::keys::{self, KeyCode, KEY_MAX};
use crate::config::{QueueTiming, RepeatPolicy};
use crate::lock::lock_or_recover;

/// Outcome of a key wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWait {
    /// A key went down.
    Key(KeyCode),
    /// No key, but mounted volumes changed; the caller should re-evaluate.
    Refresh,
    /// The overall wait ceiling passed with no key and no USB keep-alive.
    TimedOut,
    /// [`EventQueue::cancel_wait`] was called.
    Cancelled,
}

/// External conditions polled while a wait is blocked.
pub trait WaitConditions {
    /// Mounted volumes changed since the last call.
    fn volumes_changed(&self) -> bool;

    /// A host is attached over USB; keeps a wait alive past its ceiling.
    fn usb_connected(&self) -> bool;
}

/// Per-key state, indexed by key code.
///
/// Timestamps are nanoseconds since queue creation plus one, so zero means
/// "never".
pub struct KeyTable {
    down: Vec<AtomicBool>,
    pressed_at: Vec<AtomicU64>,
    last_repeat: Vec<AtomicU64>,
}

impl KeyTable {
    fn new() -> Self {
        let len = KEY_MAX as usize + 1;
        Self {
            down: (0..len).map(|_| AtomicBool::new(false)).collect(),
            pressed_at: (0..len).map(|_| AtomicU64::new(0)).collect(),
            last_repeat: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn is_down(&self, code: KeyCode) -> bool {
        slot(&self.down, code).is_some_and(|d| d.load(Ordering::Relaxed))
    }

    fn set_down(&self, code: KeyCode, down: bool) {
        if let Some(d) = slot(&self.down, code) {
            d.store(down, Ordering::Relaxed);
        }
    }

    fn pressed_at(&self, code: KeyCode) -> u64 {
        slot(&self.pressed_at, code).map_or(0, |t| t.load(Ordering::Relaxed))
    }

    fn last_repeat_raw(&self, code: KeyCode) -> u64 {
        slot(&self.last_repeat, code).map_or(0, |t| t.load(Ordering::Relaxed))
    }

    fn record_press(&self, code: KeyCode, stamp: u64) {
        if let (Some(pressed), Some(last)) = (slot(&self.pressed_at, code), slot(&self.last_repeat, code)) {
            pressed.store(stamp, Ordering::Relaxed);
            last.store(0, Ordering::Relaxed);
        }
    }

    fn record_repeat(&self, code: KeyCode, stamp: u64) {
        if let Some(last) = slot(&self.last_repeat, code) {
            last.store(stamp, Ordering::Relaxed);
        }
    }

    /// When `code` was last released to a repeat-mode waiter, relative to the
    /// queue's creation.
    pub fn last_repeat(&self, code: KeyCode) -> Option<Duration> {
        match self.last_repeat_raw(code) {
            0 => None,
            t => Some(Duration::from_nanos(t - 1)),
        }
    }
}

/// Table entry for `code`; `None` outside `0..=KEY_MAX`.
fn slot<T>(table: &[T], code: KeyCode) -> Option<&T> {
    if keys::is_valid(code) {
        table.get(code as usize)
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct Pending {
    codes: VecDeque<KeyCode>,
    cancellations: usize,
}

impl Pending {
    fn is_ready(&self) -> bool {
        self.cancellations > 0 || !self.codes.is_empty()
    }

    fn take_cancellation(&mut self) -> bool {
        if self.cancellations > 0 {
            self.cancellations -= 1;
            true
        } else {
            false
        }
    }
}

enum Outcome {
    Ready,
    Refresh,
    TimedOut,
}

pub struct EventQueue {
    pending: Mutex<Pending>,
    available: Condvar,
    keys: KeyTable,
    timing: QueueTiming,
    repeat: RepeatPolicy,
    repeat_enabled: AtomicBool,
    origin: Instant,
}

impl EventQueue {
    pub fn new(timing: QueueTiming, repeat: RepeatPolicy) -> Self {
        let repeat_enabled = AtomicBool::new(repeat.enabled);
        Self {
            pending: Mutex::new(Pending {
                codes: VecDeque::with_capacity(timing.capacity),
                cancellations: 0,
            }),
            available: Condvar::new(),
            keys: KeyTable::new(),
            timing,
            repeat,
            repeat_enabled,
            origin: Instant::now(),
        }
    }

    pub fn keys(&self) -> &KeyTable {
        &self.keys
    }

    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.keys.is_down(code)
    }

    pub fn repeat_enabled(&self) -> bool {
        self.repeat_enabled.load(Ordering::Relaxed)
    }

    /// Queue a key code. Returns false (and drops it) when the queue is full
    /// or the code is not a key.
    pub fn push(&self, code: KeyCode) -> bool {
        if !keys::is_valid(code) {
            debug!("Ignoring out-of-range key code {}", code);
            return false;
        }
        let mut pending = lock_or_recover(&self.pending, "key queue push");
        self.enqueue_locked(&mut pending, code)
    }

    /// Record a key transition from the input device and queue key-downs.
    ///
    /// Synthetic keys (from trackball motion) have no matching release, so they
    /// are queued without touching the press table.
    pub fn push_key_event(&self, code: KeyCode, value: i32, synthetic: bool) -> bool {
        if !keys::is_valid(code) {
            return false;
        }
        if value == 2 && self.repeat_enabled.swap(false, Ordering::Relaxed) {
            debug!("Kernel key repeat detected; disabling software repeat");
        }

        let mut pending = lock_or_recover(&self.pending, "key queue push");
        if !synthetic {
            self.keys.set_down(code, value > 0);
        }
        if value <= 0 {
            return false;
        }
        let queued = self.enqueue_locked(&mut pending, code);
        if queued && self.repeat_enabled() {
            self.keys.record_press(code, self.now_stamp());
        }
        queued
    }

    fn enqueue_locked(&self, pending: &mut Pending, code: KeyCode) -> bool {
        if pending.codes.len() >= self.timing.capacity {
            debug!("Key queue full; dropping key {}", code);
            return false;
        }
        pending.codes.push_back(code);
        self.available.notify_one();
        true
    }

    /// Wake one waiter with [`KeyWait::Cancelled`].
    pub fn cancel_wait(&self) {
        let mut pending = lock_or_recover(&self.pending, "key queue cancel");
        pending.cancellations += 1;
        self.available.notify_one();
    }

    /// Drop every pending key and cancellation.
    pub fn clear(&self) {
        let mut pending = lock_or_recover(&self.pending, "key queue clear");
        pending.codes.clear();
        pending.cancellations = 0;
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.pending, "key queue len").codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until a key is available, the wait is cancelled, volumes change,
    /// or the overall ceiling passes.
    pub fn wait_for_key<W: WaitConditions + ?Sized>(&self, conditions: &W) -> KeyWait {
        if self.repeat_enabled() {
            self.wait_with_repeat(conditions)
        } else {
            self.wait_plain(conditions)
        }
    }

    fn wait_plain<W: WaitConditions + ?Sized>(&self, conditions: &W) -> KeyWait {
        let pending = lock_or_recover(&self.pending, "key wait");
        let (mut pending, outcome) = self.wait_until_ready(pending, conditions);
        match outcome {
            Outcome::Refresh => KeyWait::Refresh,
            Outcome::TimedOut => KeyWait::TimedOut,
            Outcome::Ready => {
                if pending.take_cancellation() {
                    return KeyWait::Cancelled;
                }
                pending.codes.pop_front().map_or(KeyWait::TimedOut, KeyWait::Key)
            }
        }
    }

    /// Repeat-aware wait: a held repeatable key is re-queued behind other
    /// pending events and only released again once the initial delay (since
    /// the press) and the repeat interval (since the last release) have both
    /// passed.
    fn wait_with_repeat<W: WaitConditions + ?Sized>(&self, conditions: &W) -> KeyWait {
        let delay = nanos(self.repeat.initial_delay);
        let interval = nanos(self.repeat.interval);

        loop {
            let pending = lock_or_recover(&self.pending, "key wait");
            let (mut pending, outcome) = self.wait_until_ready(pending, conditions);
            match outcome {
                Outcome::Refresh => return KeyWait::Refresh,
                Outcome::TimedOut => return KeyWait::TimedOut,
                Outcome::Ready => {}
            }

            let mut idle_pops = 0;
            let mut soonest: Option<u64> = None;
            loop {
                if pending.take_cancellation() {
                    return KeyWait::Cancelled;
                }
                let Some(code) = pending.codes.pop_front() else {
                    break;
                };

                let last = self.keys.last_repeat_raw(code);
                let down = self.keys.is_down(code);
                if !down && last > 0 {
                    // Released after it already repeated.
                    continue;
                }
                if !self.repeat.can_repeat(code) {
                    return KeyWait::Key(code);
                }

                if down {
                    pending.codes.push_back(code);
                }
                let now = self.now_stamp();
                let due = if last == 0 {
                    now
                } else {
                    (self.keys.pressed_at(code) + delay).max(last + interval)
                };
                if now >= due {
                    self.keys.record_repeat(code, now);
                    return KeyWait::Key(code);
                }

                idle_pops += 1;
                let wait = due - now;
                soonest = Some(soonest.map_or(wait, |s| s.min(wait)));
                if idle_pops >= pending.codes.len() {
                    // Everything queued is a held key waiting for its repeat slot.
                    let wait = Duration::from_nanos(soonest.take().unwrap_or(0));
                    pending = self
                        .available
                        .wait_timeout(pending, wait)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                    idle_pops = 0;
                }
            }
        }
    }

    /// Wait for a pending key or cancellation, re-checking volume changes
    /// every refresh interval and honoring the USB keep-alive at the ceiling.
    fn wait_until_ready<'a, W: WaitConditions + ?Sized>(
        &'a self,
        mut pending: MutexGuard<'a, Pending>,
        conditions: &W,
    ) -> (MutexGuard<'a, Pending>, Outcome) {
        let mut remaining = self.timing.wait_timeout;
        loop {
            let deadline = Instant::now() + self.timing.refresh_interval;
            while !pending.is_ready() {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                pending = self
                    .available
                    .wait_timeout(pending, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                if conditions.volumes_changed() {
                    return (pending, Outcome::Refresh);
                }
            }
            if pending.is_ready() {
                return (pending, Outcome::Ready);
            }
            remaining = remaining.saturating_sub(self.timing.refresh_interval);
            if remaining.is_zero() && !conditions.usb_connected() {
                return (pending, Outcome::TimedOut);
            }
        }
    }

    fn now_stamp(&self) -> u64 {
        nanos(self.origin.elapsed()) + 1
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
