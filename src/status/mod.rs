//! Status pollers
//!
//! Two periodic loops that run beside the console: the battery/LED indicator
//! and the automatic boot countdown. Sensor failures degrade to neutral
//! values; neither loop ever takes the update lock for longer than one redraw.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::CountdownConfig;
use crate::platform::{Board, Led};

/// Brightness tier for one indicator LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedLevel {
    Off,
    Dim,
    Solid,
}

impl LedLevel {
    pub fn brightness(self) -> u8 {
        match self {
            LedLevel::Off => 0,
            LedLevel::Dim => 122,
            LedLevel::Solid => 255,
        }
    }
}

/// Map charge and charging state to (red, green).
///
/// A level of 0 usually means the sensor could not be read and is treated as
/// 1%.
pub fn led_levels(level: u32, charging: bool) -> (LedLevel, LedLevel) {
    if !charging {
        return (LedLevel::Off, LedLevel::Off);
    }
    match level.max(1) {
        0..=90 => (LedLevel::Solid, LedLevel::Off),
        91..=99 => (LedLevel::Dim, LedLevel::Dim),
        _ => (LedLevel::Off, LedLevel::Solid),
    }
}

pub struct BatteryPoller {
    board: Arc<dyn Board>,
}

impl BatteryPoller {
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self { board }
    }

    /// Read the sensors once and drive both LEDs. Returns what was written.
    pub fn poll_once(&self) -> (LedLevel, LedLevel) {
        let level = self.board.battery_level().unwrap_or_else(|e| {
            debug!("{}", e);
            0
        });
        let usb = self.board.charging_usb().unwrap_or_else(|e| {
            debug!("{}", e);
            false
        });
        let ac = self.board.charging_ac().unwrap_or_else(|e| {
            debug!("{}", e);
            false
        });

        let (red, green) = led_levels(level, usb || ac);
        for (led, tier) in [(Led::Red, red), (Led::Green, green)] {
            if let Err(e) = self.board.set_led(led, tier.brightness()) {
                debug!("LED {:?} not updated: {}", led, e);
            }
        }
        (red, green)
    }

    pub fn run(self, interval: Duration) {
        loop {
            thread::sleep(interval);
            self.poll_once();
        }
    }
}

/// Where the countdown draws and reports.
pub trait CountdownDisplay: Send + Sync {
    /// Show the icon for `value` in place of the background icon.
    fn show_countdown(&self, value: u32);

    /// Put a line in the on-screen log.
    fn report(&self, message: &str);
}

/// Surface name for a countdown value: `bm` at the first step, `b<n>` after.
pub fn countdown_icon_name(value: u32, start: u32) -> Option<String> {
    match value {
        0 => None,
        v if v == start => Some("bm".to_string()),
        v => Some(format!("b{v}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// Gated off or cancelled; nothing happened.
    Idle,
    Showing(u32),
    HandedOff,
    Failed,
}

pub struct Countdown {
    board: Arc<dyn Board>,
    value: u32,
    executed: bool,
    cancelled: Arc<AtomicBool>,
}

impl Countdown {
    pub fn new(board: Arc<dyn Board>, config: &CountdownConfig, cancelled: Arc<AtomicBool>) -> Self {
        Self { board, value: config.start, executed: false, cancelled }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Advance one step. The hand-off runs at zero, at most once.
    pub fn tick(&mut self, display: &dyn CountdownDisplay) -> CountdownStep {
        if self.cancelled.load(Ordering::Relaxed) || !self.board.autoboot_enabled() {
            return CountdownStep::Idle;
        }

        if self.value > 0 {
            display.show_countdown(self.value);
            self.value -= 1;
            return CountdownStep::Showing(self.value + 1);
        }
        if self.executed {
            return CountdownStep::Idle;
        }

        self.executed = true;
        info!("Countdown expired; handing off");
        display.report("Booting...");
        match self.board.boot_handoff() {
            Ok(()) => CountdownStep::HandedOff,
            Err(e) => {
                error!("{}", e);
                display.report("Something went wrong, please see log!");
                self.cancelled.store(true, Ordering::Relaxed);
                CountdownStep::Failed
            }
        }
    }

    /// Tick every `step` until the hand-off has run or failed.
    pub fn run(&mut self, display: &dyn CountdownDisplay, step: Duration) {
        loop {
            match self.tick(display) {
                CountdownStep::HandedOff | CountdownStep::Failed => return,
                CountdownStep::Idle | CountdownStep::Showing(_) => thread::sleep(step),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBoard;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        shown: Mutex<Vec<u32>>,
        reports: Mutex<Vec<String>>,
    }

    impl CountdownDisplay for Recorder {
        fn show_countdown(&self, value: u32) {
            self.shown.lock().unwrap().push(value);
        }
        fn report(&self, message: &str) {
            self.reports.lock().unwrap().push(message.to_string());
        }
    }

    fn countdown(board: FakeBoard, start: u32) -> (Arc<FakeBoard>, Countdown, Arc<AtomicBool>) {
        let board = Arc::new(board);
        let cancelled = Arc::new(AtomicBool::new(false));
        let config = CountdownConfig { enabled: true, start, step: Duration::from_millis(1) };
        let cd = Countdown::new(board.clone(), &config, cancelled.clone());
        (board, cd, cancelled)
    }

    #[test]
    fn led_policy_tiers() {
        assert_eq!(led_levels(95, true), (LedLevel::Dim, LedLevel::Dim));
        assert_eq!(led_levels(100, true), (LedLevel::Off, LedLevel::Solid));
        assert_eq!(led_levels(90, true), (LedLevel::Solid, LedLevel::Off));
        assert_eq!(led_levels(0, true), (LedLevel::Solid, LedLevel::Off));
        assert_eq!(led_levels(100, false), (LedLevel::Off, LedLevel::Off));
    }

    #[test]
    fn poller_drives_leds_when_charging_on_ac() {
        let board = Arc::new(FakeBoard { battery: Some(95), charging_ac: true, ..FakeBoard::default() });
        let poller = BatteryPoller::new(board.clone());
        assert_eq!(poller.poll_once(), (LedLevel::Dim, LedLevel::Dim));
        assert_eq!(board.leds(), vec![(Led::Red, 122), (Led::Green, 122)]);

        let board = Arc::new(FakeBoard { battery: Some(100), charging_ac: true, ..FakeBoard::default() });
        BatteryPoller::new(board.clone()).poll_once();
        assert_eq!(board.leds(), vec![(Led::Red, 0), (Led::Green, 255)]);
    }

    #[test]
    fn usb_charging_counts_as_charging() {
        let board = Arc::new(FakeBoard { battery: Some(40), charging_usb: true, ..FakeBoard::default() });
        assert_eq!(BatteryPoller::new(board.clone()).poll_once(), (LedLevel::Solid, LedLevel::Off));
        assert_eq!(board.leds(), vec![(Led::Red, 255), (Led::Green, 0)]);
    }

    #[test]
    fn unreadable_sensors_turn_leds_off() {
        let board = Arc::new(FakeBoard { battery: None, ..FakeBoard::default() });
        let poller = BatteryPoller::new(board.clone());
        assert_eq!(poller.poll_once(), (LedLevel::Off, LedLevel::Off));
    }

    #[test]
    fn icon_names_follow_value() {
        assert_eq!(countdown_icon_name(11, 11).as_deref(), Some("bm"));
        assert_eq!(countdown_icon_name(10, 11).as_deref(), Some("b10"));
        assert_eq!(countdown_icon_name(1, 11).as_deref(), Some("b1"));
        assert_eq!(countdown_icon_name(0, 11), None);
    }

    #[test]
    fn counts_down_then_hands_off_once() {
        let (board, mut cd, _) = countdown(FakeBoard { autoboot: true, ..FakeBoard::default() }, 3);
        let display = Recorder::default();

        let steps: Vec<_> = (0..6).map(|_| cd.tick(&display)).collect();
        assert_eq!(
            steps,
            vec![
                CountdownStep::Showing(3),
                CountdownStep::Showing(2),
                CountdownStep::Showing(1),
                CountdownStep::HandedOff,
                CountdownStep::Idle,
                CountdownStep::Idle,
            ]
        );
        assert_eq!(*display.shown.lock().unwrap(), vec![3, 2, 1]);
        assert_eq!(board.handoffs(), 1);
    }

    #[test]
    fn failed_handoff_reports_and_stops() {
        let board = FakeBoard { autoboot: true, handoff_ok: false, ..FakeBoard::default() };
        let (board, mut cd, cancelled) = countdown(board, 1);
        let display = Recorder::default();

        cd.run(&display, Duration::from_millis(1));
        assert!(cancelled.load(Ordering::Relaxed));
        assert_eq!(board.handoffs(), 1);
        let reports = display.reports.lock().unwrap();
        assert_eq!(reports.last().map(String::as_str), Some("Something went wrong, please see log!"));
        assert_eq!(cd.tick(&display), CountdownStep::Idle);
    }

    #[test]
    fn gated_countdown_does_not_move() {
        let (_, mut cd, _) = countdown(FakeBoard::default(), 5);
        let display = Recorder::default();
        assert_eq!(cd.tick(&display), CountdownStep::Idle);
        assert_eq!(cd.value(), 5);
    }

    #[test]
    fn cancelled_countdown_does_not_move() {
        let (_, mut cd, cancelled) = countdown(FakeBoard { autoboot: true, ..FakeBoard::default() }, 5);
        cancelled.store(true, Ordering::Relaxed);
        assert_eq!(cd.tick(&Recorder::default()), CountdownStep::Idle);
        assert_eq!(cd.value(), 5);
    }
}
