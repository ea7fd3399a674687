//! Test doubles for the surface provider and the board.

use anyhow::Result;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::UiError;
use crate::input::keys::KeyCode;
use crate::input::queue::KeyTable;
use crate::platform::{Board, Led};
use crate::ui::{Color, Rect, Surface, SurfaceProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Blit { surface: String, src: Rect, dx: i32, dy: i32 },
    Fill { rect: Rect, color: Color },
    Text { x: i32, y: i32, text: String, color: Color },
    Flip,
}

/// Shared view of everything a [`FakeSurfaces`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct OpLog(Arc<Mutex<Vec<Op>>>);

impl OpLog {
    pub fn take(&self) -> Vec<Op> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn texts(ops: &[Op]) -> Vec<(i32, String, Color)> {
        ops.iter()
            .filter_map(|op| match op {
                Op::Text { y, text, color, .. } => Some((*y, text.clone(), *color)),
                _ => None,
            })
            .collect()
    }

    pub fn blits_of<'a>(ops: &'a [Op], name: &str) -> Vec<&'a Op> {
        ops.iter()
            .filter(|op| matches!(op, Op::Blit { surface, .. } if surface == name))
            .collect()
    }

    pub fn flips(ops: &[Op]) -> usize {
        ops.iter().filter(|op| **op == Op::Flip).count()
    }
}

/// Surface provider with a fixed screen size and a set of named surfaces.
pub struct FakeSurfaces {
    width: u32,
    height: u32,
    known: HashMap<String, (u32, u32)>,
    names: Vec<String>,
    log: OpLog,
}

impl FakeSurfaces {
    /// 480x800 screen with a 10x20 font: 40 rows of 48 columns.
    pub fn new() -> Self {
        Self { width: 480, height: 800, known: HashMap::new(), names: Vec::new(), log: OpLog::default() }
    }

    pub fn with_surface(mut self, name: &str, width: u32, height: u32) -> Self {
        self.known.insert(name.to_string(), (width, height));
        self
    }

    pub fn log(&self) -> OpLog {
        self.log.clone()
    }

    fn record(&self, op: Op) {
        self.log.0.lock().unwrap().push(op);
    }
}

impl SurfaceProvider for FakeSurfaces {
    fn surface_by_name(&mut self, name: &str) -> Result<Surface, UiError> {
        let &(width, height) = self.known.get(name).ok_or_else(|| UiError::missing(name))?;
        let id = match self.names.iter().position(|n| n == name) {
            Some(id) => id,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        };
        Ok(Surface { id, width, height })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn char_size(&self) -> (u32, u32) {
        (10, 20)
    }

    fn blit(&mut self, surface: Surface, src: Rect, dx: i32, dy: i32) {
        let name = self.names[surface.id].clone();
        self.record(Op::Blit { surface: name, src, dx, dy });
    }

    fn fill(&mut self, rect: Rect, color: Color) {
        self.record(Op::Fill { rect, color });
    }

    fn text(&mut self, x: i32, y: i32, text: &str, color: Color) {
        self.record(Op::Text { x, y, text: text.to_string(), color });
    }

    fn flip(&mut self) -> Result<()> {
        self.record(Op::Flip);
        Ok(())
    }
}

/// Board whose sensors and hooks are plain fields.
pub struct FakeBoard {
    /// `None` reads as an unavailable sensor.
    pub battery: Option<u32>,
    pub charging_usb: bool,
    pub charging_ac: bool,
    pub usb_host: bool,
    pub autoboot: bool,
    pub handoff_ok: bool,
    pub integrity_ok: bool,
    pub toggle_key: Option<KeyCode>,
    pub reboot_key: Option<KeyCode>,
    /// Consumed by the next `volumes_changed` call.
    pub volumes: AtomicBool,
    pub leds: Mutex<Vec<(Led, u8)>>,
    pub restarts: AtomicUsize,
    pub power_offs: AtomicUsize,
    pub handoffs: AtomicUsize,
}

impl Default for FakeBoard {
    fn default() -> Self {
        Self {
            battery: Some(50),
            charging_usb: false,
            charging_ac: false,
            usb_host: false,
            autoboot: false,
            handoff_ok: true,
            integrity_ok: true,
            toggle_key: None,
            reboot_key: None,
            volumes: AtomicBool::new(false),
            leds: Mutex::new(Vec::new()),
            restarts: AtomicUsize::new(0),
            power_offs: AtomicUsize::new(0),
            handoffs: AtomicUsize::new(0),
        }
    }
}

impl FakeBoard {
    pub fn leds(&self) -> Vec<(Led, u8)> {
        self.leds.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn power_offs(&self) -> usize {
        self.power_offs.load(Ordering::SeqCst)
    }

    pub fn handoffs(&self) -> usize {
        self.handoffs.load(Ordering::SeqCst)
    }
}

impl Board for FakeBoard {
    fn battery_level(&self) -> Result<u32, UiError> {
        self.battery.ok_or_else(|| UiError::SensorUnavailable {
            path: PathBuf::from("/fake/capacity"),
            source: io::Error::from(io::ErrorKind::NotFound),
        })
    }

    fn charging_usb(&self) -> Result<bool, UiError> {
        Ok(self.charging_usb)
    }

    fn charging_ac(&self) -> Result<bool, UiError> {
        Ok(self.charging_ac)
    }

    fn set_led(&self, led: Led, brightness: u8) -> Result<(), UiError> {
        self.leds.lock().unwrap().push((led, brightness));
        Ok(())
    }

    fn volumes_changed(&self) -> bool {
        self.volumes.swap(false, Ordering::SeqCst)
    }

    fn usb_connected(&self) -> bool {
        self.usb_host
    }

    fn toggle_display(&self, _keys: &KeyTable, code: KeyCode) -> bool {
        self.toggle_key == Some(code)
    }

    fn reboot_now(&self, _keys: &KeyTable, code: KeyCode) -> bool {
        self.reboot_key == Some(code)
    }

    fn restart(&self) -> Result<(), UiError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn power_off(&self) -> Result<(), UiError> {
        self.power_offs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn verify_environment(&self) -> Result<(), UiError> {
        if self.integrity_ok {
            Ok(())
        } else {
            Err(UiError::Integrity("fake board says no".into()))
        }
    }

    fn autoboot_enabled(&self) -> bool {
        self.autoboot
    }

    fn boot_handoff(&self) -> Result<(), UiError> {
        self.handoffs.fetch_add(1, Ordering::SeqCst);
        if self.handoff_ok {
            Ok(())
        } else {
            Err(UiError::action("boot hand-off", "kexec missing"))
        }
    }
}
