//! Evdev-based input source

use anyhow::{anyhow, Context, Result};
use evdev::{Device, EventType, InputEvent};
use std::collections::VecDeque;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::{debug, info, warn};

use super::keys::{KeyCode, KEY_BACKSPACE, KEY_DOWN, KEY_ENTER, KEY_UP};
use super::{EventKind, InputSource, RawEvent};
use crate::error::UiError;

const INPUT_DIR: &str = "/dev/input";

/// Events from every key or trackball device, merged into one stream.
///
/// Each device gets its own blocking reader thread.
pub struct EvdevSource {
    events: Receiver<RawEvent>,
}

impl EvdevSource {
    pub fn open() -> Result<Self> {
        Self::open_dir(Path::new(INPUT_DIR))
    }

    pub fn open_dir(dir: &Path) -> Result<Self> {
        let devices = find_devices(dir)?;
        let (tx, rx) = mpsc::channel();
        for (path, device) in devices {
            let tx = tx.clone();
            let node = path.file_name().map(|n| n.to_string_lossy().into_owned());
            thread::Builder::new()
                .name(format!("input-{}", node.unwrap_or_default()))
                .spawn(move || pump(device, &path, &tx))
                .context("Failed to spawn input reader thread")?;
        }
        Ok(Self { events: rx })
    }
}

impl InputSource for EvdevSource {
    fn next_event(&mut self) -> Result<RawEvent, UiError> {
        self.events
            .recv()
            .map_err(|_| UiError::Input("all input devices closed".into()))
    }
}

/// Find `event*` nodes under `dir` that report keys or relative motion.
fn find_devices(dir: &Path) -> Result<Vec<(PathBuf, Device)>> {
    if !dir.exists() {
        return Err(anyhow!("{} directory not found", dir.display()));
    }

    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {} directory", dir.display()))?;

    let mut devices = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_event_node = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("event"));
        if !is_event_node {
            continue;
        }
        match Device::open(&path) {
            Ok(device) => {
                if device.supported_keys().is_some() || device.supported_relative_axes().is_some() {
                    info!("Found input device: {:?} ({})", path, device.name().unwrap_or("unnamed"));
                    devices.push((path, device));
                }
            }
            Err(e) => debug!("Skipping {:?}: {}", path, e),
        }
    }

    if devices.is_empty() {
        return Err(anyhow!("No input devices found in {}", dir.display()));
    }
    Ok(devices)
}

fn pump(mut device: Device, path: &Path, tx: &Sender<RawEvent>) {
    loop {
        match device.fetch_events() {
            Ok(events) => {
                for event in events {
                    if tx.send(convert(&event)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("Input device {:?} failed: {}", path, e);
                return;
            }
        }
    }
}

fn convert(event: &InputEvent) -> RawEvent {
    let ty = event.event_type();
    let kind = if ty == EventType::KEY {
        EventKind::Key
    } else if ty == EventType::RELATIVE {
        EventKind::Relative
    } else if ty == EventType::SYNCHRONIZATION {
        EventKind::Sync
    } else {
        EventKind::Other
    };
    RawEvent { kind, code: event.code(), value: event.value() }
}

/// Keyboard-on-a-terminal fallback for boards without evdev nodes.
///
/// `w`/`k` move up, `s`/`j` move down, Enter selects and Backspace goes back.
/// Each byte becomes a press immediately followed by a release.
#[derive(Debug, Default)]
pub struct StdinSource {
    pending: VecDeque<RawEvent>,
}

impl StdinSource {
    pub fn new() -> Self {
        // A previous owner of the terminal may have left stdin non-blocking.
        use nix::fcntl::{fcntl, FcntlArg, OFlag};
        let stdin_fd = 0;
        if let Ok(flags) = fcntl(stdin_fd, FcntlArg::F_GETFL) {
            let mut flags = OFlag::from_bits_truncate(flags);
            flags.remove(OFlag::O_NONBLOCK);
            let _ = fcntl(stdin_fd, FcntlArg::F_SETFL(flags));
        }
        Self::default()
    }

    fn map_byte(byte: u8) -> Option<KeyCode> {
        match byte.to_ascii_lowercase() {
            b'w' | b'k' => Some(KEY_UP),
            b's' | b'j' => Some(KEY_DOWN),
            b'\n' | b'\r' => Some(KEY_ENTER),
            0x08 | 0x7f => Some(KEY_BACKSPACE),
            _ => None,
        }
    }
}

impl InputSource for StdinSource {
    fn next_event(&mut self) -> Result<RawEvent, UiError> {
        let mut buffer = [0u8; 1];
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            match std::io::stdin().lock().read(&mut buffer) {
                Ok(0) => return Err(UiError::Input("stdin closed".into())),
                Ok(_) => {
                    if let Some(code) = Self::map_byte(buffer[0]) {
                        self.pending.push_back(RawEvent::key(code, 1));
                        self.pending.push_back(RawEvent::key(code, 0));
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(UiError::Input(e.to_string())),
            }
        }
    }
}

/// Open every evdev device, or fall back to stdin when there are none.
pub fn create_source() -> Box<dyn InputSource> {
    match EvdevSource::open() {
        Ok(source) => {
            info!("Evdev input source initialized successfully");
            Box::new(source)
        }
        Err(e) => {
            warn!("Failed to initialize evdev: {:#}. Using stdin fallback.", e);
            Box::new(StdinSource::new())
        }
    }
}
