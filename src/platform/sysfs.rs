use anyhow::{anyhow, Context, Result};
use nix::sys::reboot::{reboot, RebootMode};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info};

use super::{Board, Led};
use crate::error::UiError;
use crate::input::keys::{KeyCode, KEY_END, KEY_HOME, KEY_MENU, KEY_POWER, KEY_VOLUMEDOWN};
use crate::input::queue::KeyTable;
use crate::lock::lock_or_recover;

const DEFAULT_PATH: &str = "/sbin:/usr/sbin:/bin:/usr/bin";

/// Every device path the sysfs board touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardPaths {
    pub battery_capacity: PathBuf,
    pub charging_usb: PathBuf,
    pub charging_ac: PathBuf,
    pub red_led: PathBuf,
    pub green_led: PathBuf,
    /// Gadget state file; starts with 'C' (CONNECTED/CONFIGURED) when a host
    /// is attached.
    pub usb_state: PathBuf,
    pub mountinfo: PathBuf,
    /// Executable run by the boot countdown. Its presence enables the countdown.
    pub autoboot_script: PathBuf,
    /// Paths that must exist for the environment to pass the integrity check.
    pub required: Vec<PathBuf>,
}

impl Default for BoardPaths {
    fn default() -> Self {
        Self {
            battery_capacity: PathBuf::from("/sys/class/power_supply/battery/capacity"),
            charging_usb: PathBuf::from("/sys/class/power_supply/usb/online"),
            charging_ac: PathBuf::from("/sys/class/power_supply/ac/online"),
            red_led: PathBuf::from("/sys/class/leds/red/brightness"),
            green_led: PathBuf::from("/sys/class/leds/green/brightness"),
            usb_state: PathBuf::from("/sys/class/android_usb/android0/state"),
            mountinfo: PathBuf::from("/proc/self/mountinfo"),
            autoboot_script: PathBuf::from("/etc/recovery/autoboot.sh"),
            required: vec![PathBuf::from("/proc/self/mountinfo")],
        }
    }
}

impl BoardPaths {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Override defaults from `RECOVERY_*` keys. `RECOVERY_REQUIRED_PATHS` is
    /// colon-separated.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut paths = Self::default();
        let overrides: [(&str, &mut PathBuf); 8] = [
            ("RECOVERY_BATTERY_CAPACITY", &mut paths.battery_capacity),
            ("RECOVERY_CHARGING_USB", &mut paths.charging_usb),
            ("RECOVERY_CHARGING_AC", &mut paths.charging_ac),
            ("RECOVERY_LED_RED", &mut paths.red_led),
            ("RECOVERY_LED_GREEN", &mut paths.green_led),
            ("RECOVERY_USB_STATE", &mut paths.usb_state),
            ("RECOVERY_MOUNTINFO", &mut paths.mountinfo),
            ("RECOVERY_AUTOBOOT_SCRIPT", &mut paths.autoboot_script),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key) {
                *slot = PathBuf::from(value);
            }
        }
        if let Some(list) = lookup("RECOVERY_REQUIRED_PATHS") {
            paths.required = list.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect();
        }
        paths
    }
}

/// Board backed by sysfs/procfs pseudo-files.
pub struct SysfsBoard {
    paths: BoardPaths,
    /// Last mountinfo contents seen by `volumes_changed`.
    mounts: Mutex<Option<String>>,
}

impl SysfsBoard {
    pub fn new(paths: BoardPaths) -> Self {
        Self { paths, mounts: Mutex::new(None) }
    }
}

impl Board for SysfsBoard {
    fn battery_level(&self) -> Result<u32, UiError> {
        read_number(&self.paths.battery_capacity)
    }

    fn charging_usb(&self) -> Result<bool, UiError> {
        read_flag(&self.paths.charging_usb)
    }

    fn charging_ac(&self) -> Result<bool, UiError> {
        read_flag(&self.paths.charging_ac)
    }

    fn set_led(&self, led: Led, brightness: u8) -> Result<(), UiError> {
        let path = match led {
            Led::Red => &self.paths.red_led,
            Led::Green => &self.paths.green_led,
        };
        fs::write(path, brightness.to_string())
            .map_err(|source| UiError::SensorUnavailable { path: path.clone(), source })
    }

    fn volumes_changed(&self) -> bool {
        let Ok(current) = fs::read_to_string(&self.paths.mountinfo) else {
            return false;
        };
        let mut last = lock_or_recover(&self.mounts, "mountinfo snapshot");
        let changed = last.as_ref().is_some_and(|previous| *previous != current);
        *last = Some(current);
        if changed {
            info!("Mounted volumes changed");
        }
        changed
    }

    fn usb_connected(&self) -> bool {
        let mut first = [0u8; 1];
        match fs::File::open(&self.paths.usb_state).and_then(|mut f| f.read(&mut first)) {
            Ok(1) => first[0] == b'C',
            Ok(_) => false,
            Err(e) => {
                debug!("Failed to read {}: {}", self.paths.usb_state.display(), e);
                false
            }
        }
    }

    fn toggle_display(&self, _keys: &KeyTable, code: KeyCode) -> bool {
        matches!(code, KEY_HOME | KEY_MENU | KEY_END)
    }

    fn reboot_now(&self, keys: &KeyTable, code: KeyCode) -> bool {
        // Power held while pressing volume down.
        code == KEY_VOLUMEDOWN && keys.is_down(KEY_POWER)
    }

    fn restart(&self) -> Result<(), UiError> {
        nix::unistd::sync();
        match reboot(RebootMode::RB_AUTOBOOT) {
            Ok(never) => match never {},
            Err(errno) => Err(UiError::action("reboot", errno)),
        }
    }

    fn power_off(&self) -> Result<(), UiError> {
        nix::unistd::sync();
        match reboot(RebootMode::RB_POWER_OFF) {
            Ok(never) => match never {},
            Err(errno) => Err(UiError::action("power off", errno)),
        }
    }

    fn verify_environment(&self) -> Result<(), UiError> {
        let missing: Vec<String> = self
            .paths
            .required
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(UiError::Integrity(format!("missing {}", missing.join(", "))))
        }
    }

    fn autoboot_enabled(&self) -> bool {
        self.paths.autoboot_script.is_file()
    }

    fn boot_handoff(&self) -> Result<(), UiError> {
        let script = self.paths.autoboot_script.to_string_lossy();
        run("/bin/sh", &[script.as_ref()]).map_err(|e| UiError::action("boot hand-off", format!("{e:#}")))
    }
}

/// Parse a pseudo-file holding an ASCII integer, the way sysfs writes them.
fn read_number(path: &Path) -> Result<u32, UiError> {
    let s = fs::read_to_string(path)
        .map_err(|source| UiError::SensorUnavailable { path: path.to_path_buf(), source })?;
    let s = s.trim();
    s.parse::<u32>()
        .map_err(|_| UiError::InvalidSensorValue { path: path.to_path_buf(), value: s.to_string() })
}

fn read_flag(path: &Path) -> Result<bool, UiError> {
    read_number(path).map(|v| v != 0)
}

fn run(program: &str, args: &[&str]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .env("PATH", DEFAULT_PATH)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("Failed to execute {program}"))?;

    if output.status.success() {
        return Ok(());
    }

    Err(anyhow!(
        "{program} failed: stdout='{}' stderr='{}'",
        String::from_utf8_lossy(&output.stdout).trim(),
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn paths_in(root: &Path) -> BoardPaths {
        BoardPaths {
            battery_capacity: root.join("battery/capacity"),
            charging_usb: root.join("usb/online"),
            charging_ac: root.join("ac/online"),
            red_led: root.join("leds/red/brightness"),
            green_led: root.join("leds/green/brightness"),
            usb_state: root.join("android0/state"),
            mountinfo: root.join("mountinfo"),
            autoboot_script: root.join("autoboot.sh"),
            required: vec![root.join("mountinfo")],
        }
    }

    #[test]
    fn reads_battery_and_charging() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        write(&paths.battery_capacity, "95\n");
        write(&paths.charging_usb, "0\n");
        write(&paths.charging_ac, "1\n");
        let board = SysfsBoard::new(paths);

        assert_eq!(board.battery_level().unwrap(), 95);
        assert!(!board.charging_usb().unwrap());
        assert!(board.charging_ac().unwrap());
    }

    #[test]
    fn missing_sensor_is_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let board = SysfsBoard::new(paths_in(temp.path()));
        assert!(matches!(board.battery_level(), Err(UiError::SensorUnavailable { .. })));
    }

    #[test]
    fn garbage_sensor_is_invalid() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        write(&paths.battery_capacity, "full\n");
        let board = SysfsBoard::new(paths);
        match board.battery_level() {
            Err(UiError::InvalidSensorValue { value, .. }) => assert_eq!(value, "full"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn leds_are_written_as_ascii() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        write(&paths.red_led, "");
        write(&paths.green_led, "");
        let board = SysfsBoard::new(paths.clone());

        board.set_led(Led::Red, 122).unwrap();
        board.set_led(Led::Green, 0).unwrap();
        assert_eq!(fs::read_to_string(&paths.red_led).unwrap(), "122");
        assert_eq!(fs::read_to_string(&paths.green_led).unwrap(), "0");
    }

    #[test]
    fn led_write_to_missing_dir_fails() {
        let temp = tempfile::tempdir().unwrap();
        let board = SysfsBoard::new(paths_in(temp.path()));
        assert!(board.set_led(Led::Red, 255).is_err());
    }

    #[test]
    fn volume_change_detected_after_first_snapshot() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        write(&paths.mountinfo, "22 1 8:1 / / rw - ext4 /dev/sda1 rw\n");
        let board = SysfsBoard::new(paths.clone());

        assert!(!board.volumes_changed());
        assert!(!board.volumes_changed());
        write(
            &paths.mountinfo,
            "22 1 8:1 / / rw - ext4 /dev/sda1 rw\n40 22 179:1 / /sdcard rw - vfat /dev/mmcblk0p1 rw\n",
        );
        assert!(board.volumes_changed());
        assert!(!board.volumes_changed());
    }

    #[test]
    fn usb_state_prefix_decides_connection() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        let board = SysfsBoard::new(paths.clone());
        assert!(!board.usb_connected());

        write(&paths.usb_state, "CONFIGURED\n");
        assert!(board.usb_connected());
        write(&paths.usb_state, "DISCONNECTED\n");
        assert!(!board.usb_connected());
    }

    #[test]
    fn integrity_requires_listed_paths() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        let board = SysfsBoard::new(paths.clone());
        assert!(matches!(board.verify_environment(), Err(UiError::Integrity(_))));

        write(&paths.mountinfo, "");
        board.verify_environment().unwrap();
    }

    #[test]
    fn autoboot_follows_script_presence() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        let board = SysfsBoard::new(paths.clone());
        assert!(!board.autoboot_enabled());
        write(&paths.autoboot_script, "exit 0\n");
        assert!(board.autoboot_enabled());
    }

    #[test]
    fn failing_handoff_reports_output() {
        let temp = tempfile::tempdir().unwrap();
        let paths = paths_in(temp.path());
        write(&paths.autoboot_script, "echo no kernel >&2\nexit 3\n");
        let board = SysfsBoard::new(paths);
        let err = board.boot_handoff().unwrap_err();
        assert!(err.to_string().contains("no kernel"));
    }

    #[test]
    fn env_overrides_paths() {
        let map: HashMap<&str, &str> = [
            ("RECOVERY_LED_RED", "/tmp/red"),
            ("RECOVERY_REQUIRED_PATHS", "/a::/b"),
        ]
        .into_iter()
        .collect();
        let paths = BoardPaths::from_lookup(|k| map.get(k).map(|v| v.to_string()));
        assert_eq!(paths.red_led, PathBuf::from("/tmp/red"));
        assert_eq!(paths.required, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(paths.green_led, BoardPaths::default().green_led);
    }
}
