//! Console configuration
//!
//! Every knob has a board default; `UiConfig::from_env` lets the init scripts
//! override the handful that vary between devices.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::input::keys::{KeyCode, DEFAULT_REPEATABLE_KEYS};

/// Text grid limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Widest log line kept (the last column is reserved).
    pub max_cols: usize,
    /// Log ring capacity.
    pub max_rows: usize,
    /// Widest menu line kept.
    pub menu_max_cols: usize,
    /// Menu buffer capacity (headers + items).
    pub menu_max_rows: usize,
    /// Rows always left for the log below a menu.
    pub min_log_rows: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self { max_cols: 96, max_rows: 32, menu_max_cols: 64, menu_max_rows: 250, min_log_rows: 3 }
    }
}

/// Animation parameters for the background icon and progress bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    pub indeterminate_frames: usize,
    pub update_fps: u32,
    /// Zero means the installing icon is static.
    pub installing_frames: usize,
    /// Overlay position relative to the installing icon's top-left corner.
    pub install_overlay_offset: (i32, i32),
}

impl Default for Animation {
    fn default() -> Self {
        Self {
            indeterminate_frames: 6,
            update_fps: 20,
            installing_frames: 7,
            install_overlay_offset: (13, 190),
        }
    }
}

impl Animation {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.update_fps.max(1)))
    }
}

/// Event queue sizing and wait timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTiming {
    pub capacity: usize,
    /// Overall ceiling for a key wait with no USB keep-alive.
    pub wait_timeout: Duration,
    /// How often a blocked wait re-checks for volume changes.
    pub refresh_interval: Duration,
}

impl Default for QueueTiming {
    fn default() -> Self {
        Self {
            capacity: 256,
            wait_timeout: Duration::from_secs(3600),
            refresh_interval: Duration::from_secs(5),
        }
    }
}

/// Software key-repeat policy, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub enabled: bool,
    pub keys: Vec<KeyCode>,
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            keys: DEFAULT_REPEATABLE_KEYS.to_vec(),
            initial_delay: Duration::from_millis(400),
            interval: Duration::from_millis(80),
        }
    }
}

impl RepeatPolicy {
    pub fn can_repeat(&self, code: KeyCode) -> bool {
        self.keys.contains(&code)
    }
}

/// Automatic boot countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownConfig {
    pub enabled: bool,
    /// First value shown; the hand-off runs when the count reaches zero.
    pub start: u32,
    pub step: Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self { enabled: false, start: 11, step: Duration::from_millis(1500) }
    }
}

/// Intervals for periodic work outside the render ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollIntervals {
    pub battery: Duration,
    /// Minimum gap between forced redraws in lazy print mode.
    pub nice: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self { battery: Duration::from_secs(2), nice: Duration::from_millis(100) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiConfig {
    pub layout: Layout,
    pub animation: Animation,
    pub queue: QueueTiming,
    pub repeat: RepeatPolicy,
    pub countdown: CountdownConfig,
    pub polls: PollIntervals,
    /// Directory holding the PNG surfaces.
    pub res_dir: PathBuf,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            animation: Animation::default(),
            queue: QueueTiming::default(),
            repeat: RepeatPolicy::default(),
            countdown: CountdownConfig::default(),
            polls: PollIntervals::default(),
            res_dir: PathBuf::from("/res/images"),
        }
    }
}

impl UiConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("RECOVERY_ENABLE_KEY_REPEAT") {
            config.repeat.enabled = is_truthy(&value);
        }
        if config.repeat.enabled {
            if let Some(list) = lookup("RECOVERY_REPEATABLE_KEYS") {
                let keys = parse_key_list(&list)
                    .with_context(|| format!("Invalid RECOVERY_REPEATABLE_KEYS '{list}'"))?;
                if !keys.is_empty() {
                    config.repeat.keys = keys;
                }
            }
        }

        if let Some(fps) = lookup("RECOVERY_FPS") {
            config.animation.update_fps = fps
                .trim()
                .parse()
                .with_context(|| format!("Invalid RECOVERY_FPS '{fps}'"))?;
        }

        if let Some(dir) = lookup("RECOVERY_RES_DIR") {
            config.res_dir = PathBuf::from(dir);
        }

        if let Some(value) = lookup("RECOVERY_AUTOBOOT") {
            config.countdown.enabled = is_truthy(&value);
        }

        Ok(config)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}

/// Parse a comma-separated list of key codes. Empty input yields an empty list.
pub fn parse_key_list(list: &str) -> Result<Vec<KeyCode>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<KeyCode>().with_context(|| format!("'{s}' is not a key code")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keys::{KEY_DOWN, KEY_UP};
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_board_constants() {
        let config = UiConfig::default();
        assert_eq!(config.layout.max_rows, 32);
        assert_eq!(config.animation.update_fps, 20);
        assert_eq!(config.queue.capacity, 256);
        assert_eq!(config.queue.refresh_interval, Duration::from_secs(5));
        assert!(!config.repeat.enabled);
    }

    #[test]
    fn repeat_defaults_to_navigation_keys() {
        let config =
            UiConfig::from_lookup(lookup_from(&[("RECOVERY_ENABLE_KEY_REPEAT", "true")])).unwrap();
        assert!(config.repeat.enabled);
        assert!(config.repeat.can_repeat(KEY_UP));
        assert!(config.repeat.can_repeat(KEY_DOWN));
        assert!(!config.repeat.can_repeat(28));
    }

    #[test]
    fn explicit_repeat_list_replaces_default() {
        let config = UiConfig::from_lookup(lookup_from(&[
            ("RECOVERY_ENABLE_KEY_REPEAT", "1"),
            ("RECOVERY_REPEATABLE_KEYS", "28, 116"),
        ]))
        .unwrap();
        assert_eq!(config.repeat.keys, vec![28, 116]);
    }

    #[test]
    fn repeat_list_ignored_when_repeat_disabled() {
        let config =
            UiConfig::from_lookup(lookup_from(&[("RECOVERY_REPEATABLE_KEYS", "28")])).unwrap();
        assert!(!config.repeat.enabled);
        assert_eq!(config.repeat.keys, DEFAULT_REPEATABLE_KEYS.to_vec());
    }

    #[test]
    fn bad_key_list_is_error() {
        let err = UiConfig::from_lookup(lookup_from(&[
            ("RECOVERY_ENABLE_KEY_REPEAT", "true"),
            ("RECOVERY_REPEATABLE_KEYS", "up,down"),
        ]))
        .unwrap_err();
        assert!(format!("{err:#}").contains("RECOVERY_REPEATABLE_KEYS"));
    }

    #[test]
    fn frame_interval_follows_fps() {
        let anim = Animation { update_fps: 50, ..Animation::default() };
        assert_eq!(anim.frame_interval(), Duration::from_millis(20));
    }
}
