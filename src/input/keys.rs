//! Linux input key codes used by the console (see `linux/input-event-codes.h`).

/// Raw key code as reported by the kernel.
pub type KeyCode = i32;

pub const KEY_BACKSPACE: KeyCode = 14;
pub const KEY_ENTER: KeyCode = 28;
pub const KEY_HOME: KeyCode = 102;
pub const KEY_UP: KeyCode = 103;
pub const KEY_END: KeyCode = 107;
pub const KEY_DOWN: KeyCode = 108;
pub const KEY_VOLUMEDOWN: KeyCode = 114;
pub const KEY_VOLUMEUP: KeyCode = 115;
pub const KEY_POWER: KeyCode = 116;
pub const KEY_MENU: KeyCode = 139;

/// Highest key code tracked in the key-press table.
pub const KEY_MAX: KeyCode = 0x2ff;

/// Relative axis code for vertical trackball motion.
pub const REL_Y: u16 = 0x01;

/// Keys that repeat when no explicit repeat list is configured.
pub const DEFAULT_REPEATABLE_KEYS: [KeyCode; 4] = [KEY_UP, KEY_DOWN, KEY_VOLUMEUP, KEY_VOLUMEDOWN];

pub fn is_valid(code: KeyCode) -> bool {
    (0..=KEY_MAX).contains(&code)
}
