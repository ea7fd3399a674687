//! Recovery UI
//!
//! Console core for a recovery-mode environment: a framebuffer screen with a
//! background icon, progress bar, menu and scrolling text log, a key event
//! queue with software auto-repeat, and the battery and boot-countdown
//! pollers that run beside it.

pub mod config;
pub mod console;
pub mod error;
pub mod input;
mod lock;
pub mod platform;
pub mod status;
pub mod ui;

#[cfg(test)]
mod testing;

pub use config::UiConfig;
pub use console::state::Icon;
pub use console::Console;
pub use error::UiError;
pub use input::queue::KeyWait;
pub use platform::Board;
pub use ui::SurfaceProvider;
