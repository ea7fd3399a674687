//! Render ticker
//!
//! Advances animation frames and timed progress at the configured frame rate
//! and redraws whenever something moved.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::state::{Icon, ProgressKind, UiState};
use super::Screen;
use crate::config::Animation;
use crate::lock::lock_or_recover;

/// Shortest sleep between two ticks, however long the redraw took.
const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);

/// Advance every active animation by one frame. Returns true if a redraw is due.
pub(crate) fn advance(state: &mut UiState, animation: &Animation, now: Instant) -> bool {
    let mut redraw = false;

    if state.current_icon == Icon::Installing && animation.installing_frames > 0 {
        state.installing_frame = (state.installing_frame + 1) % animation.installing_frames;
        redraw = true;
    }

    if state.progress_kind == ProgressKind::Indeterminate {
        state.indeterminate_frame =
            (state.indeterminate_frame + 1) % animation.indeterminate_frames.max(1);
        redraw = true;
    }

    if state.advance_timed(now) {
        redraw = true;
    }

    redraw
}

/// Time to sleep after a tick that took `elapsed`.
pub(crate) fn frame_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(MIN_FRAME_DELAY)
}

/// Tick forever. Runs for the life of the process.
pub(crate) fn run(screen: &Mutex<Screen>, animation: &Animation) {
    let interval = animation.frame_interval();
    loop {
        let start = Instant::now();
        {
            let mut guard = lock_or_recover(screen, "render ticker");
            let Screen { state, log, menu, renderer, .. } = &mut *guard;
            if advance(state, animation, start) {
                renderer.render_progress(state, log, menu);
            }
        }
        thread::sleep(frame_delay(interval, start.elapsed()));
    }
}
