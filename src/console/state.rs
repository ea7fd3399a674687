//! Mutable UI state guarded by the update lock

use std::time::{Duration, Instant};

/// Background icons the console can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    None,
    Installing,
    Error,
    Clockwork,
    Cid,
    FirmwareInstalling,
    FirmwareError,
}

impl Icon {
    pub const ALL: [Icon; 6] = [
        Icon::Installing,
        Icon::Error,
        Icon::Clockwork,
        Icon::Cid,
        Icon::FirmwareInstalling,
        Icon::FirmwareError,
    ];

    pub fn surface_name(self) -> Option<&'static str> {
        match self {
            Icon::None => None,
            Icon::Installing => Some("icon_installing"),
            Icon::Error => Some("icon_error"),
            Icon::Clockwork => Some("icon_clockwork"),
            Icon::Cid => Some("icon_cid"),
            Icon::FirmwareInstalling => Some("icon_firmware_install"),
            Icon::FirmwareError => Some("icon_firmware_error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    None,
    Indeterminate,
    Determinate,
}

#[derive(Debug, Clone)]
pub struct UiState {
    pub current_icon: Icon,
    pub progress_kind: ProgressKind,
    /// Bar fraction already consumed by earlier scopes.
    pub scope_start: f32,
    pub scope_size: f32,
    /// Completion of the current scope, 0..=1.
    pub progress: f32,
    pub scope_started: Option<Instant>,
    pub scope_duration: Duration,
    pub show_log: bool,
    pub show_log_ever: bool,
    /// Both framebuffer pages match except for the progress bar.
    pub pages_identical: bool,
    pub installing_frame: usize,
    pub indeterminate_frame: usize,
    /// Countdown value whose icon is drawn, if the countdown is running.
    pub countdown: Option<u32>,
    pub rainbow: bool,
    pub root_menu: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            current_icon: Icon::None,
            progress_kind: ProgressKind::None,
            scope_start: 0.0,
            scope_size: 0.0,
            progress: 0.0,
            scope_started: None,
            scope_duration: Duration::ZERO,
            show_log: false,
            show_log_ever: false,
            pages_identical: false,
            installing_frame: 0,
            indeterminate_frame: 0,
            countdown: None,
            rainbow: false,
            root_menu: false,
        }
    }
}

impl UiState {
    pub fn set_log_visible(&mut self, visible: bool) {
        self.show_log = visible;
        if visible {
            self.show_log_ever = true;
        }
    }

    /// Switch to the animated busy bar. Returns false if it was already shown.
    pub fn show_indeterminate(&mut self) -> bool {
        if self.progress_kind == ProgressKind::Indeterminate {
            return false;
        }
        self.progress_kind = ProgressKind::Indeterminate;
        true
    }

    /// Start a new determinate scope covering `portion` of the bar, filled
    /// automatically over `duration` (zero disables the timed fill).
    pub fn begin_scope(&mut self, portion: f32, duration: Duration, now: Instant) {
        self.progress_kind = ProgressKind::Determinate;
        self.scope_start += self.scope_size;
        self.scope_size = portion;
        self.scope_started = Some(now);
        self.scope_duration = duration;
        self.progress = 0.0;
    }

    /// Raise the scope's completion to `fraction`, clamped to 0..=1.
    ///
    /// The value only moves forward, and only when it changes the bar by at
    /// least one pixel at `bar_width`. Returns true when a redraw is due. With
    /// no known bar width the value is stored without a redraw.
    pub fn set_progress(&mut self, fraction: f32, bar_width: u32) -> bool {
        let fraction = fraction.clamp(0.0, 1.0);
        if self.progress_kind != ProgressKind::Determinate || fraction <= self.progress {
            return false;
        }
        if bar_width == 0 {
            self.progress = fraction;
            return false;
        }
        let scale = bar_width as f32 * self.scope_size;
        if (self.progress * scale) as i32 != (fraction * scale) as i32 {
            self.progress = fraction;
            return true;
        }
        false
    }

    /// Advance a timed scope by elapsed time. Returns true if it moved.
    pub fn advance_timed(&mut self, now: Instant) -> bool {
        if self.progress_kind != ProgressKind::Determinate || self.scope_duration.is_zero() {
            return false;
        }
        let Some(started) = self.scope_started else {
            return false;
        };
        let elapsed = now.saturating_duration_since(started);
        let progress = (elapsed.as_secs_f32() / self.scope_duration.as_secs_f32()).min(1.0);
        if progress > self.progress {
            self.progress = progress;
            return true;
        }
        false
    }

    pub fn reset_progress(&mut self) {
        self.progress_kind = ProgressKind::None;
        self.scope_start = 0.0;
        self.scope_size = 0.0;
        self.scope_started = None;
        self.scope_duration = Duration::ZERO;
        self.progress = 0.0;
    }

    /// Overall bar fill, 0..=1 in practice.
    pub fn total_progress(&self) -> f32 {
        self.scope_start + self.progress * self.scope_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_start_accumulates_previous_sizes() {
        let mut state = UiState::default();
        let now = Instant::now();
        let portions = [0.25, 0.5, 0.1, 0.15];
        let mut expected = 0.0;
        let mut last_start = 0.0;
        for (i, portion) in portions.iter().enumerate() {
            state.begin_scope(*portion, Duration::ZERO, now);
            if i > 0 {
                expected += portions[i - 1];
            }
            assert!((state.scope_start - expected).abs() < 1e-6);
            assert!(state.scope_start >= last_start);
            assert_eq!(state.progress, 0.0);
            last_start = state.scope_start;
        }
    }

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let mut state = UiState::default();
        state.begin_scope(1.0, Duration::ZERO, Instant::now());
        let mut last = 0.0;
        for f in [0.3, -2.0, 0.1, 0.7, 5.0, 0.2, 1.0] {
            state.set_progress(f, 200);
            assert!(state.progress >= last);
            assert!((0.0..=1.0).contains(&state.progress));
            last = state.progress;
        }
        assert_eq!(state.progress, 1.0);
    }

    #[test]
    fn sub_pixel_progress_is_skipped() {
        let mut state = UiState::default();
        state.begin_scope(0.5, Duration::ZERO, Instant::now());
        // 100px bar, half of it in scope: one pixel is 0.02 of the scope.
        assert!(!state.set_progress(0.01, 100));
        assert_eq!(state.progress, 0.0);
        assert!(state.set_progress(0.03, 100));
        assert_eq!(state.progress, 0.03);
    }

    #[test]
    fn set_progress_ignored_unless_determinate() {
        let mut state = UiState::default();
        assert!(!state.set_progress(0.5, 100));
        state.show_indeterminate();
        assert!(!state.set_progress(0.5, 100));
        assert_eq!(state.progress, 0.0);
    }

    #[test]
    fn timed_scope_fills_over_duration() {
        let mut state = UiState::default();
        let start = Instant::now();
        state.begin_scope(1.0, Duration::from_secs(10), start);
        assert!(state.advance_timed(start + Duration::from_secs(5)));
        assert!((state.progress - 0.5).abs() < 1e-3);
        assert!(!state.advance_timed(start + Duration::from_secs(4)));
        assert!(state.advance_timed(start + Duration::from_secs(30)));
        assert_eq!(state.progress, 1.0);
        assert!(!state.advance_timed(start + Duration::from_secs(40)));
    }

    #[test]
    fn reset_clears_scopes() {
        let mut state = UiState::default();
        state.begin_scope(0.4, Duration::from_secs(3), Instant::now());
        state.begin_scope(0.6, Duration::ZERO, Instant::now());
        state.reset_progress();
        assert_eq!(state.progress_kind, ProgressKind::None);
        assert_eq!(state.total_progress(), 0.0);
    }

    #[test]
    fn indeterminate_reports_change_once() {
        let mut state = UiState::default();
        assert!(state.show_indeterminate());
        assert!(!state.show_indeterminate());
    }
}
