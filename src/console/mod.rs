//! Console facade
//!
//! [`Console`] is the handle the rest of the recovery environment uses to put
//! text, icons, menus and progress on screen and to wait for keys. It is cheap
//! to clone; every clone talks to the same state.
//!
//! Locking: the screen mutex (the "update lock") guards the UI state, both
//! text buffers and the renderer, so nothing can draw without it. The event
//! queue has its own lock. No code path takes the queue lock while holding
//! the update lock.

pub mod log_buffer;
pub mod menu;
pub mod render;
pub mod state;
mod ticker;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::UiConfig;
use crate::input::keys::KeyCode;
use crate::input::queue::{EventQueue, KeyWait};
use crate::input::{self, InputSource};
use crate::lock::lock_or_recover;
use crate::platform::Board;
use crate::status::{BatteryPoller, Countdown, CountdownDisplay};
use crate::ui::SurfaceProvider;
use log_buffer::LogBuffer;
use menu::MenuBuffer;
use render::Renderer;
use state::{Icon, UiState};

/// Everything behind the update lock.
pub(crate) struct Screen {
    pub(crate) state: UiState,
    pub(crate) log: LogBuffer,
    pub(crate) menu: MenuBuffer,
    pub(crate) renderer: Renderer,
    /// Last redraw forced by `print`, for lazy printing.
    last_print_redraw: Option<Instant>,
}

impl Screen {
    fn render_full(&mut self) {
        let Screen { state, log, menu, renderer, .. } = self;
        renderer.render_full(state, log, menu);
    }

    fn render_progress(&mut self) {
        let Screen { state, log, menu, renderer, .. } = self;
        renderer.render_progress(state, log, menu);
    }
}

struct Shared {
    screen: Mutex<Screen>,
    queue: EventQueue,
    board: Arc<dyn Board>,
    config: UiConfig,
    text_cols: usize,
    started: AtomicBool,
    nice: AtomicBool,
    niced: AtomicBool,
    log_stdout: AtomicBool,
    countdown_cancelled: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct Console {
    shared: Arc<Shared>,
}

impl Console {
    /// Load the artwork and size the text grid. Nothing is drawn and no
    /// thread runs until [`Console::start`].
    pub fn new(provider: Box<dyn SurfaceProvider>, board: Arc<dyn Board>, config: UiConfig) -> Self {
        let renderer = Renderer::new(provider, &config);
        let layout = &config.layout;

        let total_rows = renderer.total_rows();
        let text_rows = total_rows.min(layout.max_rows);
        let text_cols = renderer.total_cols().min(layout.max_cols.saturating_sub(1));
        let max_menu_rows = total_rows.saturating_sub(layout.min_log_rows).min(layout.menu_max_rows);
        info!("Text grid {}x{}, up to {} menu rows", text_cols, text_rows, max_menu_rows);

        let screen = Screen {
            state: UiState::default(),
            log: LogBuffer::new(text_rows, text_cols),
            menu: MenuBuffer::new(
                max_menu_rows,
                layout.menu_max_rows,
                text_cols.saturating_sub(1),
                layout.menu_max_cols.saturating_sub(1),
            ),
            renderer,
            last_print_redraw: None,
        };

        Self {
            shared: Arc::new(Shared {
                screen: Mutex::new(screen),
                queue: EventQueue::new(config.queue.clone(), config.repeat.clone()),
                board,
                text_cols,
                started: AtomicBool::new(false),
                nice: AtomicBool::new(false),
                niced: AtomicBool::new(false),
                log_stdout: AtomicBool::new(true),
                countdown_cancelled: Arc::new(AtomicBool::new(false)),
                config,
            }),
        }
    }

    /// Draw the first frame and spawn the ticker, input reader and pollers.
    pub fn start(&self, mut source: Box<dyn InputSource>) -> Result<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            bail!("console already started");
        }
        self.screen().render_full();

        let shared = Arc::clone(&self.shared);
        spawn("render-ticker", move || ticker::run(&shared.screen, &shared.config.animation))?;

        let console = self.clone();
        spawn("input-reader", move || {
            input::read_loop(source.as_mut(), &console.shared.queue, |code| console.on_key_down(code));
        })?;

        let poller = BatteryPoller::new(Arc::clone(&self.shared.board));
        let interval = self.shared.config.polls.battery;
        spawn("battery-poller", move || poller.run(interval))?;

        let countdown = &self.shared.config.countdown;
        if countdown.enabled {
            let mut task = Countdown::new(
                Arc::clone(&self.shared.board),
                countdown,
                Arc::clone(&self.shared.countdown_cancelled),
            );
            let console = self.clone();
            let step = countdown.step;
            spawn("boot-countdown", move || task.run(&console, step))?;
        }
        Ok(())
    }

    fn screen(&self) -> MutexGuard<'_, Screen> {
        lock_or_recover(&self.shared.screen, "update lock")
    }

    /// Append text to the on-screen log and redraw.
    ///
    /// In lazy mode a print that lands within the nice interval of the previous
    /// redraw is appended without redrawing; [`Console::was_niced`] reports it.
    pub fn print(&self, text: &str) {
        if self.shared.log_stdout.load(Ordering::Relaxed) {
            let line = text.trim_end_matches('\n');
            if !line.is_empty() {
                info!("{}", line);
            }
        }

        let mut screen = self.screen();
        screen.log.push_str(text);

        let now = Instant::now();
        let niced = self.shared.nice.load(Ordering::Relaxed)
            && screen
                .last_print_redraw
                .is_some_and(|last| now.duration_since(last) < self.shared.config.polls.nice);
        self.shared.niced.store(niced, Ordering::Relaxed);
        if niced {
            return;
        }
        screen.last_print_redraw = Some(now);
        screen.render_full();
    }

    pub fn set_background(&self, icon: Icon) {
        let mut screen = self.screen();
        screen.state.current_icon = icon;
        screen.render_full();
    }

    pub fn show_indeterminate_progress(&self) {
        let mut screen = self.screen();
        if screen.state.show_indeterminate() {
            screen.render_progress();
        }
    }

    /// Start a progress scope covering `portion` of the bar that fills on its
    /// own over `seconds` (0 for manual updates only).
    pub fn show_progress(&self, portion: f32, seconds: u32) {
        let mut screen = self.screen();
        let duration = Duration::from_secs(u64::from(seconds));
        screen.state.begin_scope(portion, duration, Instant::now());
        screen.render_progress();
    }

    pub fn set_progress(&self, fraction: f32) {
        let mut screen = self.screen();
        let width = screen.renderer.progress_width();
        if screen.state.set_progress(fraction, width) {
            screen.render_progress();
        }
    }

    pub fn reset_progress(&self) {
        let mut screen = self.screen();
        screen.state.reset_progress();
        screen.render_full();
    }

    /// Show a menu and return how many items it kept.
    pub fn start_menu<H, I>(&self, headers: &[H], items: &[I], initial_selection: usize) -> usize
    where
        H: AsRef<str>,
        I: AsRef<str>,
    {
        let mut screen = self.screen();
        let count = screen.menu.start(headers, items, initial_selection);
        screen.render_full();
        count
    }

    /// Select `index`, wrapping at both ends. Without a menu the index is
    /// returned as given.
    pub fn select_menu(&self, index: i32) -> i32 {
        let mut screen = self.screen();
        if !screen.menu.is_visible() {
            return index;
        }
        let before = screen.menu.selected();
        let selected = screen.menu.select(index);
        if screen.menu.selected() != before {
            screen.render_full();
        }
        selected
    }

    pub fn move_selection(&self, delta: i32) -> i32 {
        let mut screen = self.screen();
        if !screen.menu.is_visible() {
            return screen.menu.selected() as i32;
        }
        let before = screen.menu.selected();
        let selected = screen.menu.move_selection(delta);
        if screen.menu.selected() != before {
            screen.render_full();
        }
        selected
    }

    pub fn end_menu(&self) {
        let mut screen = self.screen();
        if screen.menu.end() {
            screen.render_full();
        }
    }

    pub fn selected_item(&self) -> usize {
        self.screen().menu.selected()
    }

    /// Block for the next key, a volume change, cancellation or timeout.
    pub fn wait_for_key(&self) -> KeyWait {
        self.shared.queue.wait_for_key(self.shared.board.as_ref())
    }

    pub fn cancel_wait(&self) {
        self.shared.queue.cancel_wait();
    }

    pub fn clear_key_queue(&self) {
        self.shared.queue.clear();
    }

    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.shared.queue.is_key_down(code)
    }

    pub fn is_log_visible(&self) -> bool {
        self.screen().state.show_log
    }

    pub fn set_log_visible(&self, visible: bool) {
        let mut screen = self.screen();
        screen.state.set_log_visible(visible);
        screen.render_full();
    }

    /// Whether the log has been shown at any point this session.
    pub fn text_ever_visible(&self) -> bool {
        self.screen().state.show_log_ever
    }

    pub fn set_nice(&self, enabled: bool) {
        self.shared.nice.store(enabled, Ordering::Relaxed);
    }

    /// The most recent print skipped its redraw.
    pub fn was_niced(&self) -> bool {
        self.shared.niced.load(Ordering::Relaxed)
    }

    pub fn set_log_stdout(&self, enabled: bool) {
        self.shared.log_stdout.store(enabled, Ordering::Relaxed);
    }

    pub fn text_cols(&self) -> usize {
        self.shared.text_cols
    }

    /// Blank the line being written and step back, so the next print
    /// overwrites the previous line. Does not redraw.
    pub fn delete_line(&self) {
        self.screen().log.delete_line();
    }

    pub fn set_rainbow_mode(&self, enabled: bool) {
        let mut screen = self.screen();
        screen.state.rainbow = enabled;
        screen.render_full();
    }

    /// Color the first three menu items by role.
    pub fn set_root_menu(&self, enabled: bool) {
        self.screen().state.root_menu = enabled;
    }

    /// Print the last `lines` lines of `path` without mirroring them to the
    /// process log.
    pub fn print_log_tail(&self, path: &Path, lines: usize) -> Result<()> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let all: Vec<&str> = contents.lines().collect();
        let tail = &all[all.len().saturating_sub(lines)..];

        self.set_log_stdout(false);
        for line in tail {
            self.print(&format!("{line}\n"));
        }
        self.set_log_stdout(true);
        Ok(())
    }

    /// Stop the boot countdown for the rest of the session.
    pub fn cancel_countdown(&self) {
        if !self.shared.countdown_cancelled.swap(true, Ordering::Relaxed) {
            info!("Boot countdown cancelled");
        }
        let mut screen = self.screen();
        if screen.state.countdown.take().is_some() {
            screen.render_full();
        }
    }

    fn toggle_log(&self) {
        let mut screen = self.screen();
        let visible = !screen.state.show_log;
        screen.state.set_log_visible(visible);
        screen.render_full();
    }

    fn on_key_down(&self, code: KeyCode) {
        let board = &self.shared.board;
        let keys = self.shared.queue.keys();
        if board.toggle_display(keys, code) {
            self.toggle_log();
        }
        if board.reboot_now(keys, code) {
            info!("Reboot key pressed");
            if let Err(e) = board.restart() {
                error!("{}", e);
            }
        }
    }
}

impl CountdownDisplay for Console {
    fn show_countdown(&self, value: u32) {
        let mut screen = self.screen();
        // A cancel may land between the poller's check and this lock.
        if self.shared.countdown_cancelled.load(Ordering::Relaxed) {
            return;
        }
        screen.state.current_icon = Icon::None;
        screen.state.countdown = Some(value);
        screen.render_full();
    }

    fn report(&self, message: &str) {
        self.print(&format!("{message}\n"));
    }
}

fn spawn<F>(name: &str, body: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .with_context(|| format!("Failed to spawn {name} thread"))?;
    Ok(())
}
