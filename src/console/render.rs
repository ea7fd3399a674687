//! Display renderer
//!
//! Decides what goes on screen for a given [`UiState`]. Every method here must
//! run with the update lock held; the renderer lives inside the locked screen
//! so that is enforced by construction.

use std::collections::HashMap;
use tracing::warn;

use super::log_buffer::LogBuffer;
use super::menu::MenuBuffer;
use super::state::{Icon, ProgressKind, UiState};
use crate::config::UiConfig;
use crate::status::countdown_icon_name;
use crate::ui::{Color, Rect, Surface, SurfaceProvider};

const BACKGROUND_TILE: &str = "stitch";

const RAINBOW: [Color; 6] = [
    Color::rgb(255, 0, 0),
    Color::rgb(255, 127, 0),
    Color::rgb(255, 255, 0),
    Color::rgb(0, 255, 0),
    Color::rgb(60, 80, 255),
    Color::rgb(143, 0, 255),
];

/// Surfaces loaded once at startup. Missing entries are skipped when drawing.
#[derive(Debug, Default)]
struct Assets {
    background: Option<Surface>,
    icons: HashMap<Icon, Surface>,
    progress_empty: Option<Surface>,
    progress_fill: Option<Surface>,
    indeterminate: Vec<Surface>,
    install_overlay: Vec<Surface>,
    countdown: HashMap<u32, Surface>,
}

pub struct Renderer {
    provider: Box<dyn SurfaceProvider>,
    assets: Assets,
    /// Absolute position of the install overlay frames.
    overlay_offset: (i32, i32),
    char_height: u32,
    total_rows: usize,
    rainbow: bool,
    rainbow_index: usize,
}

fn load(provider: &mut dyn SurfaceProvider, name: &str) -> Option<Surface> {
    match provider.surface_by_name(name) {
        Ok(surface) => Some(surface),
        Err(e) => {
            warn!("{e}; element will not be drawn");
            None
        }
    }
}

impl Renderer {
    pub fn new(mut provider: Box<dyn SurfaceProvider>, config: &UiConfig) -> Self {
        let mut assets = Assets {
            background: load(provider.as_mut(), BACKGROUND_TILE),
            progress_empty: load(provider.as_mut(), "progress_empty"),
            progress_fill: load(provider.as_mut(), "progress_fill"),
            ..Assets::default()
        };

        for icon in Icon::ALL {
            if let Some(name) = icon.surface_name() {
                if let Some(surface) = load(provider.as_mut(), name) {
                    assets.icons.insert(icon, surface);
                }
            }
        }

        // "indeterminate01", "indeterminate02", ...
        for i in 0..config.animation.indeterminate_frames {
            if let Some(s) = load(provider.as_mut(), &format!("indeterminate{:02}", i + 1)) {
                assets.indeterminate.push(s);
            }
        }
        for i in 0..config.animation.installing_frames {
            if let Some(s) = load(provider.as_mut(), &format!("icon_installing_overlay{:02}", i + 1))
            {
                assets.install_overlay.push(s);
            }
        }

        if config.countdown.enabled {
            for value in 1..=config.countdown.start {
                if let Some(name) = countdown_icon_name(value, config.countdown.start) {
                    if let Some(s) = load(provider.as_mut(), &name) {
                        assets.countdown.insert(value, s);
                    }
                }
            }
        }

        let (mut ox, mut oy) = config.animation.install_overlay_offset;
        if let Some(bg) = assets.icons.get(&Icon::Installing) {
            ox += (provider.width() as i32 - bg.width as i32) / 2;
            oy += (provider.height() as i32 - bg.height as i32) / 2;
        }

        let (_, char_height) = provider.char_size();
        let char_height = char_height.max(1);
        let total_rows = (provider.height() / char_height) as usize;

        Self {
            provider,
            assets,
            overlay_offset: (ox, oy),
            char_height,
            total_rows,
            rainbow: false,
            rainbow_index: 0,
        }
    }

    /// Text rows that fit on the screen.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Text columns that fit on the screen.
    pub fn total_cols(&self) -> usize {
        let (char_width, _) = self.provider.char_size();
        (self.provider.width() / char_width.max(1)) as usize
    }

    /// Width of the progress bar, or 0 when its artwork is missing.
    pub fn progress_width(&self) -> u32 {
        self.assets.progress_empty.map_or(0, |s| s.width)
    }

    /// Redraw everything and flip.
    pub fn render_full(&mut self, state: &mut UiState, log: &LogBuffer, menu: &MenuBuffer) {
        self.draw_screen(state, log, menu);
        self.flip();
    }

    /// Redraw only the progress bar when both pages are otherwise identical and
    /// the log is hidden; fall back to a full redraw otherwise.
    pub fn render_progress(&mut self, state: &mut UiState, log: &LogBuffer, menu: &MenuBuffer) {
        if state.show_log || !state.pages_identical {
            self.draw_screen(state, log, menu);
            state.pages_identical = true;
        } else {
            self.draw_progress(state);
        }
        self.flip();
    }

    fn flip(&mut self) {
        if let Err(e) = self.provider.flip() {
            warn!("Framebuffer flip failed: {:#}", e);
        }
    }

    fn draw_screen(&mut self, state: &mut UiState, log: &LogBuffer, menu: &MenuBuffer) {
        self.rainbow = state.rainbow;
        self.draw_background(state);
        self.draw_countdown(state);
        self.draw_progress(state);

        if state.show_log {
            let mut row = 0;
            if menu.is_visible() {
                row = self.draw_menu(state, menu);
            }
            self.draw_log(log, row);
        }
    }

    fn draw_background(&mut self, state: &mut UiState) {
        state.pages_identical = false;
        let (fw, fh) = (self.provider.width() as i32, self.provider.height() as i32);

        if let Some(tile) = self.assets.background {
            if tile.width > 0 && tile.height > 0 {
                for by in (0..fh).step_by(tile.height as usize) {
                    for bx in (0..fw).step_by(tile.width as usize) {
                        self.provider.blit(tile, tile.full(), bx, by);
                    }
                }
            }
        } else {
            self.provider.fill(Rect::new(0, 0, fw as u32, fh as u32), Color::BLACK);
        }

        if let Some(&icon) = self.assets.icons.get(&state.current_icon) {
            let x = (fw - icon.width as i32) / 2;
            let y = (fh - icon.height as i32) / 2;
            self.provider.blit(icon, icon.full(), x, y);
            if state.current_icon == Icon::Installing {
                self.draw_install_overlay(state.installing_frame);
            }
        }
    }

    fn draw_install_overlay(&mut self, frame: usize) {
        if self.assets.install_overlay.is_empty() {
            return;
        }
        let surface = self.assets.install_overlay[frame % self.assets.install_overlay.len()];
        let (x, y) = self.overlay_offset;
        self.provider.blit(surface, surface.full(), x, y);
    }

    fn draw_countdown(&mut self, state: &UiState) {
        let Some(value) = state.countdown else {
            return;
        };
        let Some(&icon) = self.assets.countdown.get(&value) else {
            return;
        };
        let x = (self.provider.width() as i32 - icon.width as i32) / 2;
        let y = self.provider.height() as i32 / 2;
        self.provider.fill(Rect::new(x, y, icon.width, icon.height), Color::BLACK);
        self.provider.blit(icon, icon.full(), x, y);
    }

    fn draw_progress(&mut self, state: &UiState) {
        if state.current_icon == Icon::Installing {
            self.draw_install_overlay(state.installing_frame);
        }

        if state.progress_kind == ProgressKind::None {
            return;
        }
        let Some(empty) = self.assets.progress_empty else {
            return;
        };

        let icon_height = self.assets.icons.get(&Icon::Installing).map_or(0, |s| s.height as i32);
        let (width, height) = (empty.width as i32, empty.height as i32);
        let dx = (self.provider.width() as i32 - width) / 2;
        let dy = (3 * self.provider.height() as i32 + icon_height - 2 * height) / 4;

        // Erase behind the bar in case this is a progress-only update.
        self.provider.fill(Rect::new(dx, dy, empty.width, empty.height), Color::BLACK);

        match state.progress_kind {
            ProgressKind::Determinate => {
                let pos = ((state.total_progress() * width as f32) as i32).clamp(0, width);
                if pos > 0 {
                    if let Some(fill) = self.assets.progress_fill {
                        self.provider.blit(fill, Rect::new(0, 0, pos as u32, empty.height), dx, dy);
                    }
                }
                if pos < width - 1 {
                    let rest = Rect::new(pos, 0, (width - pos) as u32, empty.height);
                    self.provider.blit(empty, rest, dx + pos, dy);
                }
            }
            ProgressKind::Indeterminate => {
                if !self.assets.indeterminate.is_empty() {
                    let frames = self.assets.indeterminate.len();
                    let surface = self.assets.indeterminate[state.indeterminate_frame % frames];
                    self.provider.blit(surface, surface.full(), dx, dy);
                }
            }
            ProgressKind::None => {}
        }
    }

    /// Draw headers and the item window; returns the next free text row.
    fn draw_menu(&mut self, state: &UiState, menu: &MenuBuffer) -> usize {
        let width = self.provider.width();
        let ch = self.char_height as i32;
        let headers = menu.headers().len();

        let sel_row = (headers + menu.selected() - menu.scroll_offset()) as i32;
        self.provider.fill(Rect::new(0, sel_row * ch, width, self.char_height + 1), Color::BLACK);

        let mut row = 0;
        for header in menu.headers() {
            self.draw_text_line(row, header, Color::HEADER_TEXT);
            row += 1;
        }

        for (index, item) in menu.window_items() {
            let color = if index == menu.selected() {
                Color::RED
            } else if state.root_menu && index < 2 {
                Color::GREEN
            } else if state.root_menu && index == 2 {
                Color::ORANGE
            } else {
                Color::MENU_TEXT
            };
            self.draw_text_line(row, item, color);
            row += 1;
        }

        let y = row as i32 * ch + ch / 2 - 1;
        self.provider.fill(Rect::new(0, y, width, 2), Color::BLACK);
        row
    }

    /// Fill the rows under `row` with the newest log lines, oldest first.
    ///
    /// When the whole ring fits, its region is anchored to the bottom of the
    /// screen.
    fn draw_log(&mut self, log: &LogBuffer, row: usize) {
        let mut start_row = row + 1;
        let available = self.total_rows.saturating_sub(start_row);
        if available >= log.capacity() {
            start_row = self.total_rows - log.capacity();
        }
        for (r, line) in log.tail(available).enumerate() {
            self.draw_text_line(start_row + r, line, Color::NORMAL_TEXT);
        }
    }

    fn draw_text_line(&mut self, row: usize, text: &str, color: Color) {
        if text.is_empty() {
            return;
        }
        let color = if self.rainbow { self.next_rainbow() } else { color };
        self.provider.text(0, (row as u32 * self.char_height) as i32, text, color);
    }

    fn next_rainbow(&mut self) -> Color {
        let color = RAINBOW[self.rainbow_index];
        self.rainbow_index = (self.rainbow_index + 1) % RAINBOW.len();
        color
    }
}
