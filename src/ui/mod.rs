//! Surface provider interface
//!
//! The console decides *what* to draw; a [`SurfaceProvider`] knows *how* to put
//! pixels on the device. The Linux framebuffer implementation lives in [`fb`].

pub mod fb;

use anyhow::Result;

use crate::error::UiError;

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 153, 0);
    pub const ORANGE: Color = Color::rgb(255, 153, 0);
    pub const MENU_TEXT: Color = Color::rgb(0, 50, 255);
    pub const NORMAL_TEXT: Color = Color::rgb(150, 150, 150);
    pub const HEADER_TEXT: Color = Color::WHITE;
}

/// Axis-aligned rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Opaque handle to a loaded surface, carrying its dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub id: usize,
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn full(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

/// Drawing primitives the console renders through.
///
/// Implementations need not be thread-safe beyond `Send`: the console only
/// touches its provider while holding the update lock.
pub trait SurfaceProvider: Send {
    /// Load (or look up) a named surface.
    fn surface_by_name(&mut self, name: &str) -> Result<Surface, UiError>;

    /// Framebuffer width in pixels.
    fn width(&self) -> u32;

    /// Framebuffer height in pixels.
    fn height(&self) -> u32;

    /// Glyph cell size (width, height) of the text font.
    fn char_size(&self) -> (u32, u32);

    /// Copy `src` from `surface` so its top-left lands at (`dx`, `dy`).
    fn blit(&mut self, surface: Surface, src: Rect, dx: i32, dy: i32);

    /// Fill a rectangle with a solid color.
    fn fill(&mut self, rect: Rect, color: Color);

    /// Draw a line of text with its top-left cell at (`x`, `y`).
    fn text(&mut self, x: i32, y: i32, text: &str, color: Color);

    /// Make the back buffer visible.
    fn flip(&mut self) -> Result<()>;
}

/// Create the framebuffer provider, falling back to an off-screen canvas when
/// no framebuffer device is present.
pub fn create_provider(res_dir: impl Into<std::path::PathBuf>) -> Result<Box<dyn SurfaceProvider>> {
    let mut backend = fb::FramebufferBackend::new(res_dir);
    backend.init()?;
    Ok(Box::new(backend))
}
