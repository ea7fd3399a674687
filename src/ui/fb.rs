//! Linux framebuffer surface provider

use anyhow::{anyhow, Context, Result};
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Point, Size};
use embedded_graphics::text::{Baseline, Text};
use embedded_graphics::Drawable;
use image::RgbaImage;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{Color, Rect, Surface, SurfaceProvider};
use crate::error::UiError;

const FB_DEVICE: &str = "/dev/fb0";
const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

/// Canvas size used when no framebuffer can be opened.
const FALLBACK_WIDTH: u32 = 480;
const FALLBACK_HEIGHT: u32 = 800;

const FONT: MonoFont<'static> = FONT_10X20;

/// Linux framebuffer fixed screen info
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: u64,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: u64,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

/// Linux framebuffer variable screen info
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// Framebuffer-backed [`SurfaceProvider`].
///
/// Drawing happens in an in-memory back buffer; [`SurfaceProvider::flip`]
/// copies it to `/dev/fb0`. Surfaces are PNG files under `res_dir`.
pub struct FramebufferBackend {
    fb_file: Option<File>,
    width: u32,
    height: u32,
    bits_per_pixel: u32,
    line_length: u32,
    buffer: Vec<u8>,
    fallback_mode: bool,
    res_dir: PathBuf,
    surfaces: Vec<RgbaImage>,
    by_name: HashMap<String, usize>,
}

impl FramebufferBackend {
    pub fn new(res_dir: impl Into<PathBuf>) -> Self {
        Self {
            fb_file: None,
            width: 0,
            height: 0,
            bits_per_pixel: 0,
            line_length: 0,
            buffer: Vec::new(),
            fallback_mode: false,
            res_dir: res_dir.into(),
            surfaces: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Open the framebuffer, or switch to an off-screen canvas if that fails.
    pub fn init(&mut self) -> Result<()> {
        match self.try_init_fb() {
            Ok(()) => {
                info!("Framebuffer backend initialized successfully");
                self.fallback_mode = false;
            }
            Err(e) => {
                warn!("Failed to initialize framebuffer: {:#}. Using off-screen canvas.", e);
                self.fallback_mode = true;
                self.width = FALLBACK_WIDTH;
                self.height = FALLBACK_HEIGHT;
                self.bits_per_pixel = 32;
                self.line_length = FALLBACK_WIDTH * 4;
                self.buffer = vec![0u8; (self.line_length * self.height) as usize];
            }
        }
        Ok(())
    }

    fn try_init_fb(&mut self) -> Result<()> {
        let fb_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(FB_DEVICE)
            .context(format!("Failed to open {}", FB_DEVICE))?;

        let fd = fb_file.as_raw_fd();

        let mut vinfo: FbVarScreeninfo = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::ioctl(fd, FBIOGET_VSCREENINFO as _, &mut vinfo as *mut _) };
        if ret != 0 {
            return Err(anyhow!("FBIOGET_VSCREENINFO ioctl failed"));
        }

        let mut finfo: FbFixScreeninfo = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::ioctl(fd, FBIOGET_FSCREENINFO as _, &mut finfo as *mut _) };
        if ret != 0 {
            return Err(anyhow!("FBIOGET_FSCREENINFO ioctl failed"));
        }

        self.width = vinfo.xres;
        self.height = vinfo.yres;
        self.bits_per_pixel = vinfo.bits_per_pixel;
        self.line_length = finfo.line_length;

        info!(
            "Framebuffer initialized: {}x{} @ {} bpp, line_length={}",
            self.width, self.height, self.bits_per_pixel, self.line_length
        );

        self.buffer = vec![0u8; (self.line_length * self.height) as usize];
        self.fb_file = Some(fb_file);
        Ok(())
    }

    fn put_pixel(&mut self, x: i32, y: i32, r: u8, g: u8, b: u8) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let (x, y) = (x as u32, y as u32);

        let offset = (y * self.line_length + x * (self.bits_per_pixel / 8)) as usize;

        if offset + 3 < self.buffer.len() {
            match self.bits_per_pixel {
                32 => {
                    self.buffer[offset] = b;
                    self.buffer[offset + 1] = g;
                    self.buffer[offset + 2] = r;
                    self.buffer[offset + 3] = 255;
                }
                24 => {
                    self.buffer[offset] = b;
                    self.buffer[offset + 1] = g;
                    self.buffer[offset + 2] = r;
                }
                16 => {
                    // RGB565
                    let rgb565 = ((r as u16 & 0xF8) << 8)
                        | ((g as u16 & 0xFC) << 3)
                        | ((b as u16 & 0xF8) >> 3);
                    self.buffer[offset] = (rgb565 & 0xFF) as u8;
                    self.buffer[offset + 1] = ((rgb565 >> 8) & 0xFF) as u8;
                }
                _ => {}
            }
        }
    }
}

impl SurfaceProvider for FramebufferBackend {
    fn surface_by_name(&mut self, name: &str) -> Result<Surface, UiError> {
        let id = match self.by_name.get(name) {
            Some(&id) => id,
            None => {
                let path = self.res_dir.join(format!("{name}.png"));
                let img = image::open(&path).map_err(|e| {
                    debug!("Failed to load {}: {}", path.display(), e);
                    UiError::missing(name)
                })?;
                self.surfaces.push(img.to_rgba8());
                let id = self.surfaces.len() - 1;
                self.by_name.insert(name.to_string(), id);
                id
            }
        };
        let img = &self.surfaces[id];
        Ok(Surface { id, width: img.width(), height: img.height() })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn char_size(&self) -> (u32, u32) {
        (FONT.character_size.width + FONT.character_spacing, FONT.character_size.height)
    }

    fn blit(&mut self, surface: Surface, src: Rect, dx: i32, dy: i32) {
        let Some(img) = self.surfaces.get(surface.id) else {
            return;
        };
        // Pixels are copied out first; put_pixel needs &mut self.
        let mut pixels = Vec::with_capacity((src.width * src.height) as usize);
        for row in 0..src.height {
            for col in 0..src.width {
                let sx = src.x + col as i32;
                let sy = src.y + row as i32;
                if sx < 0 || sy < 0 || sx as u32 >= img.width() || sy as u32 >= img.height() {
                    continue;
                }
                let p = img.get_pixel(sx as u32, sy as u32);
                // Binary alpha is enough for the recovery artwork.
                if p[3] >= 128 {
                    pixels.push((dx + col as i32, dy + row as i32, p[0], p[1], p[2]));
                }
            }
        }
        for (x, y, r, g, b) in pixels {
            self.put_pixel(x, y, r, g, b);
        }
    }

    fn fill(&mut self, rect: Rect, color: Color) {
        for y in rect.y..rect.y + rect.height as i32 {
            for x in rect.x..rect.x + rect.width as i32 {
                self.put_pixel(x, y, color.r, color.g, color.b);
            }
        }
    }

    fn text(&mut self, x: i32, y: i32, text: &str, color: Color) {
        let style = MonoTextStyle::new(&FONT, Rgb888::new(color.r, color.g, color.b));
        let _ = Text::with_baseline(text, Point::new(x, y), style, Baseline::Top).draw(self);
    }

    fn flip(&mut self) -> Result<()> {
        if self.fallback_mode {
            return Ok(());
        }

        if let Some(ref mut fb_file) = self.fb_file {
            fb_file.seek(SeekFrom::Start(0))?;
            fb_file.write_all(&self.buffer)?;
            fb_file.flush()?;
            debug!("Frame presented");
        }

        Ok(())
    }
}

impl OriginDimensions for FramebufferBackend {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for FramebufferBackend {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.put_pixel(point.x, point.y, color.r(), color.g(), color.b());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> FramebufferBackend {
        let mut fb = FramebufferBackend::new("/nonexistent");
        fb.fallback_mode = true;
        fb.width = 16;
        fb.height = 8;
        fb.bits_per_pixel = 32;
        fb.line_length = 16 * 4;
        fb.buffer = vec![0u8; 16 * 8 * 4];
        fb
    }

    fn pixel(fb: &FramebufferBackend, x: usize, y: usize) -> [u8; 3] {
        let o = y * fb.line_length as usize + x * 4;
        [fb.buffer[o + 2], fb.buffer[o + 1], fb.buffer[o]]
    }

    #[test]
    fn fill_is_clipped_to_screen() {
        let mut fb = canvas();
        fb.fill(Rect::new(-2, 6, 4, 10), Color::RED);
        assert_eq!(pixel(&fb, 0, 6), [255, 0, 0]);
        assert_eq!(pixel(&fb, 1, 7), [255, 0, 0]);
        assert_eq!(pixel(&fb, 2, 7), [0, 0, 0]);
    }

    #[test]
    fn missing_png_is_resource_missing() {
        let mut fb = canvas();
        let err = fb.surface_by_name("icon_error").unwrap_err();
        assert!(matches!(err, UiError::ResourceMissing { ref name } if name == "icon_error"));
    }

    #[test]
    fn loaded_surface_blits_opaque_pixels() {
        let temp = tempfile::tempdir().unwrap();
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([0, 255, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 255, 0]));
        img.save(temp.path().join("dot.png")).unwrap();

        let mut fb = canvas();
        fb.res_dir = temp.path().to_path_buf();
        let surface = fb.surface_by_name("dot").unwrap();
        assert_eq!((surface.width, surface.height), (2, 1));
        assert_eq!(fb.surface_by_name("dot").unwrap().id, surface.id);

        fb.blit(surface, surface.full(), 3, 2);
        assert_eq!(pixel(&fb, 3, 2), [0, 255, 0]);
        assert_eq!(pixel(&fb, 4, 2), [0, 0, 0]);
    }

    #[test]
    fn text_draws_some_pixels() {
        let mut fb = canvas();
        fb.width = 32;
        fb.height = 24;
        fb.line_length = 32 * 4;
        fb.buffer = vec![0u8; 32 * 24 * 4];
        fb.text(0, 0, "H", Color::WHITE);
        assert!(fb.buffer.chunks(4).any(|p| p[0] == 255));
    }
}
