//! Texture upload and presentation of off-screen paint buffers.
//!
//! The renderer never talks to a windowing toolkit directly. Everything it
//! needs from the GPU goes through [`GlSurface`], which the host implements
//! for its GL-capable widget (or uses [`MemorySurface`] when no GPU exists).

pub mod memory;

#[cfg(feature = "gl")]
pub mod glow_surface;

pub use memory::*;

#[cfg(feature = "gl")]
pub use glow_surface::*;

use crate::core::{Point, Rect, Size};
use crate::rendering::buffer::{BufferError, BYTES_PER_PIXEL};
use crate::rendering::scaling::ScalingManager;
use crate::rendering::screenshot::{self, ScreenshotError, ScreenshotOptions};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Renderer already initialized")]
    AlreadyInitialized,
    #[error("Renderer not initialized")]
    NotInitialized,
    #[error("Unable to make GL context current")]
    ContextUnavailable,
    #[error("GL context is not current")]
    ContextNotCurrent,
    #[error("OpenGL error 0x{0:04X}")]
    Gl(u32),
    #[error("GL resource creation failed: {0}")]
    ResourceCreation(String),
    #[error("Invalid view size {width}x{height}")]
    InvalidViewSize { width: i32, height: i32 },
    #[error("Paint buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Screenshot error: {0}")]
    Screenshot(#[from] ScreenshotError),
}

/// Which layer a paint callback targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaintElement {
    View,
    Popup,
}

/// GPU-side operations the renderer depends on.
///
/// Pixel data handed to the upload methods is tightly packed BGRA rows of
/// `source_width` pixels. Row 0 is the top of the page. `read_pixels`
/// returns RGBA rows in GL order (row 0 is the bottom of the framebuffer).
pub trait GlSurface: Send {
    fn is_current(&self) -> bool;
    /// Returns false if the context could not be made current.
    fn make_current(&mut self) -> bool;
    fn done_current(&mut self);

    fn init_resources(&mut self) -> Result<(), RenderError>;
    fn release_resources(&mut self);

    fn texture_size(&self) -> Size;
    /// (Re)allocates the view texture and fills it from `source`.
    fn upload_full(&mut self, source: &[u8], width: i32, height: i32) -> Result<(), RenderError>;
    /// Copies `src` out of `source` into the texture at `dest`. The caller
    /// clips both rectangles beforehand.
    fn upload_region(
        &mut self,
        source: &[u8],
        source_width: i32,
        src: Rect,
        dest: Point,
    ) -> Result<(), RenderError>;

    fn draw(&mut self, viewport: Size) -> Result<(), RenderError>;
    fn read_pixels(&mut self, width: i32, height: i32) -> Result<Vec<u8>, RenderError>;

    /// Pending GL error code, cleared on read.
    fn take_error(&mut self) -> Option<u32>;
}

/// Makes a surface current for the lifetime of the guard and restores the
/// previous state when dropped, including on early return.
pub struct ContextGuard<'a, S: GlSurface + ?Sized> {
    surface: &'a mut S,
    release_on_drop: bool,
}

impl<'a, S: GlSurface + ?Sized> ContextGuard<'a, S> {
    pub fn new(surface: &'a mut S) -> Result<Self, RenderError> {
        if surface.is_current() {
            return Ok(Self {
                surface,
                release_on_drop: false,
            });
        }
        if !surface.make_current() {
            return Err(RenderError::ContextUnavailable);
        }
        Ok(Self {
            surface,
            release_on_drop: true,
        })
    }
}

impl<S: GlSurface + ?Sized> Deref for ContextGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: GlSurface + ?Sized> DerefMut for ContextGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: GlSurface + ?Sized> Drop for ContextGuard<'_, S> {
    fn drop(&mut self) {
        if self.release_on_drop {
            self.surface.done_current();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStats {
    pub full_uploads: u64,
    pub partial_uploads: u64,
    pub rects_uploaded: u64,
    pub popup_uploads: u64,
    pub bytes_uploaded: u64,
}

pub type SharedRenderer = Arc<Mutex<GlRenderer>>;

pub struct GlRenderer {
    surface: Option<Box<dyn GlSurface>>,
    view_size: Size,
    popup_visible: bool,
    popup_rect: Rect,
    scaling: ScalingManager,
    stats: UploadStats,
}

impl GlRenderer {
    pub fn new() -> Self {
        Self {
            surface: None,
            view_size: Size::default(),
            popup_visible: false,
            popup_rect: Rect::default(),
            scaling: ScalingManager::default(),
            stats: UploadStats::default(),
        }
    }

    pub fn shared() -> SharedRenderer {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some()
    }

    /// Takes ownership of the surface and creates GL resources with its
    /// context current.
    pub fn initialize(&mut self, mut surface: Box<dyn GlSurface>) -> Result<(), RenderError> {
        if self.surface.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }

        {
            let mut guard = ContextGuard::new(surface.as_mut())?;
            guard.init_resources()?;
        }

        self.surface = Some(surface);
        info!("GL renderer initialized");
        Ok(())
    }

    /// Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        let Some(mut surface) = self.surface.take() else {
            return;
        };

        let released =
            ContextGuard::new(surface.as_mut()).map(|mut guard| guard.release_resources());
        if let Err(e) = released {
            warn!("GL context unavailable during cleanup: {}", e);
            surface.release_resources();
        }

        self.popup_visible = false;
        self.popup_rect = Rect::default();
        info!("GL renderer cleaned up");
    }

    pub fn scaling(&self) -> &ScalingManager {
        &self.scaling
    }

    pub fn set_scale_factor(&self, scale: f32) {
        self.scaling.set_scale_factor(scale);
    }

    pub fn scale_factor(&self) -> f32 {
        self.scaling.scale_value()
    }

    /// Logical view size reported by the host.
    pub fn set_view_size(&mut self, width: i32, height: i32) {
        self.view_size = Size::new(width, height);
    }

    /// Physical size of the last painted frame, falling back to the logical
    /// view size before the first paint.
    pub fn view_size(&self) -> Size {
        match &self.surface {
            Some(surface) if !surface.texture_size().is_empty() => surface.texture_size(),
            _ => self.view_size,
        }
    }

    pub fn view_width(&self) -> i32 {
        self.view_size().width
    }

    pub fn view_height(&self) -> i32 {
        self.view_size().height
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    pub fn popup_rect(&self) -> Option<Rect> {
        (self.popup_visible && !self.popup_rect.is_empty()).then_some(self.popup_rect)
    }

    pub fn on_popup_show(&mut self, show: bool) {
        self.popup_visible = show;
        if !show {
            self.popup_rect = Rect::default();
        }
        debug!("Popup {}", if show { "shown" } else { "hidden" });
    }

    pub fn on_popup_size(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.popup_rect = rect;
    }

    /// Uploads a frame. `dirty_rects` are in physical pixels of a `width` x
    /// `height` BGRA buffer.
    pub fn on_paint(
        &mut self,
        element: PaintElement,
        dirty_rects: &[Rect],
        buffer: &[u8],
        width: i32,
        height: i32,
    ) -> Result<(), RenderError> {
        let popup_rect = self.popup_rect();
        let surface = self.surface.as_mut().ok_or(RenderError::NotInitialized)?;

        let expected = width.max(0) as usize * height.max(0) as usize * BYTES_PER_PIXEL;
        if width <= 0 || height <= 0 {
            return Err(BufferError::InvalidDimensions { width, height }.into());
        }
        if buffer.len() < expected {
            return Err(BufferError::SourceTooSmall {
                expected,
                actual: buffer.len(),
            }
            .into());
        }

        let mut guard = ContextGuard::new(surface.as_mut())?;

        match element {
            PaintElement::View => {
                let full = Rect::new(0, 0, width, height);
                let resized = guard.texture_size() != Size::new(width, height);
                let single_full = dirty_rects.len() == 1 && dirty_rects[0] == full;

                if resized || single_full || dirty_rects.is_empty() {
                    guard.upload_full(buffer, width, height)?;
                    self.stats.full_uploads += 1;
                    self.stats.bytes_uploaded += expected as u64;
                    trace!("Full texture upload {}x{}", width, height);
                } else {
                    let visible: SmallVec<[Rect; 8]> = dirty_rects
                        .iter()
                        .map(|rect| rect.intersection(&full))
                        .filter(|rect| !rect.is_empty())
                        .collect();
                    for clipped in visible {
                        guard.upload_region(buffer, width, clipped, clipped.origin())?;
                        self.stats.rects_uploaded += 1;
                        self.stats.bytes_uploaded += clipped.size().area() as u64 * 4;
                    }
                    self.stats.partial_uploads += 1;
                }
            }
            PaintElement::Popup => {
                let Some(popup) = popup_rect else {
                    trace!("Popup paint ignored, no visible popup");
                    return Ok(());
                };
                let texture = Rect::from_size(guard.texture_size());
                let target = Rect::new(popup.x, popup.y, width, height);
                let clipped = target.intersection(&texture);
                if clipped.is_empty() {
                    return Ok(());
                }
                let src = Rect::new(
                    clipped.x - target.x,
                    clipped.y - target.y,
                    clipped.width,
                    clipped.height,
                );
                guard.upload_region(buffer, width, src, clipped.origin())?;
                self.stats.popup_uploads += 1;
                self.stats.bytes_uploaded += clipped.size().area() as u64 * 4;
            }
        }

        match guard.take_error() {
            Some(code) => Err(RenderError::Gl(code)),
            None => Ok(()),
        }
    }

    /// Draws the view texture. The host must already have made its context
    /// current (from its widget's render signal).
    pub fn render(&mut self) -> Result<(), RenderError> {
        let viewport = self.view_size();
        let surface = self.surface.as_mut().ok_or(RenderError::NotInitialized)?;
        if !surface.is_current() {
            return Err(RenderError::ContextNotCurrent);
        }

        surface.draw(viewport)?;
        match surface.take_error() {
            Some(code) => Err(RenderError::Gl(code)),
            None => Ok(()),
        }
    }

    /// Blocks until the framebuffer has been read back and encoded. Do not
    /// call on a thread the engine may be waiting on.
    pub fn take_screenshot(&mut self, options: &ScreenshotOptions) -> Result<String, RenderError> {
        let size = self.view_size();
        let surface = self.surface.as_mut().ok_or(RenderError::NotInitialized)?;
        if size.is_empty() {
            return Err(RenderError::InvalidViewSize {
                width: size.width,
                height: size.height,
            });
        }

        let mut guard = ContextGuard::new(surface.as_mut())?;
        guard.draw(size)?;
        let pixels = guard.read_pixels(size.width, size.height)?;
        if let Some(code) = guard.take_error() {
            return Err(RenderError::Gl(code));
        }
        drop(guard);

        let encoded = screenshot::encode_framebuffer(pixels, size.width, size.height, options)?;
        debug!("Screenshot captured: {}x{}, {} base64 bytes", size.width, size.height, encoded.len());
        Ok(encoded)
    }
}

impl Default for GlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GlRenderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
