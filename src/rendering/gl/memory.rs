use super::{GlSurface, RenderError};
use crate::core::{Point, Rect, Size};
use crate::rendering::buffer::{PixelBuffer, BYTES_PER_PIXEL};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct ContextState {
    current: AtomicBool,
    pending_error: AtomicU32,
}

/// Stand-in for a toolkit GL context: tracks whether it is current and
/// carries an injectable error code. Cloned handles share state, so a host
/// can mark the context current the way its widget would before rendering.
#[derive(Debug, Clone, Default)]
pub struct HeadlessContext {
    state: Arc<ContextState>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_current(&self) -> bool {
        self.state.current.load(Ordering::Acquire)
    }

    pub fn make_current(&self) -> bool {
        self.state.current.store(true, Ordering::Release);
        true
    }

    pub fn done_current(&self) {
        self.state.current.store(false, Ordering::Release);
    }

    /// The next `take_error` on the surface reports `code`.
    pub fn inject_error(&self, code: u32) {
        self.state.pending_error.store(code, Ordering::Release);
    }

    fn take_error(&self) -> Option<u32> {
        match self.state.pending_error.swap(0, Ordering::AcqRel) {
            0 => None,
            code => Some(code),
        }
    }
}

/// Software texture + framebuffer with the same observable behavior as the
/// GL path. Used when no GPU context exists and by tests.
#[derive(Debug, Default)]
pub struct MemorySurface {
    context: HeadlessContext,
    texture: PixelBuffer,
    framebuffer: Vec<u8>,
    framebuffer_size: Size,
    resources_ready: bool,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(context: HeadlessContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn context(&self) -> HeadlessContext {
        self.context.clone()
    }

    /// Current texture contents (BGRA, top row first).
    pub fn texture(&self) -> &PixelBuffer {
        &self.texture
    }

    fn require_current(&self) -> Result<(), RenderError> {
        if self.context.is_current() {
            Ok(())
        } else {
            Err(RenderError::ContextNotCurrent)
        }
    }
}

impl GlSurface for MemorySurface {
    fn is_current(&self) -> bool {
        self.context.is_current()
    }

    fn make_current(&mut self) -> bool {
        self.context.make_current()
    }

    fn done_current(&mut self) {
        self.context.done_current();
    }

    fn init_resources(&mut self) -> Result<(), RenderError> {
        self.require_current()?;
        self.resources_ready = true;
        Ok(())
    }

    fn release_resources(&mut self) {
        self.texture.clear();
        self.framebuffer.clear();
        self.framebuffer_size = Size::default();
        self.resources_ready = false;
    }

    fn texture_size(&self) -> Size {
        Size::new(self.texture.width(), self.texture.height())
    }

    fn upload_full(&mut self, source: &[u8], width: i32, height: i32) -> Result<(), RenderError> {
        self.require_current()?;
        self.texture.copy_full(source, width, height)?;
        Ok(())
    }

    fn upload_region(
        &mut self,
        source: &[u8],
        source_width: i32,
        src: Rect,
        dest: Point,
    ) -> Result<(), RenderError> {
        self.require_current()?;
        if src.is_empty() {
            return Ok(());
        }

        let src_stride = source_width as usize * BYTES_PER_PIXEL;
        let dst_stride = self.texture.stride();
        let row_bytes = src.width as usize * BYTES_PER_PIXEL;
        let data = self.texture.data_mut();

        for row in 0..src.height as usize {
            let src_start = (src.y as usize + row) * src_stride + src.x as usize * BYTES_PER_PIXEL;
            let dst_start = (dest.y as usize + row) * dst_stride + dest.x as usize * BYTES_PER_PIXEL;
            let (Some(from), Some(to)) = (
                source.get(src_start..src_start + row_bytes),
                data.get_mut(dst_start..dst_start + row_bytes),
            ) else {
                // GL_INVALID_VALUE
                self.context.inject_error(0x0501);
                return Ok(());
            };
            to.copy_from_slice(from);
        }
        Ok(())
    }

    /// Nearest-neighbour stretch of the texture into an RGBA framebuffer of
    /// `viewport` size, stored bottom row first.
    fn draw(&mut self, viewport: Size) -> Result<(), RenderError> {
        self.require_current()?;
        if viewport.is_empty() {
            return Ok(());
        }

        let (vw, vh) = (viewport.width as usize, viewport.height as usize);
        self.framebuffer.clear();
        self.framebuffer.resize(vw * vh * BYTES_PER_PIXEL, 0);
        self.framebuffer_size = viewport;

        let (tw, th) = (self.texture.width() as usize, self.texture.height() as usize);
        if tw == 0 || th == 0 {
            return Ok(());
        }

        let tex = self.texture.data();
        let stride = self.texture.stride();
        for y in 0..vh {
            let ty = y * th / vh;
            let out_row = (vh - 1 - y) * vw * BYTES_PER_PIXEL;
            for x in 0..vw {
                let tx = x * tw / vw;
                let s = ty * stride + tx * BYTES_PER_PIXEL;
                let d = out_row + x * BYTES_PER_PIXEL;
                self.framebuffer[d] = tex[s + 2];
                self.framebuffer[d + 1] = tex[s + 1];
                self.framebuffer[d + 2] = tex[s];
                self.framebuffer[d + 3] = tex[s + 3];
            }
        }
        trace!("Drew {}x{} texture into {}", tw, th, viewport);
        Ok(())
    }

    fn read_pixels(&mut self, width: i32, height: i32) -> Result<Vec<u8>, RenderError> {
        self.require_current()?;
        if width <= 0 || height <= 0 {
            return Err(RenderError::InvalidViewSize { width, height });
        }

        let mut out = vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL];
        let fb = self.framebuffer_size;
        let copy_w = width.min(fb.width).max(0) as usize * BYTES_PER_PIXEL;
        let rows = height.min(fb.height).max(0) as usize;
        for row in 0..rows {
            let src = row * fb.width as usize * BYTES_PER_PIXEL;
            let dst = row * width as usize * BYTES_PER_PIXEL;
            out[dst..dst + copy_w].copy_from_slice(&self.framebuffer[src..src + copy_w]);
        }
        Ok(out)
    }

    fn take_error(&mut self) -> Option<u32> {
        self.context.take_error()
    }
}
