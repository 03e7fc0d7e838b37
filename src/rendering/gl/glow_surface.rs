use super::{GlSurface, RenderError};
use crate::core::{Point, Rect, Size};
use crate::rendering::buffer::BYTES_PER_PIXEL;
use glow::HasContext;
use std::sync::Arc;
use tracing::{debug, error};

/// Host hook for binding the toolkit's GL context (GtkGLArea, QOpenGLWidget,
/// a glutin surface, ...).
pub trait ContextBinder: Send {
    fn is_current(&self) -> bool;
    fn make_current(&self) -> bool;
    fn done_current(&self);
}

const VERTEX_SHADER: &str = r#"#version 330 core
out vec2 v_uv;
void main() {
    vec2 pos = vec2(float((gl_VertexID & 1) << 1) - 1.0, float(gl_VertexID & 2) - 1.0);
    v_uv = vec2((pos.x + 1.0) * 0.5, 1.0 - (pos.y + 1.0) * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"#version 330 core
in vec2 v_uv;
out vec4 frag_color;
uniform sampler2D u_texture;
void main() {
    frag_color = texture(u_texture, v_uv);
}
"#;

/// OpenGL 3.3 core implementation of [`GlSurface`] on top of `glow`.
pub struct GlowSurface {
    gl: Arc<glow::Context>,
    binder: Box<dyn ContextBinder>,
    texture: Option<glow::NativeTexture>,
    program: Option<glow::NativeProgram>,
    vertex_array: Option<glow::NativeVertexArray>,
    texture_size: Size,
}

// SAFETY: every GL call goes through `&mut self` and only runs while
// `binder` reports the context current on the calling thread, which the
// renderer enforces with `ContextGuard`.
unsafe impl Send for GlowSurface {}

impl GlowSurface {
    pub fn new(gl: Arc<glow::Context>, binder: Box<dyn ContextBinder>) -> Self {
        Self {
            gl,
            binder,
            texture: None,
            program: None,
            vertex_array: None,
            texture_size: Size::default(),
        }
    }

    unsafe fn compile_program(gl: &glow::Context) -> Result<glow::NativeProgram, RenderError> {
        let program = gl.create_program().map_err(RenderError::ResourceCreation)?;

        let mut shaders = Vec::with_capacity(2);
        for (kind, source) in [
            (glow::VERTEX_SHADER, VERTEX_SHADER),
            (glow::FRAGMENT_SHADER, FRAGMENT_SHADER),
        ] {
            let shader = gl.create_shader(kind).map_err(RenderError::ResourceCreation)?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                gl.delete_program(program);
                return Err(RenderError::ResourceCreation(format!(
                    "shader compile failed: {}",
                    log
                )));
            }
            gl.attach_shader(program, shader);
            shaders.push(shader);
        }

        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        for shader in shaders {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }

        if !linked {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(RenderError::ResourceCreation(format!(
                "program link failed: {}",
                log
            )));
        }
        Ok(program)
    }

    unsafe fn reset_unpack_state(gl: &glow::Context) {
        gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, 0);
        gl.pixel_store_i32(glow::UNPACK_SKIP_PIXELS, 0);
        gl.pixel_store_i32(glow::UNPACK_SKIP_ROWS, 0);
    }
}

impl GlSurface for GlowSurface {
    fn is_current(&self) -> bool {
        self.binder.is_current()
    }

    fn make_current(&mut self) -> bool {
        self.binder.make_current()
    }

    fn done_current(&mut self) {
        self.binder.done_current();
    }

    fn init_resources(&mut self) -> Result<(), RenderError> {
        let gl = Arc::clone(&self.gl);
        unsafe {
            let program = Self::compile_program(&gl)?;
            let vertex_array = gl
                .create_vertex_array()
                .map_err(RenderError::ResourceCreation)?;
            let texture = gl.create_texture().map_err(RenderError::ResourceCreation)?;

            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.bind_texture(glow::TEXTURE_2D, None);

            self.program = Some(program);
            self.vertex_array = Some(vertex_array);
            self.texture = Some(texture);
        }
        debug!("GL resources created");
        Ok(())
    }

    fn release_resources(&mut self) {
        let gl = &self.gl;
        unsafe {
            if let Some(texture) = self.texture.take() {
                gl.delete_texture(texture);
            }
            if let Some(vertex_array) = self.vertex_array.take() {
                gl.delete_vertex_array(vertex_array);
            }
            if let Some(program) = self.program.take() {
                gl.delete_program(program);
            }
        }
        self.texture_size = Size::default();
    }

    fn texture_size(&self) -> Size {
        self.texture_size
    }

    fn upload_full(&mut self, source: &[u8], width: i32, height: i32) -> Result<(), RenderError> {
        let texture = self
            .texture
            .ok_or_else(|| RenderError::ResourceCreation("texture missing".into()))?;
        let byte_len = width as usize * height as usize * BYTES_PER_PIXEL;
        let pixels = source.get(..byte_len);

        unsafe {
            let gl = &self.gl;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            Self::reset_unpack_state(gl);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width,
                height,
                0,
                glow::BGRA,
                glow::UNSIGNED_BYTE,
                pixels,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
        self.texture_size = Size::new(width, height);
        Ok(())
    }

    fn upload_region(
        &mut self,
        source: &[u8],
        source_width: i32,
        src: Rect,
        dest: Point,
    ) -> Result<(), RenderError> {
        let texture = self
            .texture
            .ok_or_else(|| RenderError::ResourceCreation("texture missing".into()))?;

        unsafe {
            let gl = &self.gl;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, source_width);
            gl.pixel_store_i32(glow::UNPACK_SKIP_PIXELS, src.x);
            gl.pixel_store_i32(glow::UNPACK_SKIP_ROWS, src.y);
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                dest.x,
                dest.y,
                src.width,
                src.height,
                glow::BGRA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(source),
            );
            Self::reset_unpack_state(gl);
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
        Ok(())
    }

    fn draw(&mut self, viewport: Size) -> Result<(), RenderError> {
        let (Some(program), Some(vertex_array)) = (self.program, self.vertex_array) else {
            return Err(RenderError::NotInitialized);
        };

        unsafe {
            let gl = &self.gl;
            gl.viewport(0, 0, viewport.width, viewport.height);
            gl.clear_color(1.0, 1.0, 1.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);

            let Some(texture) = self.texture.filter(|_| !self.texture_size.is_empty()) else {
                return Ok(());
            };

            gl.use_program(Some(program));
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            let location = gl.get_uniform_location(program, "u_texture");
            gl.uniform_1_i32(location.as_ref(), 0);
            gl.bind_vertex_array(Some(vertex_array));
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
        }
        Ok(())
    }

    fn read_pixels(&mut self, width: i32, height: i32) -> Result<Vec<u8>, RenderError> {
        if width <= 0 || height <= 0 {
            return Err(RenderError::InvalidViewSize { width, height });
        }
        let mut pixels = vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL];
        unsafe {
            let gl = &self.gl;
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 4);
            gl.read_pixels(
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut pixels),
            );
        }
        Ok(pixels)
    }

    fn take_error(&mut self) -> Option<u32> {
        let code = unsafe { self.gl.get_error() };
        if code == glow::NO_ERROR {
            None
        } else {
            error!("OpenGL error 0x{:04X}", code);
            Some(code)
        }
    }
}
