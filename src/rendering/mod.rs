//! Rendering pipeline: paint buffers in, GPU texture and screenshots out.

pub mod buffer;
pub mod gl;
pub mod scaling;
pub mod screenshot;

pub use buffer::{BufferError, PixelBuffer};
pub use gl::*;
pub use scaling::ScalingManager;
pub use screenshot::{ScreenshotError, ScreenshotOptions};
