use base64::Engine as _;
use image::{imageops::FilterType, ImageOutputFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScreenshotError {
    #[error("Framebuffer of {actual} bytes does not match {width}x{height}")]
    SizeMismatch {
        width: i32,
        height: i32,
        actual: usize,
    },
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotOptions {
    pub downsample: bool,
    /// Output size as a fraction of the framebuffer, applied when
    /// `downsample` is set.
    pub target_scale: f32,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            downsample: true,
            target_scale: 0.5,
        }
    }
}

impl ScreenshotOptions {
    pub fn full_resolution() -> Self {
        Self {
            downsample: false,
            ..Self::default()
        }
    }
}

/// Reverses row order in place (GL bottom-left origin to image top-left).
pub fn flip_vertical(pixels: &mut [u8], width: usize, height: usize) {
    let row = width * 4;
    for y in 0..height / 2 {
        let (top, bottom) = pixels.split_at_mut((height - 1 - y) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}

/// Flip, optional downsample, PNG, base64.
pub fn encode_framebuffer(
    mut pixels: Vec<u8>,
    width: i32,
    height: i32,
    options: &ScreenshotOptions,
) -> Result<String, ScreenshotError> {
    let expected = width.max(0) as usize * height.max(0) as usize * 4;
    if width <= 0 || height <= 0 || pixels.len() != expected {
        return Err(ScreenshotError::SizeMismatch {
            width,
            height,
            actual: pixels.len(),
        });
    }

    flip_vertical(&mut pixels, width as usize, height as usize);

    let mut image = RgbaImage::from_raw(width as u32, height as u32, pixels).ok_or(
        ScreenshotError::SizeMismatch {
            width,
            height,
            actual: expected,
        },
    )?;

    if options.downsample && options.target_scale > 0.0 && options.target_scale < 1.0 {
        let w = ((width as f32 * options.target_scale).round() as u32).max(1);
        let h = ((height as f32 * options.target_scale).round() as u32).max(1);
        image = image::imageops::resize(&image, w, h, FilterType::Triangle);
    }

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageOutputFormat::Png)
        .map_err(|e| ScreenshotError::Encode(e.to_string()))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(png.into_inner()))
}
