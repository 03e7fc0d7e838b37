use base64::Engine as _;
use osr_browser_engine::core::Rect;
use osr_browser_engine::rendering::{
    GlRenderer, HeadlessContext, MemorySurface, PaintElement, RenderError, ScreenshotOptions,
};

const BLUE: [u8; 4] = [0xff, 0x00, 0x00, 0xff];
const RED: [u8; 4] = [0x00, 0x00, 0xff, 0xff];
const GREEN: [u8; 4] = [0x00, 0xff, 0x00, 0xff];

fn renderer() -> GlRenderer {
    let mut renderer = GlRenderer::new();
    renderer
        .initialize(Box::new(MemorySurface::new()))
        .unwrap();
    renderer
}

fn solid(width: i32, height: i32, color: [u8; 4]) -> Vec<u8> {
    color.repeat((width * height) as usize)
}

/// A frame where every pixel differs from its neighbours.
fn pattern(width: i32, height: i32, seed: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[
                (x as u8).wrapping_mul(7).wrapping_add(seed),
                (y as u8).wrapping_mul(13).wrapping_add(seed),
                seed,
                0xff,
            ]);
        }
    }
    data
}

fn decode_png(encoded: &str) -> image::RgbaImage {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    image::load_from_memory(&bytes).unwrap().to_rgba8()
}

#[test]
fn test_dirty_rect_uploads_match_full_upload() {
    let (w, h) = (64, 48);
    let before = pattern(w, h, 1);
    let after = pattern(w, h, 2);
    let dirty = [
        Rect::new(0, 0, 16, 16),
        Rect::new(30, 20, 20, 28),
        // Hangs off the right edge; only the visible part counts.
        Rect::new(60, 40, 10, 10),
    ];

    // What the texture must hold: `before` with the dirty areas of `after`.
    let bounds = Rect::new(0, 0, w, h);
    let mut expected = before.clone();
    for rect in &dirty {
        let clipped = rect.intersection(&bounds);
        for y in clipped.y..clipped.bottom() {
            let start = ((y * w + clipped.x) * 4) as usize;
            let end = start + (clipped.width * 4) as usize;
            expected[start..end].copy_from_slice(&after[start..end]);
        }
    }

    let mut full = renderer();
    full.on_paint(PaintElement::View, &[], &before, w, h).unwrap();
    full.on_paint(PaintElement::View, &[bounds], &expected, w, h)
        .unwrap();

    let mut partial = renderer();
    partial
        .on_paint(PaintElement::View, &[], &before, w, h)
        .unwrap();
    partial
        .on_paint(PaintElement::View, &dirty, &after, w, h)
        .unwrap();

    assert_eq!(full.stats().full_uploads, 2);
    assert_eq!(partial.stats().full_uploads, 1);
    assert_eq!(partial.stats().partial_uploads, 1);
    assert_eq!(partial.stats().rects_uploaded, 3);

    let options = ScreenshotOptions::full_resolution();
    assert_eq!(
        full.take_screenshot(&options).unwrap(),
        partial.take_screenshot(&options).unwrap()
    );
}

#[test]
fn test_size_change_forces_full_upload() {
    let mut renderer = renderer();
    renderer
        .on_paint(PaintElement::View, &[], &solid(8, 8, RED), 8, 8)
        .unwrap();
    renderer
        .on_paint(
            PaintElement::View,
            &[Rect::new(0, 0, 2, 2)],
            &solid(16, 8, BLUE),
            16,
            8,
        )
        .unwrap();
    assert_eq!(renderer.stats().full_uploads, 2);
    assert_eq!(renderer.stats().partial_uploads, 0);
    assert_eq!(renderer.view_width(), 16);
}

#[test]
fn test_short_buffer_is_rejected() {
    let mut renderer = renderer();
    let result = renderer.on_paint(PaintElement::View, &[], &[0u8; 12], 2, 2);
    assert!(matches!(result, Err(RenderError::Buffer(_))));
}

#[test]
fn test_screenshot_is_top_row_first() {
    let (w, h) = (8, 8);
    let mut frame = solid(w, h / 2, RED);
    frame.extend(solid(w, h / 2, BLUE));

    let mut renderer = renderer();
    renderer.on_paint(PaintElement::View, &[], &frame, w, h).unwrap();

    let image = decode_png(
        &renderer
            .take_screenshot(&ScreenshotOptions::full_resolution())
            .unwrap(),
    );
    assert_eq!(image.dimensions(), (8, 8));
    assert_eq!(image.get_pixel(0, 0).0, [0xff, 0x00, 0x00, 0xff]);
    assert_eq!(image.get_pixel(0, 7).0, [0x00, 0x00, 0xff, 0xff]);
}

#[test]
fn test_screenshot_downsamples_by_default() {
    let mut renderer = renderer();
    renderer
        .on_paint(PaintElement::View, &[], &solid(40, 20, GREEN), 40, 20)
        .unwrap();
    let image = decode_png(
        &renderer
            .take_screenshot(&ScreenshotOptions::default())
            .unwrap(),
    );
    assert_eq!(image.dimensions(), (20, 10));
}

#[test]
fn test_popup_is_drawn_over_view_and_clipped() {
    let mut renderer = renderer();
    renderer
        .on_paint(PaintElement::View, &[], &solid(100, 100, BLUE), 100, 100)
        .unwrap();

    renderer.on_popup_show(true);
    renderer.on_popup_size(Rect::new(90, 90, 20, 20));
    renderer
        .on_paint(PaintElement::Popup, &[], &solid(20, 20, RED), 20, 20)
        .unwrap();
    assert_eq!(renderer.stats().popup_uploads, 1);

    let image = decode_png(
        &renderer
            .take_screenshot(&ScreenshotOptions::full_resolution())
            .unwrap(),
    );
    assert_eq!(image.get_pixel(95, 95).0, [0xff, 0x00, 0x00, 0xff]);
    assert_eq!(image.get_pixel(50, 50).0, [0x00, 0x00, 0xff, 0xff]);

    renderer.on_popup_show(false);
    renderer
        .on_paint(PaintElement::Popup, &[], &solid(20, 20, RED), 20, 20)
        .unwrap();
    assert_eq!(renderer.stats().popup_uploads, 1);
}

#[test]
fn test_render_requires_current_context() {
    let context = HeadlessContext::new();
    let mut renderer = GlRenderer::new();
    renderer
        .initialize(Box::new(MemorySurface::with_context(context.clone())))
        .unwrap();
    renderer
        .on_paint(PaintElement::View, &[], &solid(4, 4, RED), 4, 4)
        .unwrap();

    assert!(!context.is_current());
    assert_eq!(renderer.render(), Err(RenderError::ContextNotCurrent));

    context.make_current();
    assert_eq!(renderer.render(), Ok(()));
    assert!(context.is_current());
}

#[test]
fn test_gl_error_is_reported_and_context_restored() {
    let context = HeadlessContext::new();
    let mut renderer = GlRenderer::new();
    renderer
        .initialize(Box::new(MemorySurface::with_context(context.clone())))
        .unwrap();

    context.inject_error(0x0505);
    let result = renderer.on_paint(PaintElement::View, &[], &solid(4, 4, RED), 4, 4);
    assert_eq!(result, Err(RenderError::Gl(0x0505)));
    assert!(!context.is_current());
}

#[test]
fn test_lifecycle_errors() {
    let mut renderer = GlRenderer::new();
    assert_eq!(
        renderer.on_paint(PaintElement::View, &[], &solid(2, 2, RED), 2, 2),
        Err(RenderError::NotInitialized)
    );
    renderer
        .initialize(Box::new(MemorySurface::new()))
        .unwrap();
    assert_eq!(
        renderer.initialize(Box::new(MemorySurface::new())),
        Err(RenderError::AlreadyInitialized)
    );
    renderer.cleanup();
    renderer.cleanup();
    assert!(!renderer.is_initialized());
}
