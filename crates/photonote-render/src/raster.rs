//! CPU preview rasterizer.
//!
//! Strokes are recorded in canvas coordinates; the renderer scales them to
//! the pixel size of the current base image and paints each one as a
//! coverage mask of round stamps, so overlapping stamps inside one stroke
//! never double up translucent colors.

use crate::error::RasterError;
use crate::transformer::open_image;
use image::imageops::FilterType;
use image::RgbaImage;
use kurbo::Point;
use photonote_core::storage::BoxFuture;
use photonote_core::{CanvasRenderer, EditorState, EngineConfig, EngineResult, Stroke};

/// Renders base image plus strokes into PNG preview bytes.
#[derive(Debug, Clone, Default)]
pub struct RasterRenderer {
    /// Longest edge of the output; larger images are downscaled.
    max_dimension: Option<u32>,
}

impl RasterRenderer {
    /// Render at the base image's full resolution.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: Some(max_dimension).filter(|d| *d > 0),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_max_dimension(config.preview_max_dimension)
    }

    /// Paint `state` into an RGBA buffer.
    pub fn render_rgba(&self, state: &EditorState) -> Result<RgbaImage, RasterError> {
        let mut image = open_image(&state.current_image_ref)?.to_rgba8();

        let canvas = state.canvas_size;
        let (sx, sy) = if canvas.width > 0.0 && canvas.height > 0.0 {
            (
                image.width() as f64 / canvas.width,
                image.height() as f64 / canvas.height,
            )
        } else {
            (1.0, 1.0)
        };

        for stroke in state.strokes() {
            paint_stroke(&mut image, stroke, sx, sy);
        }
        log::debug!(
            "Painted {} stroke(s) onto {}x{} image",
            state.strokes().len(),
            image.width(),
            image.height()
        );

        Ok(match self.max_dimension {
            Some(max) if image.width().max(image.height()) > max => fit_within(&image, max),
            _ => image,
        })
    }

    /// Render and encode as PNG.
    pub fn render_png(&self, state: &EditorState) -> Result<Vec<u8>, RasterError> {
        let image = self.render_rgba(state)?;
        encode_png(image.as_raw(), image.width(), image.height())
    }
}

impl CanvasRenderer for RasterRenderer {
    fn render<'a>(&'a self, state: &'a EditorState) -> BoxFuture<'a, EngineResult<Vec<u8>>> {
        Box::pin(async move {
            self.render_png(state)
                .map_err(RasterError::into_render_failure)
        })
    }
}

fn fit_within(image: &RgbaImage, max: u32) -> RgbaImage {
    let scale = max as f64 / image.width().max(image.height()) as f64;
    let width = ((image.width() as f64 * scale).round() as u32).max(1);
    let height = ((image.height() as f64 * scale).round() as u32).max(1);
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

fn paint_stroke(image: &mut RgbaImage, stroke: &Stroke, sx: f64, sy: f64) {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return;
    }
    let radius = (stroke.width() * (sx + sy) / 4.0).max(0.5);
    let points: Vec<Point> = stroke
        .points()
        .iter()
        .map(|p| Point::new(p.x * sx, p.y * sy))
        .collect();

    let mut coverage = vec![0.0f32; width as usize * height as usize];
    if let [dot] = points.as_slice() {
        stamp_disc(&mut coverage, width, height, *dot, radius);
    }
    let spacing = (radius * 0.5).max(0.5);
    for segment in points.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let steps = ((b - a).hypot() / spacing).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let center = a.lerp(b, i as f64 / steps as f64);
            stamp_disc(&mut coverage, width, height, center, radius);
        }
    }

    let color = stroke.color();
    let alpha = color.a as f32 / 255.0;
    for (pixel, cover) in image.pixels_mut().zip(coverage) {
        if cover <= 0.0 {
            continue;
        }
        let src_a = alpha * cover;
        let dst = pixel.0;
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        if out_a <= 0.0 {
            continue;
        }
        let blend = |s: u8, d: u8| {
            let v = (s as f32 * src_a + d as f32 * dst_a * (1.0 - src_a)) / out_a;
            v.round().clamp(0.0, 255.0) as u8
        };
        pixel.0 = [
            blend(color.r, dst[0]),
            blend(color.g, dst[1]),
            blend(color.b, dst[2]),
            (out_a * 255.0).round() as u8,
        ];
    }
}

/// Raise coverage inside a disc, with a one-pixel soft edge.
fn stamp_disc(coverage: &mut [f32], width: u32, height: u32, center: Point, radius: f64) {
    let reach = radius + 0.5;
    let x0 = (center.x - reach).floor().max(0.0) as u32;
    let y0 = (center.y - reach).floor().max(0.0) as u32;
    let x1 = ((center.x + reach).ceil().max(0.0) as u32).min(width);
    let y1 = ((center.y + reach).ceil().max(0.0) as u32).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let pixel_center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let distance = pixel_center.distance(center);
            let cover = (reach - distance).clamp(0.0, 1.0) as f32;
            let slot = &mut coverage[(y * width + x) as usize];
            *slot = slot.max(cover);
        }
    }
}

/// Encode RGBA pixel data to PNG bytes.
pub fn encode_png(rgba_data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RasterError> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba_data)?;
    }
    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use photonote_core::{CanvasSize, EngineError, StrokeColor};
    use pollster::block_on;
    use std::path::Path;
    use tempfile::tempdir;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn write_base(dir: &Path, width: u32, height: u32) -> String {
        let path = dir.join("base.png");
        RgbaImage::from_pixel(width, height, WHITE).save(&path).unwrap();
        format!("file://{}", path.display())
    }

    fn horizontal_stroke(state: &mut EditorState, y: f64, color: StrokeColor) {
        state.annotations.set_color(color);
        state.annotations.begin_stroke(Point::new(10.0, y)).unwrap();
        state.annotations.extend_stroke(Point::new(90.0, y));
        state.annotations.commit_stroke();
    }

    #[test]
    fn test_strokes_are_painted_in_image_space() {
        let dir = tempdir().unwrap();
        let base = write_base(dir.path(), 200, 200);
        // canvas is half the pixel size, so strokes scale by 2
        let mut state = EditorState::new(base, CanvasSize::new(100.0, 100.0));
        horizontal_stroke(&mut state, 50.0, StrokeColor::rgb(255, 0, 0));

        let image = RasterRenderer::new().render_rgba(&state).unwrap();
        assert_eq!((image.width(), image.height()), (200, 200));
        assert_eq!(*image.get_pixel(100, 100), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(100, 10), WHITE);
        assert_eq!(*image.get_pixel(195, 100), WHITE);
    }

    #[test]
    fn test_later_strokes_paint_over_earlier_ones() {
        let dir = tempdir().unwrap();
        let base = write_base(dir.path(), 100, 100);
        let mut state = EditorState::new(base, CanvasSize::new(100.0, 100.0));
        horizontal_stroke(&mut state, 50.0, StrokeColor::rgb(255, 0, 0));
        horizontal_stroke(&mut state, 50.0, StrokeColor::rgb(0, 0, 255));

        let image = RasterRenderer::new().render_rgba(&state).unwrap();
        assert_eq!(*image.get_pixel(50, 50), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_translucent_stroke_does_not_compound() {
        let dir = tempdir().unwrap();
        let base = write_base(dir.path(), 100, 100);
        let mut state = EditorState::new(base, CanvasSize::new(100.0, 100.0));
        horizontal_stroke(&mut state, 50.0, StrokeColor::new(0, 0, 0, 128));

        let image = RasterRenderer::new().render_rgba(&state).unwrap();
        let a = image.get_pixel(30, 50).0[0];
        let b = image.get_pixel(31, 50).0[0];
        assert_eq!(a, b);
        assert!((120..=135).contains(&a));
    }

    #[test]
    fn test_tap_is_painted_as_dot() {
        let dir = tempdir().unwrap();
        let base = write_base(dir.path(), 100, 100);
        let mut state = EditorState::new(base, CanvasSize::new(100.0, 100.0));
        state.annotations.set_color(StrokeColor::rgb(0, 255, 0));
        state.annotations.begin_stroke(Point::new(50.0, 50.0)).unwrap();
        state.annotations.commit_stroke();

        let image = RasterRenderer::new().render_rgba(&state).unwrap();
        assert_eq!(*image.get_pixel(50, 50), Rgba([0, 255, 0, 255]));
        assert_eq!(*image.get_pixel(70, 50), WHITE);
    }

    #[test]
    fn test_preview_is_downscaled() {
        let dir = tempdir().unwrap();
        let base = write_base(dir.path(), 400, 200);
        let state = EditorState::new(base, CanvasSize::new(400.0, 200.0));

        let bytes = block_on(RasterRenderer::with_max_dimension(100).render(&state)).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[test]
    fn test_missing_base_image_is_render_failure() {
        let state = EditorState::new("/nope/missing.png", CanvasSize::new(10.0, 10.0));
        let result = block_on(RasterRenderer::new().render(&state));
        assert!(matches!(result, Err(EngineError::RenderFailure(_))));
    }

    #[test]
    fn test_encode_png_round_trip() {
        let pixels = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4]));
        let bytes = encode_png(pixels.as_raw(), 3, 2).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, pixels);
    }
}
